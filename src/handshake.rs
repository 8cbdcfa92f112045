//! One-shot request/reply used by higher layers to negotiate endpoints.
//!
//! The initiator connects a `REQ` socket, sends its packed arguments, and
//! receives the responder's packed reply. The responder binds a `REP` socket,
//! receives the initiator's arguments, and sends its own packed reply. Both
//! sockets are torn down immediately after the single exchange.

use crate::error::FrameworkError;
use crate::serialize::{pack, unpack, Wire};
use crate::socket::{build_socket, new_context};

/// Connect to `uri`, send `args`, and return the responder's reply.
///
/// `max_reply_len` caps the accepted reply size to guard against a
/// misbehaving responder.
pub fn initiate<A: Wire, R: Wire>(
    uri: &str,
    args: &A,
    max_reply_len: usize,
) -> Result<R, FrameworkError> {
    let ctx = new_context();
    let socket = build_socket(&ctx, zmq::REQ)?;
    socket.connect(uri)?;
    socket.send(&pack(args), 0)?;
    let reply = socket.recv_bytes(0)?;
    if reply.len() > max_reply_len {
        return Err(FrameworkError::protocol(format!(
            "handshake reply of {} bytes exceeds the {} byte limit",
            reply.len(),
            max_reply_len
        )));
    }
    Ok(unpack(&reply)?)
}

/// Bind `uri`, wait for one request, decode it, hand it to `respond_with` and
/// send back whatever that returns.
pub fn respond<A: Wire, R: Wire>(
    uri: &str,
    max_request_len: usize,
    respond_with: impl FnOnce(A) -> R,
) -> Result<(), FrameworkError> {
    let ctx = new_context();
    let socket = build_socket(&ctx, zmq::REP)?;
    socket.bind(uri)?;
    let request = socket.recv_bytes(0)?;
    if request.len() > max_request_len {
        return Err(FrameworkError::protocol(format!(
            "handshake request of {} bytes exceeds the {} byte limit",
            request.len(),
            max_request_len
        )));
    }
    let args: A = unpack(&request)?;
    let reply = respond_with(args);
    socket.send(&pack(&reply), 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn exchanges_endpoint_metadata() {
        let uri = "ipc:///tmp/rmi-comms-handshake-test";
        let server = thread::spawn(move || {
            respond::<String, String>(uri, 4096, |name: String| format!("endpoint-for-{}", name))
                .unwrap();
        });
        thread::sleep(std::time::Duration::from_millis(50));
        let reply: String = initiate(uri, &"alpha".to_string(), 4096).unwrap();
        assert_eq!(reply, "endpoint-for-alpha");
        server.join().unwrap();
    }
}
