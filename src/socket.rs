//! Low-level socket construction helpers shared by every endpoint type.
//!
//! Every socket in the framework is created, used and destroyed from exactly
//! one thread. These helpers centralize the handful of options every endpoint
//! needs (`LINGER=0`, an optional receive timeout) and the bind-vs-connect URI
//! convention (a URI containing `*` binds; otherwise it connects).

use crate::error::FrameworkError;

pub fn new_context() -> zmq::Context {
    zmq::Context::new()
}

/// Create a socket of the given kind with `LINGER=0` set, matching every
/// endpoint's "don't block on close" requirement.
pub fn build_socket(ctx: &zmq::Context, kind: zmq::SocketType) -> Result<zmq::Socket, FrameworkError> {
    let socket = ctx.socket(kind)?;
    socket.set_linger(0)?;
    Ok(socket)
}

/// Bind if the URI names a wildcard binding (contains `*`), otherwise connect.
pub fn bind_or_connect(socket: &zmq::Socket, uri: &str) -> Result<(), FrameworkError> {
    if uri.contains('*') {
        socket.bind(uri)?;
    } else {
        socket.connect(uri)?;
    }
    Ok(())
}

/// Set a receive timeout in milliseconds. `0` means "never block".
pub fn set_recv_timeout(socket: &zmq::Socket, timeout_ms: i32) -> Result<(), FrameworkError> {
    socket.set_rcvtimeo(timeout_ms)?;
    Ok(())
}

/// Poll a single socket for readability, returning once data is available or
/// the timeout (milliseconds; `-1` blocks indefinitely) elapses.
pub fn poll_readable(socket: &zmq::Socket, timeout_ms: i64) -> Result<bool, FrameworkError> {
    let mut items = [socket.as_poll_item(zmq::POLLIN)];
    let rc = zmq::poll(&mut items, timeout_ms)?;
    Ok(rc > 0 && items[0].is_readable())
}

/// Whether the socket has more frames of the current message to read.
pub fn has_more(socket: &zmq::Socket) -> Result<bool, FrameworkError> {
    Ok(socket.get_rcvmore()?)
}
