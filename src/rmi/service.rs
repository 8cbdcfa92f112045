//! A named endpoint that dispatches incoming `(method-id, args)` requests to
//! a [`MethodRegistry`] and replies with an OK/ERROR status frame.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{FrameworkError, MethodError};
use crate::rmi::registry::MethodRegistry;
use crate::rmi::{STATUS_ERROR, STATUS_OK};
use crate::serialize::{pack, unpack};
use crate::socket::{build_socket, has_more, new_context, poll_readable};
use crate::stopper::Stopper;

pub struct Service {
    uri: String,
    stopper: Arc<Stopper>,
    thread: Option<JoinHandle<()>>,
}

impl Service {
    pub fn start(
        uri: &str,
        registry: MethodRegistry,
        poll_timeout: Duration,
    ) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::ROUTER)?;
        socket.bind(uri)?;

        let registry = Arc::new(registry);
        let stopper = Arc::new(Stopper::new());
        let thread = {
            let stopper = stopper.clone();
            thread::Builder::new()
                .name(format!("rmi-service-{uri}"))
                .spawn(move || Self::loop_body(socket, registry, stopper, poll_timeout))
                .expect("failed to spawn RMI service thread")
        };

        Ok(Service {
            uri: uri.to_string(),
            stopper,
            thread: Some(thread),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn loop_body(
        socket: zmq::Socket,
        registry: Arc<MethodRegistry>,
        stopper: Arc<Stopper>,
        poll_timeout: Duration,
    ) {
        loop {
            if stopper.should_stop() {
                break;
            }
            if poll_readable(&socket, poll_timeout.as_millis() as i64).unwrap_or(false) {
                if let Err(err) = Self::handle_one(&socket, &registry) {
                    warn!(?err, "RMI service failed to handle a request");
                }
            }
        }
        stopper.notify_done();
    }

    fn handle_one(socket: &zmq::Socket, registry: &MethodRegistry) -> Result<(), FrameworkError> {
        let peer_id = socket.recv_bytes(0)?;
        let _delimiter = socket.recv_bytes(0)?;
        let method_frame = socket.recv_bytes(0)?;
        let method_id: i32 = unpack(&method_frame)?;

        let args_bytes = if has_more(socket)? {
            socket.recv_bytes(0)?
        } else {
            Vec::new()
        };

        trace!(method_id, args_len = args_bytes.len(), "RMI service dispatch");

        let (status, payload) = match registry.invoke(method_id, &args_bytes) {
            Ok(result_bytes) => (STATUS_OK, result_bytes),
            Err(MethodError::NotFound(id)) => (STATUS_ERROR, pack(&format!("method {id} not found"))),
            Err(MethodError::BadArgs(e)) => (STATUS_ERROR, pack(&format!("bad arguments: {e}"))),
            Err(MethodError::Application(msg)) => (STATUS_ERROR, pack(&msg)),
        };

        socket.send(&peer_id, zmq::SNDMORE)?;
        socket.send(&[] as &[u8], zmq::SNDMORE)?;
        socket.send(&pack(&status), zmq::SNDMORE)?;
        socket.send(&payload, 0)?;
        Ok(())
    }

    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stopper.request_stop();
        match self.thread.take() {
            Some(handle) => Stopper::join(handle, &self.stopper.done_rx(), timeout),
            None => true,
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop(Duration::from_secs(2));
        }
    }
}
