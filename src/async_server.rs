//! The server side of the asynchronous request/reply multiplexer.
//!
//! A `ROUTER` socket is owned by a single I/O thread, decoupled from request
//! handling by two queues: the I/O thread pushes arrivals onto
//! `request_queue` and drains `reply_queue` back onto the wire. Either a
//! fixed-size worker pool drains `request_queue` and calls a user-supplied
//! service closure (`with_service`), or the caller drives the queues directly
//! through [`AsyncServer::recv`] / [`AsyncServer::reply`] (`bind`), e.g. to
//! plug in the RMI service loop instead of a plain byte-to-byte function.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use crate::error::FrameworkError;
use crate::queue::SyncQueue;
use crate::serialize::{pack, unpack, ByteArray};
use crate::socket::{build_socket, new_context, poll_readable};
use crate::stopper::Stopper;
use crate::transport::TransmissionPolicy;

/// One decoded inbound request, as handed to a worker (or a caller of
/// `recv()` in non-service mode).
#[derive(Debug, Clone)]
pub struct Msg {
    pub peer_id: Vec<u8>,
    pub req_id: u64,
    pub bytes: ByteArray,
}

type Envelope = (Vec<u8>, u64, ByteArray);

pub struct AsyncServer {
    request_queue: Arc<SyncQueue<Option<Msg>>>,
    reply_queue: Arc<SyncQueue<Option<Envelope>>>,
    io_stopper: Arc<Stopper>,
    io_thread: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl AsyncServer {
    /// Bind `uri` and start the I/O thread only; requests and replies are
    /// driven by the caller through `recv`/`try_recv`/`reply`.
    pub fn bind(
        uri: &str,
        policy: Arc<dyn TransmissionPolicy>,
        poll_timeout: Duration,
    ) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::ROUTER)?;
        socket.bind(uri)?;

        let request_queue: Arc<SyncQueue<Option<Msg>>> = Arc::new(SyncQueue::new());
        let reply_queue: Arc<SyncQueue<Option<Envelope>>> = Arc::new(SyncQueue::new());
        let io_stopper = Arc::new(Stopper::new());

        let io_thread = {
            let request_queue = request_queue.clone();
            let reply_queue = reply_queue.clone();
            let io_stopper = io_stopper.clone();
            thread::Builder::new()
                .name("async-server-io".into())
                .spawn(move || {
                    Self::io_loop(
                        socket,
                        request_queue,
                        reply_queue,
                        io_stopper,
                        policy,
                        poll_timeout,
                    )
                })
                .expect("failed to spawn async server I/O thread")
        };

        Ok(AsyncServer {
            request_queue,
            reply_queue,
            io_stopper,
            io_thread: Some(io_thread),
            worker_handles: Vec::new(),
        })
    }

    /// Bind `uri`, start the I/O thread, and additionally start
    /// `num_workers` threads that pull from the request queue, call
    /// `service`, and push onto the reply queue (skipping request id 0).
    pub fn with_service<F>(
        uri: &str,
        policy: Arc<dyn TransmissionPolicy>,
        poll_timeout: Duration,
        num_workers: usize,
        service: F,
    ) -> Result<Self, FrameworkError>
    where
        F: Fn(ByteArray) -> ByteArray + Send + Sync + 'static,
    {
        let mut server = Self::bind(uri, policy, poll_timeout)?;
        let service = Arc::new(service);
        let num_workers = num_workers.max(1);
        for i in 0..num_workers {
            let request_queue = server.request_queue.clone();
            let reply_queue = server.reply_queue.clone();
            let service = service.clone();
            let handle = thread::Builder::new()
                .name(format!("async-server-worker-{i}"))
                .spawn(move || loop {
                    let Some(msg) = request_queue.pop() else {
                        break;
                    };
                    let reply_bytes = service(msg.bytes);
                    // Request id 0 is fire-and-forget: the service still ran
                    // exactly once, but no reply is ever enqueued.
                    if msg.req_id != 0 {
                        reply_queue.push(Some((msg.peer_id, msg.req_id, reply_bytes)));
                    }
                })
                .expect("failed to spawn async server worker");
            server.worker_handles.push(handle);
        }
        Ok(server)
    }

    /// Pull the next request in non-service mode (blocks).
    pub fn recv(&self) -> Option<Msg> {
        self.request_queue.pop()
    }

    /// Pull the next request without blocking.
    pub fn try_recv(&self) -> Option<Msg> {
        self.request_queue.try_pop().flatten()
    }

    /// Enqueue a reply for the I/O thread to send. A reply for request id 0
    /// is silently dropped, matching the worker-pool behavior.
    pub fn reply(&self, peer_id: Vec<u8>, req_id: u64, bytes: ByteArray) {
        if req_id == 0 {
            return;
        }
        self.reply_queue.push(Some((peer_id, req_id, bytes)));
    }

    fn io_loop(
        socket: zmq::Socket,
        request_queue: Arc<SyncQueue<Option<Msg>>>,
        reply_queue: Arc<SyncQueue<Option<Envelope>>>,
        stopper: Arc<Stopper>,
        policy: Arc<dyn TransmissionPolicy>,
        poll_timeout: Duration,
    ) {
        loop {
            if stopper.should_stop() {
                break;
            }

            if poll_readable(&socket, poll_timeout.as_millis() as i64).unwrap_or(false) {
                if let Err(err) = Self::receive_one(&socket, &request_queue, policy.as_ref()) {
                    warn!(?err, "async server failed to process an incoming request");
                }
            }

            while let Some(envelope) = reply_queue.try_pop() {
                let Some((peer_id, req_id, bytes)) = envelope else {
                    continue;
                };
                if req_id == 0 {
                    continue;
                }
                if let Err(err) = Self::send_reply(&socket, policy.as_ref(), &peer_id, req_id, bytes)
                {
                    warn!(?err, "async server failed to send a reply");
                }
            }

            if stopper.should_stop() {
                break;
            }
        }
        stopper.notify_done();
    }

    fn receive_one(
        socket: &zmq::Socket,
        request_queue: &SyncQueue<Option<Msg>>,
        policy: &dyn TransmissionPolicy,
    ) -> Result<(), FrameworkError> {
        let peer_id = socket.recv_bytes(0)?;
        let _delimiter = socket.recv_bytes(0)?;
        let payload = policy.receive_buffer(socket)?;
        let (req_id, bytes): (u64, ByteArray) = unpack(&payload)?;
        request_queue.push(Some(Msg {
            peer_id,
            req_id,
            bytes,
        }));
        Ok(())
    }

    fn send_reply(
        socket: &zmq::Socket,
        policy: &dyn TransmissionPolicy,
        peer_id: &[u8],
        req_id: u64,
        bytes: ByteArray,
    ) -> Result<(), FrameworkError> {
        socket.send(peer_id, zmq::SNDMORE)?;
        socket.send(&[] as &[u8], zmq::SNDMORE)?;
        policy.send_buffer(socket, &pack(&(req_id, bytes)))
    }

    /// Stop the I/O thread and every worker, waiting up to `timeout` total.
    /// Returns whether everything stopped within the bound.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        for _ in &self.worker_handles {
            self.request_queue.push_front(None);
        }
        let mut all_ok = true;
        for handle in self.worker_handles.drain(..) {
            if handle.join().is_err() {
                all_ok = false;
            }
        }

        self.io_stopper.request_stop();
        if let Some(handle) = self.io_thread.take() {
            all_ok &= Stopper::join(handle, &self.io_stopper.done_rx(), timeout);
        }
        all_ok
    }
}

impl Drop for AsyncServer {
    fn drop(&mut self) {
        if self.io_thread.is_some() {
            self.stop(Duration::from_secs(2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_client::AsyncClient;
    use crate::transport::SizePrefixedPolicy;
    use std::sync::atomic::Ordering;

    #[test]
    fn echo_reverse_via_worker_pool() {
        let uri = "ipc:///tmp/rmi-comms-async-server-echo";
        let mut server = AsyncServer::with_service(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(20),
            2,
            |bytes: ByteArray| bytes.into_iter().rev().collect(),
        )
        .unwrap();

        let mut client = AsyncClient::connect(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(20),
        )
        .unwrap();

        let reply = client.send(b"hello".to_vec(), None);
        assert_eq!(reply.get(), b"olleh".to_vec());

        client.stop(Duration::from_secs(2));
        server.stop(Duration::from_secs(2));
    }

    #[test]
    fn fire_and_forget_runs_once_with_no_reply() {
        let uri = "ipc:///tmp/rmi-comms-async-server-fire-and-forget";
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter2 = counter.clone();
        let mut server = AsyncServer::with_service(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(20),
            1,
            move |bytes: ByteArray| {
                counter2.fetch_add(1, Ordering::SeqCst);
                bytes
            },
        )
        .unwrap();

        let mut client = AsyncClient::connect(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(20),
        )
        .unwrap();

        let reply = client.send_no_reply(b"noop".to_vec());
        // Pre-resolved locally; never touches the wire.
        assert_eq!(reply.get(), ByteArray::new());

        // Give the fire-and-forget request time to actually reach the server.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        client.stop(Duration::from_secs(2));
        server.stop(Duration::from_secs(2));
    }

    #[test]
    fn parallel_many_requests_all_resolve() {
        let uri = "ipc:///tmp/rmi-comms-async-server-parallel";
        let mut server = AsyncServer::with_service(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(10),
            4,
            |bytes: ByteArray| bytes,
        )
        .unwrap();

        let client = Arc::new(
            AsyncClient::connect(
                uri,
                Arc::new(SizePrefixedPolicy::default()),
                Duration::from_millis(5),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0u32..1000 {
            let client = client.clone();
            handles.push(thread::spawn(move || {
                let got: u32 = client.send_args(&i).into_value().unwrap();
                assert_eq!(got, i);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        server.stop(Duration::from_secs(2));
    }
}
