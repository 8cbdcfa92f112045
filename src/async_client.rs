//! The client side of the asynchronous request/reply multiplexer.
//!
//! A single `DEALER` socket is owned by one background worker thread. Calls
//! to [`AsyncClient::send`] hand a packed `(request-id, payload)` frame to an
//! outbound queue and register a completion slot in the waitlist; the worker
//! thread is the only thing that ever touches the socket, draining the
//! outbound queue and resolving replies as they arrive, in either order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{DecodeError, FrameworkError};
use crate::serialize::{pack, unpack, ByteArray, Wire};
use crate::socket::{build_socket, new_context, poll_readable};
use crate::stopper::Stopper;
use crate::transport::TransmissionPolicy;

type WaitList = Arc<Mutex<HashMap<u64, crossbeam::channel::Sender<ByteArray>>>>;

/// A handle to an in-flight (or already fire-and-forget) request's eventual
/// reply bytes. Single-consume: `get()` takes `self` by value.
pub struct Reply {
    req_id: u64,
    rx: crossbeam::channel::Receiver<ByteArray>,
}

impl Reply {
    pub fn req_id(&self) -> u64 {
        self.req_id
    }

    /// Block until the reply arrives (or the client is stopped, which
    /// resolves every pending reply with an empty buffer).
    pub fn get(self) -> ByteArray {
        self.rx.recv().unwrap_or_default()
    }

    /// Block for the reply and decode it as `T`.
    pub fn into_value<T: Wire>(self) -> Result<T, DecodeError> {
        unpack(&self.get())
    }
}

/// Connected `DEALER`-side client. Cloneable: clones share the same worker
/// thread, outbound queue and waitlist.
pub struct AsyncClient {
    outbound: Arc<crate::queue::SyncQueue<Option<ByteArray>>>,
    waitlist: WaitList,
    next_id: Arc<AtomicU64>,
    stopper: Arc<Stopper>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncClient {
    pub fn connect(
        uri: &str,
        policy: Arc<dyn TransmissionPolicy>,
        poll_timeout: Duration,
    ) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::DEALER)?;
        socket.connect(uri)?;

        let outbound: Arc<crate::queue::SyncQueue<Option<ByteArray>>> =
            Arc::new(crate::queue::SyncQueue::new());
        let waitlist: WaitList = Arc::new(Mutex::new(HashMap::new()));
        let next_id = Arc::new(AtomicU64::new(1));
        let stopper = Arc::new(Stopper::new());

        let worker = {
            let outbound = outbound.clone();
            let waitlist = waitlist.clone();
            let stopper = stopper.clone();
            thread::Builder::new()
                .name("async-client".into())
                .spawn(move || {
                    Self::worker_loop(socket, outbound, waitlist, stopper, policy, poll_timeout)
                })
                .expect("failed to spawn async client worker")
        };

        Ok(AsyncClient {
            outbound,
            waitlist,
            next_id,
            stopper,
            worker: Some(worker),
        })
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            // The counter just wrapped past u64::MAX; 0 is reserved for
            // fire-and-forget, so consume one more slot.
            self.next_id.fetch_add(1, Ordering::Relaxed)
        } else {
            id
        }
    }

    /// Send `bytes`, allocating a fresh request id unless `req_id` is given.
    /// Passing `Some(0)` (or letting the id land on 0) is fire-and-forget.
    pub fn send(&self, bytes: ByteArray, req_id: Option<u64>) -> Reply {
        let id = req_id.unwrap_or_else(|| self.allocate_id());
        if id == 0 {
            return self.enqueue_no_reply(bytes);
        }
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.waitlist.lock().insert(id, tx);
        self.outbound.push(Some(pack(&(id, bytes))));
        Reply { req_id: id, rx }
    }

    pub fn send_args<T: Wire>(&self, args: &T) -> Reply {
        self.send(pack(args), None)
    }

    pub fn send_no_reply(&self, bytes: ByteArray) -> Reply {
        self.enqueue_no_reply(bytes)
    }

    pub fn send_args_no_reply<T: Wire>(&self, args: &T) {
        let _ = self.send_no_reply(pack(args));
    }

    fn enqueue_no_reply(&self, bytes: ByteArray) -> Reply {
        self.outbound.push(Some(pack(&(0u64, bytes))));
        let (tx, rx) = crossbeam::channel::bounded(1);
        let _ = tx.send(Vec::new());
        Reply { req_id: 0, rx }
    }

    /// Request the worker thread to stop, wait up to `timeout`, and resolve
    /// every still-pending reply with an empty buffer so no caller blocks
    /// forever. Returns whether the worker exited within the bound.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stopper.request_stop();
        self.outbound.push_front(None);
        match self.worker.take() {
            Some(handle) => Stopper::join(handle, &self.stopper.done_rx(), timeout),
            None => true,
        }
    }

    fn worker_loop(
        socket: zmq::Socket,
        outbound: Arc<crate::queue::SyncQueue<Option<ByteArray>>>,
        waitlist: WaitList,
        stopper: Arc<Stopper>,
        policy: Arc<dyn TransmissionPolicy>,
        poll_timeout: Duration,
    ) {
        loop {
            if stopper.should_stop() {
                break;
            }

            let readable = poll_readable(&socket, poll_timeout.as_millis() as i64).unwrap_or(false);
            if readable {
                if let Err(err) = Self::receive_one(&socket, &waitlist, policy.as_ref()) {
                    warn!(?err, "async client failed to process an incoming reply");
                }
            }

            while let Some(frame) = outbound.try_pop() {
                let Some(frame) = frame else { continue };
                if let Err(err) = socket.send(&[] as &[u8], zmq::SNDMORE) {
                    warn!(?err, "async client failed to send delimiter frame");
                    continue;
                }
                if let Err(err) = policy.send_buffer(&socket, &frame) {
                    warn!(?err, "async client failed to send request frame");
                }
            }

            if stopper.should_stop() {
                break;
            }
        }

        for (_, tx) in waitlist.lock().drain() {
            let _ = tx.send(Vec::new());
        }
        stopper.notify_done();
    }

    fn receive_one(
        socket: &zmq::Socket,
        waitlist: &WaitList,
        policy: &dyn TransmissionPolicy,
    ) -> Result<(), FrameworkError> {
        let _delimiter = socket.recv_bytes(0)?;
        let payload = policy.receive_buffer(socket)?;
        let (reply_id, reply_bytes): (u64, ByteArray) = unpack(&payload)?;
        if reply_id != 0 {
            if let Some(tx) = waitlist.lock().remove(&reply_id) {
                let _ = tx.send(reply_bytes);
            }
        }
        Ok(())
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop(Duration::from_secs(2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SizePrefixedPolicy;
    use std::sync::atomic::AtomicBool;

    /// A minimal router-side echo used to exercise the client in isolation,
    /// without depending on `async_server`.
    fn spawn_echo_server(uri: &str, reverse: bool) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let uri = uri.to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();
        let handle = thread::spawn(move || {
            let ctx = new_context();
            let socket = build_socket(&ctx, zmq::ROUTER).unwrap();
            socket.bind(&uri).unwrap();
            let policy = SizePrefixedPolicy::default();
            while !stop2.load(Ordering::Acquire) {
                if !poll_readable(&socket, 100).unwrap_or(false) {
                    continue;
                }
                let peer = socket.recv_bytes(0).unwrap();
                let _delim = socket.recv_bytes(0).unwrap();
                let payload = policy.receive_buffer(&socket).unwrap();
                let (req_id, bytes): (u64, ByteArray) = unpack(&payload).unwrap();
                if req_id == 0 {
                    continue;
                }
                let reply_bytes = if reverse {
                    bytes.iter().rev().cloned().collect()
                } else {
                    bytes
                };
                socket.send(&peer, zmq::SNDMORE).unwrap();
                socket.send(&[] as &[u8], zmq::SNDMORE).unwrap();
                policy
                    .send_buffer(&socket, &pack(&(req_id, reply_bytes)))
                    .unwrap();
            }
        });
        (handle, stop)
    }

    #[test]
    fn echo_reverse_round_trips() {
        let uri = "ipc:///tmp/rmi-comms-async-client-echo";
        let (server, stop) = spawn_echo_server(uri, true);
        thread::sleep(Duration::from_millis(100));

        let mut client = AsyncClient::connect(
            uri,
            Arc::new(SizePrefixedPolicy::default()),
            Duration::from_millis(20),
        )
        .unwrap();

        let reply = client.send(b"hello".to_vec(), None);
        assert_eq!(reply.get(), b"olleh".to_vec());

        client.stop(Duration::from_secs(2));
        stop.store(true, Ordering::Release);
        server.join().unwrap();
    }

    #[test]
    fn many_concurrent_requests_all_resolve_without_id_collisions() {
        let uri = "ipc:///tmp/rmi-comms-async-client-parallel";
        let (server, stop) = spawn_echo_server(uri, false);
        thread::sleep(Duration::from_millis(100));

        let client = Arc::new(
            AsyncClient::connect(
                uri,
                Arc::new(SizePrefixedPolicy::default()),
                Duration::from_millis(5),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0u32..200 {
            let client = client.clone();
            handles.push(thread::spawn(move || {
                let reply = client.send_args(&i);
                assert_eq!(reply.req_id() != 0, true);
                let got: u32 = reply.into_value().unwrap();
                assert_eq!(got, i);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        stop.store(true, Ordering::Release);
        server.join().unwrap();
    }
}
