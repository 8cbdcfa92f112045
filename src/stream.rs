//! One-way publish/subscribe streaming: a [`Publisher`] fans bytes out to any
//! number of [`Subscriber`]s, each buffering locally and running its own
//! background receive loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::FrameworkError;
use crate::queue::SyncQueue;
use crate::serialize::{pack, ByteArray, Wire};
use crate::socket::{build_socket, new_context, set_recv_timeout};
use crate::stopper::Stopper;
use crate::transport::TransmissionPolicy;

/// Bitflags describing a stream endpoint's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
    pub const NONE: Status = Status(0);
    pub const STARTED: Status = Status(1 << 0);
    pub const STOPPED: Status = Status(1 << 1);
    pub const TIMED_OUT: Status = Status(1 << 2);

    pub fn contains(self, bit: Status) -> bool {
        self.0 & bit.0 != 0
    }
}

struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    fn new(initial: Status) -> Self {
        AtomicStatus(AtomicU8::new(initial.0))
    }

    fn get(&self) -> Status {
        Status(self.0.load(Ordering::Acquire))
    }

    fn set(&self, status: Status) {
        self.0.store(status.0, Ordering::Release);
    }

    fn add(&self, bit: Status) {
        self.0.fetch_or(bit.0, Ordering::AcqRel);
    }
}

/// Publish-side endpoint. Bytes handed to `send`/`send_args` are queued and
/// flushed by a dedicated sender thread.
pub struct Publisher {
    queue: Arc<SyncQueue<Option<ByteArray>>>,
    stopper: Arc<Stopper>,
    status: Arc<AtomicStatus>,
    worker: Option<JoinHandle<()>>,
}

impl Publisher {
    pub fn start(uri: &str, policy: Arc<dyn TransmissionPolicy>) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::PUB)?;
        socket.bind(uri)?;

        let queue: Arc<SyncQueue<Option<ByteArray>>> = Arc::new(SyncQueue::new());
        let stopper = Arc::new(Stopper::new());
        let status = Arc::new(AtomicStatus::new(Status::STARTED));

        let worker_queue = queue.clone();
        let worker_stopper = stopper.clone();
        let worker_status = status.clone();
        let worker = thread::Builder::new()
            .name("stream-publisher".into())
            .spawn(move || {
                loop {
                    match worker_queue.pop() {
                        None => break,
                        Some(bytes) => {
                            if let Err(err) = policy.send_buffer(&socket, &bytes) {
                                warn!(?err, "publisher send failed");
                            }
                        }
                    }
                    if worker_stopper.should_stop() {
                        break;
                    }
                }
                worker_status.add(Status::STOPPED);
                worker_stopper.notify_done();
                debug!("publisher worker exiting");
            })
            .expect("failed to spawn publisher thread");

        Ok(Publisher {
            queue,
            stopper,
            status,
            worker: Some(worker),
        })
    }

    pub fn send(&self, bytes: ByteArray) {
        self.queue.push(Some(bytes));
    }

    pub fn send_args<T: Wire>(&self, value: &T) {
        self.send(pack(value));
    }

    pub fn buffer<I: IntoIterator<Item = ByteArray>>(&self, items: I) {
        self.queue.buffer(items.into_iter().map(Some));
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Signal the worker to stop after draining what's queued, and wait up to
    /// `timeout` for it to exit. Returns whether it exited in time.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stopper.request_stop();
        self.queue.push_front(None);
        match self.worker.take() {
            Some(handle) => Stopper::join(handle, &self.stopper.done_rx(), timeout),
            None => true,
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop(Duration::from_millis(500));
        }
    }
}

/// Subscribe-side endpoint. Remembers its last `(uri, buffer_size, timeout)`
/// so `restart()` can be called without re-specifying them.
pub struct Subscriber {
    queue: Arc<SyncQueue<Option<ByteArray>>>,
    stopper: Arc<Stopper>,
    status: Arc<AtomicStatus>,
    worker: Option<JoinHandle<()>>,
    uri: String,
    buffer_size: usize,
    timeout: Duration,
    policy: Arc<dyn TransmissionPolicy>,
}

impl Subscriber {
    pub fn start(
        uri: &str,
        buffer_size: usize,
        timeout: Duration,
        policy: Arc<dyn TransmissionPolicy>,
    ) -> Result<Self, FrameworkError> {
        let queue: Arc<SyncQueue<Option<ByteArray>>> = Arc::new(SyncQueue::new());
        let stopper = Arc::new(Stopper::new());
        let status = Arc::new(AtomicStatus::new(Status::STARTED));
        let worker = Self::spawn_worker(
            uri,
            buffer_size,
            timeout,
            policy.clone(),
            queue.clone(),
            stopper.clone(),
            status.clone(),
        )?;

        Ok(Subscriber {
            queue,
            stopper,
            status,
            worker: Some(worker),
            uri: uri.to_string(),
            buffer_size,
            timeout,
            policy,
        })
    }

    fn spawn_worker(
        uri: &str,
        buffer_size: usize,
        timeout: Duration,
        policy: Arc<dyn TransmissionPolicy>,
        queue: Arc<SyncQueue<Option<ByteArray>>>,
        stopper: Arc<Stopper>,
        status: Arc<AtomicStatus>,
    ) -> Result<JoinHandle<()>, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::SUB)?;
        socket.set_subscribe(b"")?;
        set_recv_timeout(&socket, timeout.as_millis() as i32)?;
        socket.connect(uri)?;

        let handle = thread::Builder::new()
            .name("stream-subscriber".into())
            .spawn(move || {
                loop {
                    if stopper.should_stop() {
                        break;
                    }
                    match policy.receive_buffer(&socket) {
                        Ok(bytes) => {
                            // Bounded buffer: drop the oldest unread message
                            // rather than growing without limit when nobody
                            // is draining the queue.
                            if buffer_size > 0 && queue.len() >= buffer_size {
                                let _ = queue.try_pop();
                            }
                            queue.push(Some(bytes));
                        }
                        Err(FrameworkError::Transport(zmq::Error::EAGAIN)) => {
                            status.add(Status::TIMED_OUT);
                        }
                        Err(err) => {
                            warn!(?err, "subscriber receive failed");
                        }
                    }
                }
                status.add(Status::STOPPED);
                stopper.notify_done();
                debug!("subscriber worker exiting");
            })
            .expect("failed to spawn subscriber thread");
        Ok(handle)
    }

    /// Block popping received messages and invoking `callback` until it
    /// returns `false` or the endpoint is stopped.
    pub fn run_loop(&self, mut callback: impl FnMut(ByteArray) -> bool) {
        loop {
            match self.queue.pop() {
                None => break,
                Some(bytes) => {
                    if !callback(bytes) {
                        break;
                    }
                }
            }
        }
    }

    pub fn try_recv(&self) -> Option<ByteArray> {
        self.queue.try_pop().flatten()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stopper.request_stop();
        self.queue.push_front(None);
        match self.worker.take() {
            Some(handle) => Stopper::join(handle, &self.stopper.done_rx(), timeout),
            None => true,
        }
    }

    /// Stop (if running) and start again with the remembered parameters.
    pub fn restart(&mut self) -> Result<(), FrameworkError> {
        self.stop(self.timeout.max(Duration::from_millis(200)));
        self.stopper = Arc::new(Stopper::new());
        self.status.set(Status::NONE);
        self.status.add(Status::STARTED);
        self.worker = Some(Self::spawn_worker(
            &self.uri,
            self.buffer_size,
            self.timeout,
            self.policy.clone(),
            self.queue.clone(),
            self.stopper.clone(),
            self.status.clone(),
        )?);
        Ok(())
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop(Duration::from_millis(500));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawPolicy;
    use std::time::Duration;

    #[test]
    fn publisher_subscriber_round_trip() {
        let uri = "ipc:///tmp/rmi-comms-stream-test";
        let mut publisher = Publisher::start(uri, Arc::new(RawPolicy)).unwrap();
        let mut subscriber = Subscriber::start(
            uri,
            1024,
            Duration::from_millis(200),
            Arc::new(RawPolicy),
        )
        .unwrap();

        // Give the SUB socket time to establish its connection before the
        // PUB socket starts sending (pub/sub has no connection handshake).
        thread::sleep(Duration::from_millis(200));

        for i in 0u32..10 {
            publisher.send_args(&i);
        }

        let mut received = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while received.len() < 10 && std::time::Instant::now() < deadline {
            if let Some(bytes) = subscriber.try_recv() {
                received.push(crate::serialize::unpack::<u32>(&bytes).unwrap());
            } else {
                thread::sleep(Duration::from_millis(10));
            }
        }

        assert_eq!(received.len(), 10);
        for pair in received.windows(2) {
            assert!(pair[0] <= pair[1]);
        }

        publisher.stop(Duration::from_secs(1));
        subscriber.stop(Duration::from_secs(1));
    }
}
