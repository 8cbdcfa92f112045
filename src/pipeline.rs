//! Load-balanced one-way conveyors: a [`Pusher`] fans work out round-robin to
//! connected [`Puller`]s (or a bound puller fair-queues from many pushers).
//! Both sides block synchronously on send/receive; neither owns a background
//! thread, since there is no reply path to demultiplex.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FrameworkError;
use crate::serialize::{pack, ByteArray, Wire};
use crate::socket::{bind_or_connect, build_socket, new_context, set_recv_timeout};
use crate::transport::TransmissionPolicy;

pub struct Pusher {
    socket: zmq::Socket,
    _ctx: zmq::Context,
    policy: Arc<dyn TransmissionPolicy>,
}

impl Pusher {
    pub fn new(uri: &str, policy: Arc<dyn TransmissionPolicy>) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::PUSH)?;
        bind_or_connect(&socket, uri)?;
        Ok(Pusher {
            socket,
            _ctx: ctx,
            policy,
        })
    }

    pub fn push(&self, bytes: &[u8]) -> Result<(), FrameworkError> {
        self.policy.send_buffer(&self.socket, bytes)
    }

    pub fn push_args<T: Wire>(&self, value: &T) -> Result<(), FrameworkError> {
        self.push(&pack(value))
    }
}

pub struct Puller {
    socket: zmq::Socket,
    _ctx: zmq::Context,
    policy: Arc<dyn TransmissionPolicy>,
}

impl Puller {
    pub fn new(
        uri: &str,
        timeout: Duration,
        policy: Arc<dyn TransmissionPolicy>,
    ) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::PULL)?;
        set_recv_timeout(&socket, timeout.as_millis() as i32)?;
        bind_or_connect(&socket, uri)?;
        Ok(Puller {
            socket,
            _ctx: ctx,
            policy,
        })
    }

    pub fn pull(&self) -> Result<ByteArray, FrameworkError> {
        match self.policy.receive_buffer(&self.socket) {
            Err(FrameworkError::Transport(zmq::Error::EAGAIN)) => Err(FrameworkError::Timeout),
            other => other,
        }
    }
}

/// A pusher and a puller combined, for callers that want a simple blocking
/// request/reply shape built out of two one-way pipes rather than the
/// dealer/router-based async client.
pub struct SyncClientServer {
    pub pusher: Pusher,
    pub puller: Puller,
}

impl SyncClientServer {
    pub fn new(
        push_uri: &str,
        pull_uri: &str,
        timeout: Duration,
        policy: Arc<dyn TransmissionPolicy>,
    ) -> Result<Self, FrameworkError> {
        Ok(SyncClientServer {
            pusher: Pusher::new(push_uri, policy.clone())?,
            puller: Puller::new(pull_uri, timeout, policy)?,
        })
    }

    pub fn call(&self, request: &[u8]) -> Result<ByteArray, FrameworkError> {
        self.pusher.push(request)?;
        self.puller.pull()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawPolicy;
    use std::thread;

    #[test]
    fn fan_out_covers_every_message_across_two_pullers() {
        // The pusher binds (URI contains `*`); both pullers connect to its
        // concrete address. Using the same URI for all three would make
        // every side connect, with nobody bound to fan out to.
        let bind_uri = "tcp://*:28671";
        let connect_uri = "tcp://127.0.0.1:28671";
        let pusher = Pusher::new(bind_uri, Arc::new(RawPolicy)).unwrap();

        let puller_a =
            Puller::new(connect_uri, Duration::from_millis(500), Arc::new(RawPolicy)).unwrap();
        let puller_b =
            Puller::new(connect_uri, Duration::from_millis(500), Arc::new(RawPolicy)).unwrap();
        thread::sleep(Duration::from_millis(100));

        const N: u32 = 100;
        for i in 0..N {
            pusher.push_args(&i).unwrap();
        }

        let handle_a = thread::spawn(move || {
            let mut received = Vec::new();
            while let Ok(bytes) = puller_a.pull() {
                received.push(crate::serialize::unpack::<u32>(&bytes).unwrap());
            }
            received
        });
        let handle_b = thread::spawn(move || {
            let mut received = Vec::new();
            while let Ok(bytes) = puller_b.pull() {
                received.push(crate::serialize::unpack::<u32>(&bytes).unwrap());
            }
            received
        });

        let mut all: Vec<u32> = handle_a.join().unwrap();
        all.extend(handle_b.join().unwrap());
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len() as u32, N);
    }
}
