//! Shared "stop a background worker thread and bound the wait" pattern used
//! by every endpoint that owns a dedicated I/O thread (stream, pipeline,
//! async client/server). Not part of the public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Handed to callers of `stop()`; `wake()` must unblock whatever the worker
/// thread might be parked on (a queue pop, a socket poll) so it can observe
/// the stop flag promptly.
pub(crate) struct Stopper {
    flag: AtomicBool,
    done_rx: crossbeam::channel::Receiver<()>,
    done_tx: crossbeam::channel::Sender<()>,
}

impl Stopper {
    pub(crate) fn new() -> Self {
        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        Stopper {
            flag: AtomicBool::new(false),
            done_rx,
            done_tx,
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Called by the worker thread right before it returns.
    pub(crate) fn notify_done(&self) {
        let _ = self.done_tx.send(());
    }

    /// Block up to `timeout` for the worker's `notify_done`, then join it.
    /// Returns whether the worker finished within the bound.
    pub(crate) fn join(handle: JoinHandle<()>, done_rx: &crossbeam::channel::Receiver<()>, timeout: Duration) -> bool {
        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                let _ = handle.join();
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn done_rx(&self) -> crossbeam::channel::Receiver<()> {
        self.done_rx.clone()
    }
}
