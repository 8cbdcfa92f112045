//! An unbounded, multi-producer multi-consumer FIFO with a blocking `pop`.
//!
//! Used to hand work between a socket's owning I/O thread and the rest of the
//! process without ever touching the socket from more than one thread.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

pub struct SyncQueue<T> {
    inner: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        SyncQueue {
            inner: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append to the back of the queue.
    pub fn push(&self, value: T) {
        self.inner.lock().push_back(value);
        self.ready.notify_one();
    }

    /// Insert at the front, ahead of everything already queued. Used to wake a
    /// blocked `pop()` with a sentinel value (e.g. on stop).
    pub fn push_front(&self, value: T) {
        self.inner.lock().push_front(value);
        self.ready.notify_one();
    }

    /// Append every item from an iterator in order.
    pub fn buffer<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut guard = self.inner.lock();
        let before = guard.len();
        guard.extend(items);
        if guard.len() > before {
            drop(guard);
            self.ready.notify_all();
        }
    }

    /// Block until an item is available, then remove and return it.
    pub fn pop(&self) -> T {
        let mut guard = self.inner.lock();
        loop {
            if let Some(value) = guard.pop_front() {
                return value;
            }
            self.ready.wait(&mut guard);
        }
    }

    /// Block up to `timeout`, returning `None` if nothing arrived in time.
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<T> {
        let mut guard = self.inner.lock();
        if let Some(value) = guard.pop_front() {
            return Some(value);
        }
        let result = self.ready.wait_for(&mut guard, timeout);
        if result.timed_out() {
            return guard.pop_front();
        }
        guard.pop_front()
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_is_preserved() {
        let q = SyncQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), 1);
        assert_eq!(q.pop(), 2);
        assert_eq!(q.pop(), 3);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let q = SyncQueue::new();
        q.push(1);
        q.push_front(0);
        assert_eq!(q.pop(), 0);
        assert_eq!(q.pop(), 1);
    }

    #[test]
    fn pop_blocks_until_pushed() {
        let q = Arc::new(SyncQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn sentinel_wakes_a_blocked_consumer() {
        let q: Arc<SyncQueue<Option<i32>>> = Arc::new(SyncQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push_front(None);
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let q: SyncQueue<i32> = SyncQueue::new();
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), None);
    }
}
