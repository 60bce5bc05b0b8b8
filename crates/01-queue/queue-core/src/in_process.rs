//! Bounded FIFO queue confined to one process.
//!
//! A `put` against a full queue or a `get` against an empty one parks only the
//! calling thread on a condition variable until space or data shows up, the
//! deadline passes, or the queue is closed.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::wait::Deadline;
use crate::{MessageQueue, QueueError, QueueResult};

struct State {
    messages: VecDeque<Vec<u8>>,
    closed: bool,
}

/// In-process bounded queue with blocking, timeout-aware `put`/`get`.
///
/// The queue is `Sync`; share it between threads behind an `Arc`.
pub struct InProcessQueue {
    max_messages: usize,
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl InProcessQueue {
    /// Creates a queue holding at most `max_messages` payloads.
    pub fn new(max_messages: usize) -> QueueResult<Self> {
        if max_messages == 0 {
            return Err(QueueError::InvalidConfig(
                "in-process queue capacity must be at least one message",
            ));
        }
        Ok(Self {
            max_messages,
            state: Mutex::new(State {
                messages: VecDeque::with_capacity(max_messages.min(1024)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueues `message`, waiting up to `timeout` for free capacity.
    pub fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        let deadline = Deadline::after(timeout);
        let message = message.to_vec();
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.messages.len() < self.max_messages {
                state.messages.push_back(message);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            match deadline.instant() {
                None => self.not_full.wait(&mut state),
                Some(at) => {
                    if deadline.expired() {
                        return Err(QueueError::TimedOut);
                    }
                    // Timeout results are ignored; the loop re-checks capacity
                    // before deciding the wait expired.
                    let _ = self.not_full.wait_until(&mut state, at);
                }
            }
        }
    }

    /// Dequeues the oldest message, waiting up to `timeout` for one to arrive.
    pub fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        let deadline = Deadline::after(timeout);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if let Some(message) = state.messages.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(message);
            }
            match deadline.instant() {
                None => self.not_empty.wait(&mut state),
                Some(at) => {
                    if deadline.expired() {
                        return Err(QueueError::TimedOut);
                    }
                    let _ = self.not_empty.wait_until(&mut state, at);
                }
            }
        }
    }

    /// Closes the queue: parked callers wake with [`QueueError::Closed`] and
    /// buffered messages are discarded. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.messages.len();
        state.messages.clear();
        drop(state);
        if dropped > 0 {
            tracing::debug!(dropped, "in-process queue closed with buffered messages");
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl MessageQueue for InProcessQueue {
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        InProcessQueue::put(self, message, timeout)
    }

    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        InProcessQueue::get(self, timeout)
    }

    fn close(&mut self) -> QueueResult<()> {
        self.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            InProcessQueue::new(0),
            Err(QueueError::InvalidConfig(_))
        ));
    }

    #[test]
    fn put_then_get_round_trips() {
        let queue = InProcessQueue::new(1).expect("queue");
        queue.put(b"x", None).expect("put");
        assert_eq!(queue.get(None).expect("get"), b"x");
        assert!(queue.is_empty());
    }

    #[test]
    fn get_times_out_on_empty_queue() {
        let queue = InProcessQueue::new(1).expect("queue");
        let start = Instant::now();
        let err = queue.get(Some(Duration::from_millis(100))).unwrap_err();
        let elapsed = start.elapsed();
        assert!(err.is_timed_out());
        assert!(elapsed >= Duration::from_millis(95), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
    }

    #[test]
    fn put_times_out_on_full_queue() {
        let queue = InProcessQueue::new(1).expect("queue");
        queue.put(b"x", None).expect("fill");
        let start = Instant::now();
        let err = queue.put(b"x", Some(Duration::from_millis(100))).unwrap_err();
        assert!(err.is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(95));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn zero_timeout_never_blocks() {
        let queue = InProcessQueue::new(1).expect("queue");
        queue.put(b"1", Some(Duration::ZERO)).expect("first put fits");

        let start = Instant::now();
        let err = queue.put(b"2", Some(Duration::ZERO)).unwrap_err();
        assert!(err.is_timed_out());
        assert_eq!(queue.get(Some(Duration::ZERO)).expect("get"), b"1");
        assert!(queue.get(Some(Duration::ZERO)).unwrap_err().is_timed_out());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn blocked_get_wakes_on_put() {
        let queue = Arc::new(InProcessQueue::new(1).expect("queue"));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get(Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(50));
        queue.put(b"late", None).expect("put");
        assert_eq!(consumer.join().expect("join").expect("get"), b"late");
    }

    #[test]
    fn blocked_put_wakes_on_get() {
        let queue = Arc::new(InProcessQueue::new(1).expect("queue"));
        queue.put(b"a", None).expect("fill");
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.put(b"b", Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.get(None).expect("get"), b"a");
        producer.join().expect("join").expect("put");
        assert_eq!(queue.get(None).expect("get"), b"b");
    }

    #[test]
    fn shutdown_wakes_parked_callers() {
        let queue = Arc::new(InProcessQueue::new(1).expect("queue"));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get(None))
        };
        thread::sleep(Duration::from_millis(50));
        queue.shutdown();
        assert!(matches!(
            waiter.join().expect("join"),
            Err(QueueError::Closed)
        ));
        assert!(matches!(queue.put(b"x", None), Err(QueueError::Closed)));
    }

    #[test]
    fn empty_payload_is_a_message() {
        let queue = InProcessQueue::new(2).expect("queue");
        queue.put(b"", None).expect("put");
        assert_eq!(queue.get(Some(Duration::ZERO)).expect("get"), Vec::<u8>::new());
    }

    #[test]
    fn blocked_put_keeps_its_own_copy_of_the_payload() {
        let queue = Arc::new(InProcessQueue::new(1).expect("queue"));
        queue.put(b"a", None).expect("fill");
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut buffer = b"b".to_vec();
                let result = queue.put(&buffer, Some(Duration::from_secs(5)));
                buffer[0] = b'z';
                result
            })
        };
        thread::sleep(Duration::from_millis(50));
        // The parked put must not keep the lock; a get and a len both go through.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(None).expect("get"), b"a");
        producer.join().expect("join").expect("put");
        assert_eq!(queue.get(None).expect("get"), b"b");
    }
}
