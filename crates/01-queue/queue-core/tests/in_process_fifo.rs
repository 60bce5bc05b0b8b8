//! Ordering and capacity properties of the in-process queue.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use queue_core::{InProcessQueue, MessageQueue, QueueError};

proptest! {
    /// Whatever was accepted comes back out in acceptance order, and nothing
    /// beyond capacity is ever accepted.
    #[test]
    fn accepted_messages_drain_in_order(
        capacity in 1usize..8,
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..16),
    ) {
        let queue = InProcessQueue::new(capacity).expect("queue");
        let mut accepted = Vec::new();
        for payload in &payloads {
            match queue.put(payload, Some(Duration::ZERO)) {
                Ok(()) => accepted.push(payload.clone()),
                Err(QueueError::TimedOut) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        prop_assert!(accepted.len() <= capacity);
        prop_assert_eq!(accepted.len(), payloads.len().min(capacity));

        let mut drained = Vec::new();
        while let Ok(message) = queue.get(Some(Duration::ZERO)) {
            drained.push(message);
        }
        prop_assert_eq!(drained, accepted);
    }
}

#[test]
fn single_producer_order_survives_backpressure() {
    let queue: Arc<dyn MessageQueue> = Arc::new(InProcessQueue::new(2).expect("queue"));
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0u32..200 {
                queue
                    .put(&i.to_le_bytes(), Some(Duration::from_secs(5)))
                    .expect("put");
            }
        })
    };

    for expected in 0u32..200 {
        let message = queue.get(Some(Duration::from_secs(5))).expect("get");
        assert_eq!(message, expected.to_le_bytes());
    }
    producer.join().expect("producer");
}
