//! Size-limited, non-blocking publishing of serialized events.

use std::marker::PhantomData;
use std::time::Duration;

use queue_core::{MessageQueue, QueueError};
use thiserror::Error;

use crate::QueueBackend;

/// Largest serialized event accepted by [`EventQueue::put`], in bytes.
pub const MAX_EVENT_SIZE: usize = 102_400;

#[derive(Debug, Error)]
pub enum EventQueueError {
    #[error("event of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    /// The queue had no room; the event was not published.
    #[error("event queue is full")]
    QueueFull,

    #[error(transparent)]
    Queue(QueueError),
}

type Serializer<E> = Box<dyn Fn(&E) -> Vec<u8> + Send + Sync>;

/// Publishes serialized events onto a message queue without ever blocking
/// the caller.
pub struct EventQueue<E, Q = QueueBackend> {
    queue: Q,
    serialize: Serializer<E>,
    _event: PhantomData<fn(&E)>,
}

impl<E, Q: MessageQueue> EventQueue<E, Q> {
    pub fn new(queue: Q, serialize: impl Fn(&E) -> Vec<u8> + Send + Sync + 'static) -> Self {
        Self {
            queue,
            serialize: Box::new(serialize),
            _event: PhantomData,
        }
    }

    /// Serializes `event` and enqueues it with a zero timeout.
    ///
    /// Oversized events are rejected before the queue is touched. A full
    /// queue surfaces as [`EventQueueError::QueueFull`].
    pub fn put(&self, event: &E) -> Result<(), EventQueueError> {
        let payload = (self.serialize)(event);
        if payload.len() > MAX_EVENT_SIZE {
            return Err(EventQueueError::TooLarge {
                size: payload.len(),
                max: MAX_EVENT_SIZE,
            });
        }
        match self.queue.put(&payload, Some(Duration::ZERO)) {
            Ok(()) => Ok(()),
            Err(QueueError::TimedOut) => {
                tracing::warn!(size = payload.len(), "event queue full; dropping event");
                Err(EventQueueError::QueueFull)
            }
            Err(err) => Err(EventQueueError::Queue(err)),
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn into_inner(self) -> Q {
        self.queue
    }
}
