//! Event publishing on top of the queue backends.
//!
//! * [`create_queue`] – opens a [`QueueBackend`] of the configured
//!   [`QueueType`] under the `/events-<name>` naming convention.
//! * [`EventQueue`] – size-limited, non-blocking publishing of serialized
//!   events.

mod backend;
mod event_queue;

pub use backend::{
    create_queue, event_queue_name, QueueBackend, QueueSettings, QueueType, EVENT_QUEUE_PREFIX,
};
pub use event_queue::{EventQueue, EventQueueError, MAX_EVENT_SIZE};
