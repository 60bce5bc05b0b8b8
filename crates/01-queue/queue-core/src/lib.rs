//! Bounded, blocking message queues with a uniform timeout contract.
//!
//! This crate holds the local half of the queue stack:
//! * [`MessageQueue`] – the capability every backend implements.
//! * [`InProcessQueue`] – condition-variable backed queue confined to one process.
//! * [`PosixMessageQueue`] – host-visible named queue (Linux only).
//! * [`QueueRegistry`] – name → backend map with exactly-once lazy creation.
//! * [`QueueError`] – the error taxonomy shared with the remote client.
//!
//! All blocking calls take `Option<Duration>`: `None` waits forever,
//! `Some(Duration::ZERO)` tries once, anything else bounds the wait and expires
//! into [`QueueError::TimedOut`].

use std::time::Duration;

mod error;
mod in_process;
#[cfg(target_os = "linux")]
mod posix;
mod registry;
pub mod wait;

pub use error::{QueueError, QueueResult};
pub use in_process::InProcessQueue;
#[cfg(target_os = "linux")]
pub use posix::PosixMessageQueue;
pub use registry::{QueueRegistry, Registration};

/// Bounded queue of opaque byte payloads.
pub trait MessageQueue: Send + Sync {
    /// Enqueues `message`, blocking up to `timeout` while the queue is full.
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()>;

    /// Dequeues the oldest message, blocking up to `timeout` while empty.
    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>>;

    /// Releases this handle. Later calls on it fail with [`QueueError::Closed`].
    fn close(&mut self) -> QueueResult<()>;
}

impl<Q: MessageQueue + ?Sized> MessageQueue for Box<Q> {
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        (**self).put(message, timeout)
    }

    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        (**self).get(timeout)
    }

    fn close(&mut self) -> QueueResult<()> {
        (**self).close()
    }
}
