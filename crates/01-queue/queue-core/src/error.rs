//! Error taxonomy shared by every queue backend.
//!
//! Local backends raise these directly. The remote client translates server
//! responses into the same variants so callers cannot tell backends apart by
//! error type, except for [`QueueError::PoolTimeout`] which only a pooled
//! client can produce.

use thiserror::Error;

/// Convenience result alias for queue operations.
pub type QueueResult<T, E = QueueError> = Result<T, E>;

/// Errors surfaced by queue backends, registries and clients.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A `put` or `get` did not complete within the requested bound.
    #[error("timed out waiting on queue")]
    TimedOut,

    /// No pooled connection slot became available within the pool timeout.
    #[error("timed out waiting for a connection slot")]
    PoolTimeout,

    /// Payload exceeds the backend's maximum message size.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    /// OS-level creation, permission or naming failure.
    #[error("queue resource error for {name}: {reason}")]
    Resource { name: String, reason: String },

    /// The handle, queue or pool has been closed.
    #[error("queue is closed")]
    Closed,

    #[error("invalid queue configuration: {0}")]
    InvalidConfig(&'static str),

    /// Socket failure on the remote path.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure reported by the queue server other than a timeout or close.
    #[error("server error: {0}")]
    Server(String),
}

impl QueueError {
    pub fn resource(name: impl Into<String>, reason: impl ToString) -> Self {
        QueueError::Resource {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        QueueError::Protocol(msg.into())
    }

    /// True for queue-level backpressure ([`QueueError::TimedOut`]) only.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, QueueError::TimedOut)
    }

    /// True for pool starvation ([`QueueError::PoolTimeout`]) only.
    pub fn is_pool_timeout(&self) -> bool {
        matches!(self, QueueError::PoolTimeout)
    }
}
