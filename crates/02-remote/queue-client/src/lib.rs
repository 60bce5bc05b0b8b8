//! Pooled client for a remote queue server.
//!
//! * [`ConnectionPool`] – fixed number of reusable connections with a bounded
//!   acquire wait; exhaustion raises [`queue_core::QueueError::PoolTimeout`].
//! * [`RemoteMessageQueue`] – [`queue_core::MessageQueue`] over the pool, with
//!   asynchronous puts ([`PutHandle`]) and synchronous gets.

mod config;
mod connection;
mod pool;
mod remote;

pub use config::{resolve_endpoint, PoolConfig};
pub use pool::{ConnectionPool, PooledConnection};
pub use remote::{join_all, PutHandle, RemoteMessageQueue};
