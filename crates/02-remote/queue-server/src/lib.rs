//! Queue server: the process that owns remotely addressed queue storage.
//!
//! * [`QueueService`] – registry of in-process queues plus request dispatch.
//! * [`start_queue_server`] / [`ServerHandle`] – TCP front end whose lifetime
//!   is tied to the handle.

mod config;
mod server;
mod service;

pub use config::{ServerConfig, DEFAULT_MAX_MESSAGES};
pub use server::{start_queue_server, ServerHandle};
pub use service::QueueService;
