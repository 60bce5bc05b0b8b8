//! Request/response schema exchanged between queue clients and the server.
//!
//! `rkyv` expands `Archive` derives into generated archived mirrors; docs live
//! on the source types only. Any backward-incompatible change must bump
//! [`PROTOCOL_VERSION`].
#![allow(missing_docs)]

use rkyv::{Archive, Deserialize, Serialize};

/// Version carried in every frame header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Call issued by a client. Timeouts travel as fractional seconds; `None`
/// waits indefinitely and `Some(0.0)` attempts once.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Request {
    /// Register `name` with the given capacity if it is not registered yet.
    Create { name: String, max_messages: u64 },
    /// Dequeue from `name`, creating it on first reference.
    Get {
        name: String,
        timeout_secs: Option<f64>,
    },
    /// Enqueue onto `name`, creating it on first reference.
    Put {
        name: String,
        payload: Vec<u8>,
        timeout_secs: Option<f64>,
    },
    /// Liveness probe, independent of any queue.
    HealthCheck,
}

/// Server answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Response {
    Ack,
    /// Dequeued payload. Empty payloads are legitimate messages.
    Message(Vec<u8>),
    /// The bounded wait expired; distinct from an empty [`Response::Message`].
    TimedOut,
    /// The server-side queue was closed while the call was pending.
    Closed,
    Health(bool),
    /// Any other server-side failure.
    Error(String),
}

impl Request {
    /// Short operation label used in logs.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Get { .. } => "get",
            Request::Put { .. } => "put",
            Request::HealthCheck => "health_check",
        }
    }
}
