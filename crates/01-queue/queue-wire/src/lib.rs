//! Wire protocol spoken between remote queue clients and the queue server.
//!
//! * [`Request`] / [`Response`] – the RPC surface (`Create`, `Get`, `Put`,
//!   `HealthCheck`), archived with rkyv.
//! * [`read_request`] / [`write_response`] and friends – blocking,
//!   length-prefixed framing over any `Read`/`Write` stream.

mod frame;
pub mod schema;

use queue_core::QueueError;
use thiserror::Error;

pub use frame::{
    read_request, read_response, write_request, write_response, MAX_FRAME_BYTES,
};
pub use schema::{Request, Response, PROTOCOL_VERSION};

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("frame of {len} bytes exceeds the 64 MiB frame limit")]
    FrameTooLarge { len: usize },

    #[error("unsupported protocol version {found}")]
    Version { found: u8 },
}

impl WireError {
    pub fn codec(msg: impl Into<String>) -> Self {
        WireError::Codec(msg.into())
    }
}

impl From<WireError> for QueueError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(err) => QueueError::Transport(err),
            other => QueueError::Protocol(other.to_string()),
        }
    }
}
