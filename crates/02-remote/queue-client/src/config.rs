use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use queue_core::{QueueError, QueueResult};

/// Shape and timing of a [`crate::ConnectionPool`].
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once.
    pub size: usize,
    /// How long `acquire` waits for a free slot; `None` waits forever and
    /// `Some(Duration::ZERO)` tries once.
    pub timeout: Option<Duration>,
    /// Bound on establishing a new TCP connection.
    pub connect_timeout: Duration,
    /// Extra socket read time allowed beyond the queue operation's own
    /// timeout before the connection is declared broken.
    pub rpc_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 10,
            timeout: Some(Duration::from_secs(1)),
            connect_timeout: Duration::from_secs(1),
            rpc_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resolves `host:port` to the first socket address it names.
pub fn resolve_endpoint(host: &str, port: u16) -> QueueResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| QueueError::resource(format!("{host}:{port}"), "address did not resolve"))
}
