//! One blocking request/response connection to a queue server.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use queue_core::QueueResult;
use queue_wire::{read_response, write_request, Request, Response};

/// Floor for socket read timeouts; the OS rejects a zero timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

pub(crate) struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub(crate) fn open(endpoint: SocketAddr, connect_timeout: Duration) -> QueueResult<Self> {
        let stream = TcpStream::connect_timeout(&endpoint, connect_timeout)?;
        stream.set_nodelay(true)?;
        tracing::debug!(%endpoint, "opened queue server connection");
        Ok(Self { stream })
    }

    /// Sends `request` and waits for its response, giving up after
    /// `read_timeout` (`None` waits forever).
    ///
    /// Any error leaves the stream in an unknown position; callers must
    /// discard the connection.
    pub(crate) fn call(
        &mut self,
        request: &Request,
        read_timeout: Option<Duration>,
    ) -> QueueResult<Response> {
        self.stream
            .set_read_timeout(read_timeout.map(|timeout| timeout.max(MIN_READ_TIMEOUT)))?;
        write_request(&mut self.stream, request)?;
        Ok(read_response(&mut self.stream)?)
    }
}
