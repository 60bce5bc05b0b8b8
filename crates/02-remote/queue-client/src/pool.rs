//! Bounded pool of reusable connections to one queue server.
//!
//! The pool holds exactly `size` slot tokens in a bounded channel, mirroring a
//! free ring of slot indices: acquiring pops a token, releasing pushes it back.
//! A token carries the slot's connection once one has been established, so
//! connections are opened lazily and reused afterwards. Because only `size`
//! tokens exist, no more than `size` callers can hold a slot at once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use queue_core::{QueueError, QueueResult};
use queue_wire::{Request, Response};

use crate::connection::Connection;
use crate::PoolConfig;

/// Slot token: `None` until the slot has a live connection.
type Slot = Option<Connection>;

/// Fixed-size connection pool for one server address.
pub struct ConnectionPool {
    endpoint: SocketAddr,
    config: PoolConfig,
    free_tx: Sender<Slot>,
    free_rx: Receiver<Slot>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Creates a pool of `config.size` slots. No connection is opened until a
    /// slot is first used.
    pub fn new(endpoint: SocketAddr, config: PoolConfig) -> QueueResult<Self> {
        if config.size == 0 {
            return Err(QueueError::InvalidConfig(
                "connection pool needs at least one slot",
            ));
        }
        let (free_tx, free_rx) = bounded(config.size);
        for _ in 0..config.size {
            free_tx
                .try_send(None)
                .map_err(|_| QueueError::InvalidConfig("connection pool channel too small"))?;
        }
        Ok(Self {
            endpoint,
            config,
            free_tx,
            free_rx,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Slots not currently checked out.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Checks out a slot, waiting up to the configured pool timeout.
    pub fn acquire(&self) -> QueueResult<PooledConnection<'_>> {
        self.acquire_timeout(self.config.timeout)
    }

    /// Checks out a slot, waiting up to `timeout`.
    ///
    /// Exhaustion fails with [`QueueError::PoolTimeout`], which is distinct
    /// from a queue-level [`QueueError::TimedOut`].
    pub fn acquire_timeout(&self, timeout: Option<Duration>) -> QueueResult<PooledConnection<'_>> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let slot = match timeout {
            None => self.free_rx.recv().map_err(|_| QueueError::Closed)?,
            Some(timeout) => match self.free_rx.recv_timeout(timeout) {
                Ok(slot) => slot,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        pool_size = self.config.size,
                        ?timeout,
                        "timed out waiting for a connection slot"
                    );
                    return Err(QueueError::PoolTimeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(QueueError::Closed),
            },
        };

        let guard = PooledConnection {
            pool: self,
            conn: slot,
        };
        if self.is_closed() {
            // Dropping the guard returns the token.
            return Err(QueueError::Closed);
        }
        Ok(guard)
    }

    /// Drops idle connections and fails every later `acquire` with
    /// [`QueueError::Closed`]. Checked-out connections are dropped when their
    /// guards are released.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut idle = 0;
        while let Ok(slot) = self.free_rx.try_recv() {
            drop(slot);
            idle += 1;
        }
        for _ in 0..idle {
            self.return_slot(None);
        }
        tracing::debug!(endpoint = %self.endpoint, idle, "connection pool closed");
    }

    fn return_slot(&self, slot: Slot) {
        match self.free_tx.try_send(slot) {
            Ok(()) => {}
            // Unreachable while the token count is conserved.
            Err(TrySendError::Full(_)) => {
                tracing::error!(endpoint = %self.endpoint, "connection pool overfilled on release")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Socket read bound for an operation that may itself wait `op_timeout`.
    fn read_timeout(&self, op_timeout: Option<Duration>) -> Option<Duration> {
        op_timeout.map(|timeout| timeout.saturating_add(self.config.rpc_grace))
    }
}

/// A checked-out pool slot.
///
/// Dropping the guard returns the slot unconditionally, whether the call
/// succeeded, failed, or the caller unwound. A connection whose call failed is
/// discarded rather than returned, and the slot reconnects on next use.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Slot,
}

impl PooledConnection<'_> {
    /// Issues one RPC over this slot's connection, opening it if needed.
    ///
    /// `op_timeout` is the queue operation's own timeout; the socket waits
    /// that long plus the pool's RPC grace period for the answer.
    pub fn call(&mut self, request: &Request, op_timeout: Option<Duration>) -> QueueResult<Response> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => Connection::open(self.pool.endpoint, self.pool.config.connect_timeout)?,
        };
        let conn = self.conn.insert(conn);
        match conn.call(request, self.pool.read_timeout(op_timeout)) {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::debug!(endpoint = %self.pool.endpoint, %err, "discarding broken connection");
                self.conn = None;
                Err(err)
            }
        }
    }

    /// Returns the slot to the pool; equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let conn = if self.pool.is_closed() {
            None
        } else {
            self.conn.take()
        };
        self.pool.return_slot(conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn pool(size: usize, timeout: Option<Duration>) -> ConnectionPool {
        // Nothing listens here; slots are never used for I/O in these tests.
        let endpoint: SocketAddr = "127.0.0.1:9".parse().expect("addr");
        ConnectionPool::new(endpoint, PoolConfig::default().with_size(size).with_timeout(timeout))
            .expect("pool")
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        let endpoint: SocketAddr = "127.0.0.1:9".parse().expect("addr");
        assert!(matches!(
            ConnectionPool::new(endpoint, PoolConfig::default().with_size(0)),
            Err(QueueError::InvalidConfig(_))
        ));
    }

    #[test]
    fn checkouts_never_exceed_size() {
        let pool = pool(2, Some(Duration::from_millis(50)));
        let first = pool.acquire().expect("first");
        let second = pool.acquire().expect("second");
        assert_eq!(pool.available(), 0);

        let start = Instant::now();
        let err = pool.acquire().err().expect("exhausted");
        assert!(err.is_pool_timeout());
        assert!(!err.is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(45));

        drop(first);
        let third = pool.acquire().expect("slot returned");
        drop((second, third));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn zero_timeout_fails_fast_when_exhausted() {
        let pool = pool(1, Some(Duration::ZERO));
        let _held = pool.acquire().expect("slot");
        let start = Instant::now();
        assert!(pool.acquire().err().expect("exhausted").is_pool_timeout());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn failed_call_still_returns_the_slot() {
        // Bind then drop so the port is very likely refusing connections.
        let endpoint = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr")
        };
        let pool = ConnectionPool::new(endpoint, PoolConfig::default().with_size(1)).expect("pool");
        {
            let mut slot = pool.acquire().expect("slot");
            assert!(slot.call(&Request::HealthCheck, Some(Duration::ZERO)).is_err());
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn close_rejects_new_checkouts() {
        let pool = pool(2, Some(Duration::from_millis(10)));
        let held = pool.acquire().expect("slot");
        pool.close();
        assert!(matches!(pool.acquire().err(), Some(QueueError::Closed)));
        held.release();
        assert_eq!(pool.available(), 2);
    }
}
