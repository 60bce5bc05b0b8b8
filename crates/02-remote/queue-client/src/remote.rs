//! [`MessageQueue`] backed by a queue server.
//!
//! Each operation checks a connection out of a [`ConnectionPool`], issues one
//! RPC and returns the slot. `get` is synchronous. `put` is handed to the
//! queue's dispatcher thread and returns a [`PutHandle`]; the outcome
//! (success, queue timeout or pool timeout) is only observable by joining it.
//!
//! Each handle owns exactly one dispatcher, so puts issued through it reach
//! the server in the order they were dispatched. A put blocked on a full
//! queue holds back the puts queued behind it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use queue_core::wait::timeout_to_secs;
use queue_core::{MessageQueue, QueueError, QueueResult};
use queue_wire::{Request, Response};

use crate::{ConnectionPool, PoolConfig};

/// Client handle bound to one queue name on one server.
pub struct RemoteMessageQueue {
    name: Arc<str>,
    max_messages: usize,
    pool: Arc<ConnectionPool>,
    puts: Sender<PutJob>,
}

/// A put waiting for the dispatcher, with the channel its outcome goes to.
struct PutJob {
    payload: Vec<u8>,
    timeout: Option<Duration>,
    done: Sender<QueueResult<()>>,
}

impl RemoteMessageQueue {
    /// Builds a pool for `endpoint` and asks the server to create `name`.
    ///
    /// Creation is idempotent server-side; an existing queue keeps its
    /// original capacity.
    pub fn connect(
        name: &str,
        max_messages: usize,
        endpoint: SocketAddr,
        pool: PoolConfig,
    ) -> QueueResult<Self> {
        let pool = Arc::new(ConnectionPool::new(endpoint, pool)?);
        Self::with_pool(name, max_messages, pool)
    }

    /// Like [`RemoteMessageQueue::connect`] but shares an existing pool, so
    /// several queue handles draw from the same connection budget.
    pub fn with_pool(name: &str, max_messages: usize, pool: Arc<ConnectionPool>) -> QueueResult<Self> {
        if name.is_empty() {
            return Err(QueueError::InvalidConfig("queue name must not be empty"));
        }
        if max_messages == 0 {
            return Err(QueueError::InvalidConfig("max_messages must be at least 1"));
        }
        let name: Arc<str> = Arc::from(name);
        let puts = spawn_dispatcher(Arc::clone(&name), Arc::clone(&pool))?;
        let queue = Self {
            name,
            max_messages,
            pool,
            puts,
        };
        queue.create()?;
        tracing::debug!(queue = %queue.name, endpoint = %queue.pool.endpoint(), "remote queue ready");
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity requested at creation.
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Queues `message` for the dispatcher thread.
    ///
    /// Returns immediately. Join the handle to learn whether the put landed;
    /// dropping it unjoined discards any error but not the put itself.
    pub fn put(&self, message: impl Into<Vec<u8>>, timeout: Option<Duration>) -> PutHandle {
        self.dispatch_put(message.into(), timeout)
    }

    /// Dequeues the oldest message, waiting up to `timeout` server-side.
    pub fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        let request = Request::Get {
            name: self.name.to_string(),
            timeout_secs: timeout_to_secs(timeout),
        };
        match call(&self.pool, &request, timeout)? {
            Response::Message(payload) => Ok(payload),
            other => Err(unexpected("get", other)),
        }
    }

    /// Asks the server whether it is serving requests.
    pub fn health_check(&self) -> QueueResult<bool> {
        match call(&self.pool, &Request::HealthCheck, Some(Duration::ZERO))? {
            Response::Health(healthy) => Ok(healthy),
            other => Err(unexpected("health_check", other)),
        }
    }

    fn create(&self) -> QueueResult<()> {
        let request = Request::Create {
            name: self.name.to_string(),
            max_messages: self.max_messages as u64,
        };
        match call(&self.pool, &request, Some(Duration::ZERO))? {
            Response::Ack => Ok(()),
            other => Err(unexpected("create", other)),
        }
    }

    fn dispatch_put(&self, payload: Vec<u8>, timeout: Option<Duration>) -> PutHandle {
        let (done, outcome) = crossbeam_channel::bounded(1);
        let job = PutJob {
            payload,
            timeout,
            done,
        };
        match self.puts.send(job) {
            Ok(()) => PutHandle::pending(outcome),
            Err(_) => PutHandle::ready(Err(QueueError::protocol("put dispatcher exited"))),
        }
    }
}

/// Starts the thread that sends `name`'s puts one at a time, in the order
/// they were queued. It exits once every sender is dropped and the backlog
/// is drained.
fn spawn_dispatcher(name: Arc<str>, pool: Arc<ConnectionPool>) -> QueueResult<Sender<PutJob>> {
    let (puts, jobs) = crossbeam_channel::unbounded::<PutJob>();
    thread::Builder::new()
        .name("queue-client-put".into())
        .spawn(move || {
            for job in jobs {
                let result = send_put(&pool, &name, job.payload, job.timeout);
                if let Err(err) = &result {
                    tracing::debug!(queue = %name, %err, "remote put failed");
                }
                // The handle may have been dropped unjoined.
                let _ = job.done.send(result);
            }
            tracing::trace!(queue = %name, "put dispatcher exiting");
        })?;
    Ok(puts)
}

fn send_put(
    pool: &ConnectionPool,
    name: &str,
    payload: Vec<u8>,
    timeout: Option<Duration>,
) -> QueueResult<()> {
    let request = Request::Put {
        name: name.to_string(),
        payload,
        timeout_secs: timeout_to_secs(timeout),
    };
    match call(pool, &request, timeout)? {
        Response::Ack => Ok(()),
        other => Err(unexpected("put", other)),
    }
}

impl MessageQueue for RemoteMessageQueue {
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        self.dispatch_put(message.to_vec(), timeout).join()
    }

    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        RemoteMessageQueue::get(self, timeout)
    }

    /// Closes the pool. Other handles sharing it are closed too.
    fn close(&mut self) -> QueueResult<()> {
        self.pool.close();
        Ok(())
    }
}

/// Pending outcome of a [`RemoteMessageQueue::put`].
#[must_use = "a remote put's outcome is only observable by joining its handle"]
pub struct PutHandle {
    state: PutState,
}

enum PutState {
    Pending(Receiver<QueueResult<()>>),
    Ready(QueueResult<()>),
}

impl PutHandle {
    fn pending(outcome: Receiver<QueueResult<()>>) -> Self {
        Self {
            state: PutState::Pending(outcome),
        }
    }

    fn ready(result: QueueResult<()>) -> Self {
        Self {
            state: PutState::Ready(result),
        }
    }

    /// True once the put has an outcome; `join` will not block.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            PutState::Pending(outcome) => !outcome.is_empty(),
            PutState::Ready(_) => true,
        }
    }

    /// Waits for the put to complete and returns its outcome.
    pub fn join(self) -> QueueResult<()> {
        match self.state {
            PutState::Ready(result) => result,
            PutState::Pending(outcome) => outcome
                .recv()
                .unwrap_or_else(|_| Err(QueueError::protocol("put dispatcher exited"))),
        }
    }
}

/// Joins every handle, returning outcomes in the order given.
pub fn join_all(handles: impl IntoIterator<Item = PutHandle>) -> Vec<QueueResult<()>> {
    handles.into_iter().map(PutHandle::join).collect()
}

fn call(pool: &ConnectionPool, request: &Request, op_timeout: Option<Duration>) -> QueueResult<Response> {
    let mut conn = pool.acquire()?;
    conn.call(request, op_timeout)
}

/// Maps a response that is not the success shape for `op` onto an error.
fn unexpected(op: &str, response: Response) -> QueueError {
    match response {
        Response::TimedOut => QueueError::TimedOut,
        Response::Closed => QueueError::Closed,
        Response::Error(msg) => QueueError::Server(msg),
        Response::Ack => QueueError::protocol(format!("unexpected ack to {op}")),
        Response::Message(_) => QueueError::protocol(format!("unexpected message in reply to {op}")),
        Response::Health(_) => QueueError::protocol(format!("unexpected health reply to {op}")),
    }
}
