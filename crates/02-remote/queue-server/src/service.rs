//! Request dispatch over the server-owned registry of in-process queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use queue_core::wait::timeout_from_secs;
use queue_core::{InProcessQueue, QueueError, QueueRegistry, QueueResult, Registration};
use queue_wire::{Request, Response};

use crate::ServerConfig;

/// Owner of every remotely addressed queue.
///
/// `get` and `put` against an unseen name create the queue with the configured
/// default capacity, so a consumer that attaches before any producer still
/// waits out its timeout instead of failing.
pub struct QueueService {
    registry: QueueRegistry<InProcessQueue>,
    default_max_messages: usize,
    accepting: AtomicBool,
}

impl QueueService {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: QueueRegistry::new(),
            default_max_messages: config.default_max_messages,
            accepting: AtomicBool::new(true),
        }
    }

    /// Registers `name` unless it already exists. Re-registration is a no-op
    /// and never discards buffered messages.
    pub fn create(&self, name: &str, max_messages: usize) -> QueueResult<()> {
        let queue = self.lookup_or_create(name, max_messages)?;
        if queue.max_messages() != max_messages {
            tracing::warn!(
                queue = name,
                existing = queue.max_messages(),
                requested = max_messages,
                "create ignored for existing queue with different capacity"
            );
        }
        Ok(())
    }

    pub fn get(&self, name: &str, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        self.lookup_or_create(name, self.default_max_messages)?
            .get(timeout)
    }

    pub fn put(&self, name: &str, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        self.lookup_or_create(name, self.default_max_messages)?
            .put(message, timeout)
    }

    /// Process liveness; false once shutdown has begun.
    pub fn is_healthy(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Server-side queue registered under `name`, if any.
    pub fn queue(&self, name: &str) -> Option<Arc<InProcessQueue>> {
        self.registry.get(name)
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Stops accepting work and closes every queue, waking parked calls with
    /// [`QueueError::Closed`].
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        self.registry.for_each(|_, queue| queue.shutdown());
    }

    /// Executes one decoded request and encodes its outcome.
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::Create { name, max_messages } => {
                let result = usize::try_from(max_messages)
                    .map_err(|_| QueueError::InvalidConfig("capacity does not fit in usize"))
                    .and_then(|max_messages| self.create(&name, max_messages));
                respond(result, |()| Response::Ack)
            }
            Request::Get { name, timeout_secs } => respond(
                self.get(&name, timeout_from_secs(timeout_secs)),
                Response::Message,
            ),
            Request::Put {
                name,
                payload,
                timeout_secs,
            } => respond(
                self.put(&name, &payload, timeout_from_secs(timeout_secs)),
                |()| Response::Ack,
            ),
            Request::HealthCheck => Response::Health(self.is_healthy()),
        }
    }

    fn lookup_or_create(&self, name: &str, max_messages: usize) -> QueueResult<Arc<InProcessQueue>> {
        if !self.is_healthy() {
            return Err(QueueError::Closed);
        }
        if name.is_empty() {
            return Err(QueueError::InvalidConfig("queue name must not be empty"));
        }
        let (queue, registration) = self
            .registry
            .get_or_create_with(name, || InProcessQueue::new(max_messages))?;
        if registration == Registration::Created {
            tracing::debug!(queue = name, max_messages, "registered queue");
        }
        // A registration racing with shutdown may miss the close sweep.
        if !self.is_healthy() {
            queue.shutdown();
            return Err(QueueError::Closed);
        }
        Ok(queue)
    }
}

fn respond<T>(result: QueueResult<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(QueueError::TimedOut) => Response::TimedOut,
        Err(QueueError::Closed) => Response::Closed,
        Err(err) => Response::Error(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn service() -> QueueService {
        QueueService::new(&ServerConfig {
            default_max_messages: 4,
        })
    }

    #[test]
    fn create_is_idempotent_and_keeps_messages() {
        let service = service();
        service.create("/q", 2).expect("create");
        service.put("/q", b"buffered", None).expect("put");
        service.create("/q", 8).expect("re-create");

        let queue = service.queue("/q").expect("registered");
        assert_eq!(queue.max_messages(), 2);
        assert_eq!(service.get("/q", Some(Duration::ZERO)).expect("get"), b"buffered");
    }

    #[test]
    fn get_on_unseen_name_waits_then_times_out() {
        let service = service();
        let start = Instant::now();
        let err = service
            .get("/unseen", Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(95));
        assert_eq!(
            service.queue("/unseen").expect("lazily created").max_messages(),
            4
        );

        service.put("/unseen", b"later", None).expect("put");
        assert_eq!(service.get("/unseen", None).expect("get"), b"later");
    }

    #[test]
    fn put_on_unseen_name_creates_it() {
        let service = service();
        service.put("/fresh", b"first", Some(Duration::ZERO)).expect("put");
        assert_eq!(service.queue_names(), vec!["/fresh".to_owned()]);
    }

    #[test]
    fn handle_distinguishes_timeout_from_empty_message() {
        let service = service();
        let timed_out = service.handle(Request::Get {
            name: "/q".into(),
            timeout_secs: Some(0.0),
        });
        assert_eq!(timed_out, Response::TimedOut);

        service.handle(Request::Put {
            name: "/q".into(),
            payload: Vec::new(),
            timeout_secs: None,
        });
        let empty = service.handle(Request::Get {
            name: "/q".into(),
            timeout_secs: Some(0.0),
        });
        assert_eq!(empty, Response::Message(Vec::new()));
    }

    #[test]
    fn handle_reports_full_queue_as_timeout() {
        let service = service();
        assert_eq!(
            service.handle(Request::Create {
                name: "/one".into(),
                max_messages: 1
            }),
            Response::Ack
        );
        let put = |payload: &[u8]| {
            service.handle(Request::Put {
                name: "/one".into(),
                payload: payload.to_vec(),
                timeout_secs: Some(0.0),
            })
        };
        assert_eq!(put(b"a"), Response::Ack);
        assert_eq!(put(b"b"), Response::TimedOut);
    }

    #[test]
    fn invalid_requests_surface_as_errors() {
        let service = service();
        let response = service.handle(Request::Create {
            name: "/zero".into(),
            max_messages: 0,
        });
        assert!(matches!(response, Response::Error(_)));
        let response = service.handle(Request::Get {
            name: String::new(),
            timeout_secs: Some(0.0),
        });
        assert!(matches!(response, Response::Error(_)));
    }

    #[test]
    fn shutdown_wakes_pending_gets_and_flips_health() {
        let service = Arc::new(service());
        assert_eq!(service.handle(Request::HealthCheck), Response::Health(true));

        let pending = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.get("/parked", None))
        };
        thread::sleep(Duration::from_millis(50));
        service.shutdown();

        assert!(matches!(
            pending.join().expect("join"),
            Err(QueueError::Closed)
        ));
        assert_eq!(service.handle(Request::HealthCheck), Response::Health(false));
        assert_eq!(
            service.handle(Request::Put {
                name: "/parked".into(),
                payload: b"x".to_vec(),
                timeout_secs: None,
            }),
            Response::Closed
        );
    }
}
