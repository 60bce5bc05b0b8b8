//! Backend selection: one configuration value picks one of the three queue
//! implementations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use queue_client::{resolve_endpoint, PoolConfig, RemoteMessageQueue};
#[cfg(target_os = "linux")]
use queue_core::PosixMessageQueue;
use queue_core::{InProcessQueue, MessageQueue, QueueResult};

use crate::MAX_EVENT_SIZE;

/// Prefix shared by every event queue name.
pub const EVENT_QUEUE_PREFIX: &str = "/events-";

/// Conventional queue name for the event stream `name`.
pub fn event_queue_name(name: &str) -> String {
    format!("{EVENT_QUEUE_PREFIX}{name}")
}

/// Which backend [`create_queue`] builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueType {
    /// Host-visible OS message queue.
    Posix,
    /// Queue confined to the current process.
    InProcess,
    /// Queue owned by a queue server, reached through a connection pool.
    Remote,
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueType::Posix => "posix",
            QueueType::InProcess => "in-process",
            QueueType::Remote => "remote",
        })
    }
}

/// Everything needed to open an event queue of any type.
///
/// `max_message_size` only applies to [`QueueType::Posix`]; `host`, `port`
/// and `pool` only to [`QueueType::Remote`].
#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub queue_type: QueueType,
    /// Stream name; the queue itself is named by [`event_queue_name`].
    pub name: String,
    pub max_messages: usize,
    pub max_message_size: usize,
    pub host: String,
    pub port: u16,
    pub pool: PoolConfig,
}

impl QueueSettings {
    pub fn new(queue_type: QueueType, name: impl Into<String>) -> Self {
        Self {
            queue_type,
            name: name.into(),
            max_messages: 10,
            max_message_size: MAX_EVENT_SIZE,
            host: "127.0.0.1".into(),
            port: 9090,
            pool: PoolConfig::default(),
        }
    }

    pub fn queue_name(&self) -> String {
        event_queue_name(&self.name)
    }
}

/// Opens the queue described by `settings`.
pub fn create_queue(settings: &QueueSettings) -> QueueResult<QueueBackend> {
    let queue_name = settings.queue_name();
    let backend = match settings.queue_type {
        #[cfg(target_os = "linux")]
        QueueType::Posix => QueueBackend::Posix(PosixMessageQueue::open(
            &queue_name,
            settings.max_messages,
            settings.max_message_size,
        )?),
        #[cfg(not(target_os = "linux"))]
        QueueType::Posix => {
            return Err(queue_core::QueueError::InvalidConfig(
                "posix message queues are only available on linux",
            ))
        }
        QueueType::InProcess => {
            QueueBackend::InProcess(Arc::new(InProcessQueue::new(settings.max_messages)?))
        }
        QueueType::Remote => {
            let endpoint = resolve_endpoint(&settings.host, settings.port)?;
            QueueBackend::Remote(RemoteMessageQueue::connect(
                &queue_name,
                settings.max_messages,
                endpoint,
                settings.pool,
            )?)
        }
    };
    tracing::info!(
        queue = %queue_name,
        queue_type = %settings.queue_type,
        max_messages = settings.max_messages,
        "event queue opened"
    );
    Ok(backend)
}

/// A queue of one of the three supported types.
pub enum QueueBackend {
    #[cfg(target_os = "linux")]
    Posix(PosixMessageQueue),
    /// Shared so producers and consumers in the same process can hold it.
    InProcess(Arc<InProcessQueue>),
    Remote(RemoteMessageQueue),
}

impl QueueBackend {
    pub fn queue_type(&self) -> QueueType {
        match self {
            #[cfg(target_os = "linux")]
            QueueBackend::Posix(_) => QueueType::Posix,
            QueueBackend::InProcess(_) => QueueType::InProcess,
            QueueBackend::Remote(_) => QueueType::Remote,
        }
    }
}

impl MessageQueue for QueueBackend {
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            QueueBackend::Posix(queue) => queue.put(message, timeout),
            QueueBackend::InProcess(queue) => queue.put(message, timeout),
            QueueBackend::Remote(queue) => MessageQueue::put(queue, message, timeout),
        }
    }

    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        match self {
            #[cfg(target_os = "linux")]
            QueueBackend::Posix(queue) => queue.get(timeout),
            QueueBackend::InProcess(queue) => queue.get(timeout),
            QueueBackend::Remote(queue) => queue.get(timeout),
        }
    }

    fn close(&mut self) -> QueueResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            QueueBackend::Posix(queue) => queue.close(),
            QueueBackend::InProcess(queue) => {
                queue.shutdown();
                Ok(())
            }
            QueueBackend::Remote(queue) => queue.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::QueueError;

    #[test]
    fn event_queue_names_are_prefixed() {
        assert_eq!(event_queue_name("v2"), "/events-v2");
        let settings = QueueSettings::new(QueueType::InProcess, "test");
        assert_eq!(settings.queue_name(), "/events-test");
    }

    #[test]
    fn in_process_backend_round_trips() {
        let mut settings = QueueSettings::new(QueueType::InProcess, "roundtrip");
        settings.max_messages = 1;
        let mut queue = create_queue(&settings).expect("create");
        assert_eq!(queue.queue_type(), QueueType::InProcess);

        queue.put(b"x", Some(Duration::ZERO)).expect("put");
        assert!(queue.put(b"y", Some(Duration::ZERO)).expect_err("full").is_timed_out());
        assert_eq!(queue.get(Some(Duration::ZERO)).expect("get"), b"x");

        queue.close().expect("close");
        assert!(matches!(queue.get(Some(Duration::ZERO)), Err(QueueError::Closed)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut settings = QueueSettings::new(QueueType::InProcess, "empty");
        settings.max_messages = 0;
        assert!(matches!(
            create_queue(&settings),
            Err(QueueError::InvalidConfig(_))
        ));
    }
}
