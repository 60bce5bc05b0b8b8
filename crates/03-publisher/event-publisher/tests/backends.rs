//! Every backend behaves the same through `create_queue`.

use std::time::{Duration, Instant};

use event_publisher::{
    create_queue, EventQueue, EventQueueError, QueueBackend, QueueSettings, QueueType,
};
use queue_core::MessageQueue;
use queue_server::{start_queue_server, ServerConfig, ServerHandle};

const SHORT: Option<Duration> = Some(Duration::from_millis(100));

fn assert_fifo_and_timeouts(queue: &QueueBackend) {
    queue.put(b"first", SHORT).expect("put");
    queue.put(b"second", SHORT).expect("put");
    assert_eq!(queue.get(SHORT).expect("get"), b"first");
    assert_eq!(queue.get(SHORT).expect("get"), b"second");

    let start = Instant::now();
    let err = queue.get(SHORT).expect_err("empty");
    assert!(err.is_timed_out(), "{err}");
    assert!(start.elapsed() >= Duration::from_millis(90));
    assert!(queue.get(Some(Duration::ZERO)).expect_err("empty").is_timed_out());
}

fn fill_then_overflow(queue: &QueueBackend, capacity: usize) {
    for i in 0..capacity {
        queue.put(format!("m{i}").as_bytes(), Some(Duration::ZERO)).expect("fits");
    }
    let start = Instant::now();
    let err = queue.put(b"overflow", SHORT).expect_err("full");
    assert!(err.is_timed_out(), "{err}");
    assert!(start.elapsed() >= Duration::from_millis(90));
}

fn remote_settings(server: &ServerHandle, name: &str) -> QueueSettings {
    let mut settings = QueueSettings::new(QueueType::Remote, name);
    settings.host = server.endpoint().ip().to_string();
    settings.port = server.endpoint().port();
    settings
}

#[test]
fn in_process_backend() {
    let mut settings = QueueSettings::new(QueueType::InProcess, "in-process");
    settings.max_messages = 2;
    let queue = create_queue(&settings).expect("create");
    assert_fifo_and_timeouts(&queue);
    fill_then_overflow(&queue, 2);
}

#[test]
fn remote_backend() {
    let server = start_queue_server(("127.0.0.1", 0), ServerConfig::default()).expect("server");
    let mut settings = remote_settings(&server, "remote");
    settings.max_messages = 2;
    let queue = create_queue(&settings).expect("create");
    assert_eq!(queue.queue_type(), QueueType::Remote);
    assert_fifo_and_timeouts(&queue);
    fill_then_overflow(&queue, 2);

    assert!(server.service().queue("/events-remote").is_some());
}

#[cfg(target_os = "linux")]
#[test]
fn posix_backend() {
    use queue_core::PosixMessageQueue;

    let name = format!("publisher-test-{}", std::process::id());
    let mut settings = QueueSettings::new(QueueType::Posix, name);
    settings.max_messages = 2;
    settings.max_message_size = 1024;
    let _ = PosixMessageQueue::unlink(&settings.queue_name());

    let queue = create_queue(&settings).expect("create");
    assert_fifo_and_timeouts(&queue);
    fill_then_overflow(&queue, 2);
    drop(queue);
    PosixMessageQueue::unlink(&settings.queue_name()).expect("unlink");
}

#[test]
fn event_queue_over_remote_backend_reports_full() {
    let server = start_queue_server(("127.0.0.1", 0), ServerConfig::default()).expect("server");
    let mut settings = remote_settings(&server, "events-full");
    settings.max_messages = 1;
    let backend = create_queue(&settings).expect("create");
    let events: EventQueue<&'static str> =
        EventQueue::new(backend, |event: &&str| event.as_bytes().to_vec());

    events.put(&"one").expect("first event");
    assert!(matches!(events.put(&"two"), Err(EventQueueError::QueueFull)));

    let queue = server.service().queue("/events-events-full").expect("server queue");
    assert_eq!(queue.len(), 1);
}
