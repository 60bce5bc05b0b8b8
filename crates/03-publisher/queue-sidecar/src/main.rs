//! Sidecar for event queues: hosts a queue server, or drains and publishes
//! through any of the queue backends.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use event_publisher::{create_queue, QueueBackend, QueueSettings, QueueType, MAX_EVENT_SIZE};
use queue_client::PoolConfig;
use queue_core::MessageQueue;
use queue_server::{start_queue_server, ServerConfig, DEFAULT_MAX_MESSAGES};
use tokio::{signal, task};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Queue server and event queue tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a queue server until Ctrl+C.
    Serve {
        /// Address to bind (ip or host)
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind; 0 picks an ephemeral port
        #[arg(long, default_value_t = 9090)]
        port: u16,

        /// Capacity of queues created implicitly by get/put
        #[arg(long, default_value_t = DEFAULT_MAX_MESSAGES)]
        default_max_messages: usize,
    },
    /// Print queued messages, one per line, until the queue goes idle.
    Drain {
        #[command(flatten)]
        queue: QueueArgs,

        /// How long to wait for each message
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
    /// Put one message onto a queue.
    Publish {
        #[command(flatten)]
        queue: QueueArgs,

        /// How long to wait for room in the queue
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        #[arg(long)]
        message: String,
    },
}

#[derive(Args, Debug)]
struct QueueArgs {
    #[arg(long, value_enum, default_value_t = BackendArg::Remote)]
    backend: BackendArg,

    /// Event stream name; the queue is `/events-<name>`
    #[arg(long)]
    name: String,

    #[arg(long, default_value_t = 10)]
    max_messages: usize,

    /// Largest message accepted (posix only)
    #[arg(long, default_value_t = MAX_EVENT_SIZE)]
    max_message_size: usize,

    /// Queue server host (remote only)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Queue server port (remote only)
    #[arg(long, default_value_t = 9090)]
    port: u16,

    #[arg(long, default_value_t = 10)]
    pool_size: usize,

    /// How long to wait for a free connection (remote only)
    #[arg(long, default_value_t = 1000)]
    pool_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    /// Host-visible OS message queue.
    Posix,
    /// Queue local to this process.
    InProcess,
    /// Queue hosted by a queue server.
    Remote,
}

impl From<BackendArg> for QueueType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Posix => QueueType::Posix,
            BackendArg::InProcess => QueueType::InProcess,
            BackendArg::Remote => QueueType::Remote,
        }
    }
}

impl QueueArgs {
    fn settings(&self) -> QueueSettings {
        let mut settings = QueueSettings::new(self.backend.into(), self.name.clone());
        settings.max_messages = self.max_messages;
        settings.max_message_size = self.max_message_size;
        settings.host = self.host.clone();
        settings.port = self.port;
        settings.pool = PoolConfig::default()
            .with_size(self.pool_size)
            .with_timeout(Some(Duration::from_millis(self.pool_timeout_ms)));
        settings
    }

    fn open(&self) -> Result<QueueBackend> {
        let settings = self.settings();
        create_queue(&settings)
            .with_context(|| format!("failed to open {} queue {}", settings.queue_type, settings.queue_name()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Serve {
            host,
            port,
            default_max_messages,
        } => serve(host, port, default_max_messages).await,
        Command::Drain {
            queue,
            timeout_ms,
            count,
        } => {
            let queue = queue.open()?;
            let timeout = Duration::from_millis(timeout_ms);
            let draining = task::spawn_blocking(move || drain(&queue, timeout, count));
            tokio::select! {
                result = draining => {
                    let drained = result.context("drain task panicked")??;
                    info!(drained, "drain finished");
                }
                _ = signal::ctrl_c() => {
                    warn!("received Ctrl+C, stopping drain");
                }
            }
            Ok(())
        }
        Command::Publish {
            queue,
            timeout_ms,
            message,
        } => {
            let queue = queue.open()?;
            let timeout = Duration::from_millis(timeout_ms);
            task::spawn_blocking(move || queue.put(message.as_bytes(), Some(timeout)))
                .await
                .context("publish task panicked")?
                .context("failed to publish message")?;
            info!("message published");
            Ok(())
        }
    }
}

async fn serve(host: String, port: u16, default_max_messages: usize) -> Result<()> {
    let config = ServerConfig {
        default_max_messages,
    };
    let server = start_queue_server((host.as_str(), port), config)
        .with_context(|| format!("failed to start queue server on {host}:{port}"))?;
    info!(endpoint = %server.endpoint(), "serving queues; press Ctrl+C to stop");

    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    warn!("received Ctrl+C, shutting down");
    task::spawn_blocking(move || server.stop())
        .await
        .context("server shutdown panicked")?;
    Ok(())
}

/// Prints messages until `count` is reached or a get times out.
fn drain(queue: &QueueBackend, timeout: Duration, count: Option<usize>) -> Result<usize> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut drained = 0;
    while count.map_or(true, |count| drained < count) {
        match queue.get(Some(timeout)) {
            Ok(payload) => {
                writeln!(out, "{}", String::from_utf8_lossy(&payload))
                    .context("failed to write message")?;
                drained += 1;
            }
            Err(err) if err.is_timed_out() => break,
            Err(err) => return Err(err).context("failed to read from queue"),
        }
    }
    out.flush().context("failed to flush stdout")?;
    Ok(drained)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Messages go to stdout; logs stay on stderr.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn drain_arguments_map_onto_queue_settings() {
        let cli = Cli::try_parse_from([
            "queue-sidecar",
            "drain",
            "--backend",
            "in-process",
            "--name",
            "v2",
            "--max-messages",
            "3",
            "--pool-size",
            "2",
            "--pool-timeout-ms",
            "250",
            "--count",
            "5",
        ])
        .expect("parse");
        let Command::Drain { queue, count, .. } = cli.command else {
            panic!("expected drain");
        };
        assert_eq!(count, Some(5));
        let settings = queue.settings();
        assert_eq!(settings.queue_type, QueueType::InProcess);
        assert_eq!(settings.queue_name(), "/events-v2");
        assert_eq!(settings.max_messages, 3);
        assert_eq!(settings.pool.size, 2);
        assert_eq!(settings.pool.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn drain_stops_at_count_or_idle_queue() {
        let queue = QueueBackend::InProcess(std::sync::Arc::new(
            queue_core::InProcessQueue::new(4).expect("queue"),
        ));
        for message in [&b"a"[..], &b"b"[..], &b"c"[..]] {
            queue.put(message, Some(Duration::ZERO)).expect("put");
        }
        assert_eq!(drain(&queue, Duration::from_millis(10), Some(2)).expect("drain"), 2);
        assert_eq!(drain(&queue, Duration::from_millis(10), None).expect("drain"), 1);
    }
}
