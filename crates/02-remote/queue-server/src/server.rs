//! TCP front end for [`QueueService`] and its lifecycle handle.
//!
//! One accept thread hands each connection to a dedicated worker thread that
//! answers requests in order. [`ServerHandle`] owns all of them: dropping it
//! (or calling [`ServerHandle::stop`]) stops the accept loop, closes every
//! queue so parked calls return, shuts the live sockets down, and joins every
//! thread. Because this runs from `Drop`, it also happens on error paths and
//! while unwinding.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use queue_core::QueueResult;
use queue_wire::{read_request, write_response};

use crate::{QueueService, ServerConfig};

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Starts a queue server bound to `addr`.
///
/// Port `0` selects an ephemeral port; the bound address is available from
/// [`ServerHandle::endpoint`]. The server runs on background threads until the
/// returned handle is stopped or dropped.
pub fn start_queue_server(addr: impl ToSocketAddrs, config: ServerConfig) -> QueueResult<ServerHandle> {
    let listener = TcpListener::bind(addr)?;
    let endpoint = listener.local_addr()?;
    let shared = Arc::new(Shared {
        service: Arc::new(QueueService::new(&config)),
        stopping: AtomicBool::new(false),
        next_id: AtomicU64::new(0),
        connections: Mutex::new(Connections::default()),
    });

    let accept = {
        let shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("queue-server-accept".into())
            .spawn(move || accept_loop(listener, shared))?
    };

    tracing::info!(%endpoint, "queue server listening");
    Ok(ServerHandle {
        endpoint,
        shared,
        accept: Some(accept),
    })
}

/// Running queue server. Stops on drop.
pub struct ServerHandle {
    endpoint: SocketAddr,
    shared: Arc<Shared>,
    accept: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Concretely bound address, including the port picked for port `0`.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Queue state owned by this server.
    pub fn service(&self) -> &Arc<QueueService> {
        &self.shared.service
    }

    /// Number of client connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.lock().streams.len()
    }

    /// Stops the server and waits for every thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(accept) = self.accept.take() else {
            return;
        };
        self.shared.stopping.store(true, Ordering::Release);

        // The accept thread is parked in accept(); a throwaway connection
        // lets it observe the stop flag.
        let woke = TcpStream::connect_timeout(&wake_addr(self.endpoint), WAKE_TIMEOUT).is_ok();
        if woke {
            if accept.join().is_err() {
                tracing::warn!("queue server accept thread panicked");
            }
        } else {
            tracing::warn!(endpoint = %self.endpoint, "could not wake accept loop; detaching it");
        }

        self.shared.service.shutdown();

        let workers = {
            let mut connections = self.shared.connections.lock();
            for stream in connections.streams.values() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            std::mem::take(&mut connections.workers)
        };
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("queue server connection thread panicked");
            }
        }
        tracing::info!(endpoint = %self.endpoint, "queue server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Shared {
    service: Arc<QueueService>,
    stopping: AtomicBool,
    next_id: AtomicU64,
    connections: Mutex<Connections>,
}

#[derive(Default)]
struct Connections {
    /// Clones of live sockets, used to interrupt blocked reads on stop.
    streams: HashMap<u64, TcpStream>,
    workers: Vec<JoinHandle<()>>,
}

impl Shared {
    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let control = match stream.try_clone() {
            Ok(control) => control,
            Err(err) => {
                tracing::warn!(%peer, %err, "dropping connection: cannot clone socket");
                return;
            }
        };

        let mut connections = self.connections.lock();
        // Checked under the lock so a concurrent stop never misses this socket.
        if self.stopping() {
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        connections.workers.retain(|worker| !worker.is_finished());

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("queue-server-conn-{id}"))
            .spawn(move || {
                serve_connection(&stream, peer, &shared.service);
                shared.connections.lock().streams.remove(&id);
            });
        match spawned {
            Ok(worker) => {
                connections.streams.insert(id, control);
                connections.workers.push(worker);
            }
            Err(err) => {
                tracing::error!(%peer, %err, "failed to spawn connection thread");
                let _ = control.shutdown(Shutdown::Both);
            }
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let accepted = listener.accept();
        if shared.stopping() {
            break;
        }
        match accepted {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                shared.spawn_connection(stream, peer);
            }
            Err(err) => {
                tracing::warn!(%err, "accept failed");
                // Back off briefly on resource exhaustion (EMFILE and friends).
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

fn serve_connection(stream: &TcpStream, peer: SocketAddr, service: &QueueService) {
    let _ = stream.set_nodelay(true);
    let mut reader = BufReader::new(stream);
    let mut writer = stream;
    loop {
        let request = match read_request(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(%peer, %err, "closing connection after read failure");
                break;
            }
        };
        let op = request.op();
        let response = service.handle(request);
        tracing::trace!(%peer, op, ?response, "handled request");
        if let Err(err) = write_response(&mut writer, &response) {
            tracing::debug!(%peer, %err, "closing connection after write failure");
            break;
        }
    }
    tracing::debug!(%peer, "connection closed");
}

fn wake_addr(endpoint: SocketAddr) -> SocketAddr {
    let ip = match endpoint.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, endpoint.port())
}
