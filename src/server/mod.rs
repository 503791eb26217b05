//! Local SOCKS5 proxy server
//!
//! Owns the listener and the table of live connections. Each run spawns an
//! accept loop, an event task that evicts finished connections and an idle
//! monitor; all three stop with the run's cancellation token.

mod table;

pub use table::{ConnectionTable, ServerState};

use crate::config::ServerProfile;
use crate::connection::{ConnectionContext, ConnectionEvent, ConnectionState, ProxyConnection};
use crate::context::AppContext;
use crate::crypto::CipherEngine;
use crate::error::{ProxyError, Result};
use crate::stats::{ReporterHandle, TrafficStats};
use crate::transport::SocketOpts;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// State shared between the server handle and its background tasks
#[derive(Debug, Default)]
struct Shared {
    table: Mutex<ConnectionTable>,
    next_id: AtomicU64,
}

impl Shared {
    fn table(&self) -> std::sync::MutexGuard<'_, ConnectionTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ServerState) {
        self.table().state = state;
    }
}

/// Handles of one start..stop cycle
#[derive(Debug)]
struct RunHandle {
    token: CancellationToken,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
    _reporter: ReporterHandle,
}

/// SOCKS5 listener with per-connection routing
#[derive(Debug)]
pub struct ProxyServer {
    app: Arc<AppContext>,
    conn_ctx: Mutex<Arc<ConnectionContext>>,
    shared: Arc<Shared>,
    run: Mutex<Option<RunHandle>>,
}

impl ProxyServer {
    /// Validate `profile` and prepare a stopped server
    pub fn new(app: Arc<AppContext>, profile: ServerProfile) -> Result<Self> {
        let conn_ctx = Arc::new(app.connection_context(profile)?);
        Ok(ProxyServer {
            app,
            conn_ctx: Mutex::new(conn_ctx),
            shared: Arc::new(Shared::default()),
            run: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ServerState {
        self.shared.table().state.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.table().len()
    }

    /// Bound listener address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|r| r.local_addr)
    }

    pub fn traffic(&self) -> TrafficStats {
        self.app.stats.snapshot()
    }

    /// Current relay profile
    pub fn profile(&self) -> ServerProfile {
        self.context().profile.clone()
    }

    /// Cipher bound to the current profile
    pub fn cipher(&self) -> Arc<CipherEngine> {
        Arc::clone(&self.context().cipher)
    }

    fn context(&self) -> Arc<ConnectionContext> {
        Arc::clone(&self.conn_ctx.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Bind the listener and start accepting
    pub async fn start(&self) -> Result<()> {
        let stale = {
            let mut table = self.shared.table();
            let stale = match table.state {
                ServerState::Running | ServerState::Starting => {
                    return Err(ProxyError::System("Server is already running".into()));
                }
                ServerState::Error(_) => Some(table.drain()),
                ServerState::Stopped => None,
            };
            table.state = ServerState::Starting;
            stale
        };

        // A failed run still owns its background tasks and connections
        if let Some(connections) = stale {
            let count = self.teardown_run(connections).await;
            debug!("Cleared failed run, {} connections cancelled", count);
        }

        let bind_addr = self.app.local.bind_addr();
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind {}: {}", bind_addr, e);
                let kind = e.kind();
                let message = e.to_string();
                self.shared.set_state(ServerState::Error(Arc::new(e)));
                return Err(ProxyError::Io(io::Error::new(kind, message)));
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let message = e.to_string();
                self.shared.set_state(ServerState::Error(Arc::new(e)));
                return Err(ProxyError::System(format!("Listener has no address: {}", message)));
            }
        };

        let token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ctx = self.context();

        self.shared.set_state(ServerState::Running);

        let tasks = vec![
            tokio::spawn(accept_loop(
                listener,
                Arc::clone(&self.shared),
                Arc::clone(&ctx),
                events_tx,
                token.clone(),
            )),
            tokio::spawn(event_loop(
                events_rx,
                Arc::clone(&self.shared),
                Arc::clone(&ctx),
                token.clone(),
            )),
            tokio::spawn(idle_monitor(
                Arc::clone(&self.shared),
                self.app.local.monitor_interval(),
                self.app.local.idle_timeout(),
                token.clone(),
            )),
        ];

        let reporter = self
            .app
            .stats
            .start_reporting(self.app.local.stats_interval(), |stats| {
                trace!(
                    "Traffic: up={} down={} connections={}",
                    stats.upload_bytes,
                    stats.download_bytes,
                    stats.connections
                );
            });

        *self.run.lock().unwrap_or_else(|e| e.into_inner()) = Some(RunHandle {
            token,
            local_addr,
            tasks,
            _reporter: reporter,
        });

        info!(
            "SOCKS5 proxy listening on {} (relay {})",
            local_addr,
            ctx.profile.server_addr()
        );
        Ok(())
    }

    /// Stop accepting and cancel every tracked connection
    pub async fn stop(&self) -> Result<()> {
        let connections = {
            let mut table = self.shared.table();
            match table.state {
                ServerState::Stopped | ServerState::Starting => {
                    return Err(ProxyError::System("Server is not running".into()));
                }
                _ => table.state = ServerState::Stopped,
            }
            table.drain()
        };

        let count = self.teardown_run(connections).await;
        info!("SOCKS5 proxy stopped, {} connections cancelled", count);
        Ok(())
    }

    /// Cancel the current run's tasks and the given connections
    async fn teardown_run(&self, connections: Vec<Arc<ProxyConnection>>) -> usize {
        let run = self.run.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(run) = &run {
            run.token.cancel();
        }

        let count = connections.len();
        for conn in connections {
            conn.cancel();
            self.app.stats.decrement_connections();
        }

        if let Some(run) = run {
            for task in run.tasks {
                let _ = task.await;
            }
        }
        count
    }

    /// Switch to a new relay profile
    ///
    /// The profile is validated and a fresh cipher built before anything is
    /// torn down. A running server is restarted on the new profile.
    pub async fn update_profile(&self, profile: ServerProfile) -> Result<()> {
        let ctx = Arc::new(self.app.connection_context(profile)?);
        let was_running = self.state().is_running();

        if was_running {
            self.stop().await?;
        }
        *self.conn_ctx.lock().unwrap_or_else(|e| e.into_inner()) = ctx;
        info!("Relay profile updated");

        if was_running {
            self.start().await?;
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    ctx: Arc<ConnectionContext>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    token: CancellationToken,
) {
    let client_opts = SocketOpts::for_client();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = client_opts.apply(&stream) {
                        warn!("Failed to apply socket options for {}: {}", peer, e);
                    }

                    let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    let conn = ProxyConnection::new(id, peer, Arc::clone(&ctx), events.clone());
                    if !shared.table().insert(Arc::clone(&conn)) {
                        // Stopped between accept and insert
                        conn.cancel();
                        continue;
                    }
                    ctx.stats.increment_connections();
                    debug!("[{}] Accepted connection from {}", id, peer);
                    conn.start(stream);
                }
                Err(e) => {
                    error!("Listener failed: {}", e);
                    shared.set_state(ServerState::Error(Arc::new(e)));
                    break;
                }
            }
        }
    }
    debug!("Accept loop finished");
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    shared: Arc<Shared>,
    ctx: Arc<ConnectionContext>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let ConnectionEvent::Failed { id, error } = &event {
            debug!("[{}] Evicting failed connection ({:?})", id, error.kind());
        }
        if shared.table().remove(event.id()).is_some() {
            ctx.stats.decrement_connections();
        }
    }
}

async fn idle_monitor(
    shared: Arc<Shared>,
    interval: Duration,
    idle_timeout: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let connections = shared.table().snapshot();
                for conn in connections {
                    if conn.state() == ConnectionState::Relay && conn.idle_for() > idle_timeout {
                        info!(
                            "[{}] Idle for {:?}, cancelling connection from {}",
                            conn.id(),
                            conn.idle_for(),
                            conn.peer()
                        );
                        conn.cancel();
                    }
                }
            }
        }
    }
}
