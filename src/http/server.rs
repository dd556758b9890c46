//! The trigger server: listener lifecycle and reconfiguration.
//!
//! # Responsibilities
//! - Bind the configured port and accept connections
//! - Spawn one session per connection and track it for cancellation
//! - Publish and withdraw the discovery record
//! - Apply a new configuration through stop-then-start
//!
//! # State Machine
//! ```text
//! Stopped → Starting → Listening → Stopping → Stopped
//!              │
//!              └──→ Error (bind failure)
//! ```
//!
//! # Design Decisions
//! - All state sits behind one async mutex; start/stop/restart hold it for
//!   their whole duration
//! - Restart drops in-flight connections of the previous generation
//! - Concurrent restarts are last-write-wins: whichever call gets the lock
//!   applies the newest configuration still requested, and older calls that
//!   were waiting behind it return without binding again

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::schema::ServerConfig;
use crate::discovery::Advertiser;
use crate::extract::PatternCache;
use crate::http::session::Session;
use crate::net::{ConnectionId, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::playback::PlaybackSink;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors surfaced by `start` and `restart`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already listening; use restart")]
    AlreadyRunning,

    #[error("invalid port {0}")]
    InvalidPort(u16),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Lifecycle state of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
    Error,
}

/// What an observer (status bar, log line) sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Running(u16),
    Error(String),
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Stopped => f.write_str("stopped"),
            ServerStatus::Running(port) => write!(f, "running on port {}", port),
            ServerStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// One bound socket and everything accepted through it.
struct Generation {
    local_addr: SocketAddr,
    config: Arc<ArcSwapOption<ServerConfig>>,
    accept_task: JoinHandle<()>,
    tracker: ConnectionTracker,
    advertiser: Option<Advertiser>,
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.config.store(None);
        self.tracker.cancel_all();
    }
}

struct Inner {
    state: ServerState,
    generation: Option<Generation>,
}

/// Shared between the accept loop and the sessions it spawns.
#[derive(Clone)]
struct AcceptContext {
    config: Arc<ArcSwapOption<ServerConfig>>,
    tracker: ConnectionTracker,
    sink: Arc<dyn PlaybackSink>,
    patterns: Arc<PatternCache>,
}

/// Restart requests waiting for the lock, by request number.
type PendingRestarts = std::sync::Mutex<BTreeMap<u64, ServerConfig>>;

/// HTTP trigger server.
pub struct TriggerServer {
    inner: Mutex<Inner>,
    sink: Arc<dyn PlaybackSink>,
    patterns: Arc<PatternCache>,
    /// Number of restarts requested so far; the newest one wins.
    restart_requests: AtomicU64,
    pending_restarts: PendingRestarts,
    /// Newest request number whose configuration has been tried.
    settled_restart: AtomicU64,
    status: watch::Sender<ServerStatus>,
}

/// A restart request that withdraws itself if its caller goes away.
struct PendingRestart<'a> {
    pending: &'a PendingRestarts,
    ticket: u64,
}

impl<'a> PendingRestart<'a> {
    fn register(pending: &'a PendingRestarts, ticket: u64, config: ServerConfig) -> Self {
        pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ticket, config);
        Self { pending, ticket }
    }

    /// Take the newest outstanding request, dropping every older one.
    fn take_newest(&self) -> Option<(u64, ServerConfig)> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let newest = pending.pop_last();
        pending.clear();
        newest
    }
}

impl Drop for PendingRestart<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.ticket);
    }
}

impl TriggerServer {
    /// Create a stopped server delivering URLs to `sink`.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Self {
            inner: Mutex::new(Inner {
                state: ServerState::Stopped,
                generation: None,
            }),
            sink,
            patterns: Arc::new(PatternCache::new()),
            restart_requests: AtomicU64::new(0),
            pending_restarts: std::sync::Mutex::new(BTreeMap::new()),
            settled_restart: AtomicU64::new(0),
            status,
        }
    }

    /// Bind and start accepting with `config`.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if a listener is bound.
    pub async fn start(&self, config: ServerConfig) -> Result<(), ServerError> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner, config).await
    }

    /// Stop accepting and cancel every open connection. Idempotent.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    /// Replace the running configuration: stop, then start with `config`.
    ///
    /// The call that gets the lock applies the newest configuration requested
    /// by a restart that is still waiting, which may be a later one than its
    /// own. A call whose request was already covered by a newer one returns
    /// `Ok(())` without touching the listener. A restart whose future is
    /// dropped before it gets the lock withdraws its request.
    pub async fn restart(&self, config: ServerConfig) -> Result<(), ServerError> {
        let ticket = self.restart_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let request = PendingRestart::register(&self.pending_restarts, ticket, config.clone());
        let mut inner = self.inner.lock().await;

        if self.settled_restart.load(Ordering::SeqCst) >= ticket {
            tracing::debug!(port = config.port, "Restart superseded by a newer configuration");
            return Ok(());
        }

        let (newest, config) = request.take_newest().unwrap_or((ticket, config));
        self.settled_restart.store(newest, Ordering::SeqCst);

        metrics::record_restart();
        self.stop_locked(&mut inner).await;
        self.start_locked(&mut inner, config).await
    }

    pub async fn state(&self) -> ServerState {
        self.inner.lock().await.state
    }

    /// Last published status.
    pub fn status(&self) -> ServerStatus {
        self.status.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    /// Address of the bound socket, if listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .await
            .generation
            .as_ref()
            .map(|generation| generation.local_addr)
    }

    /// Sessions currently open on the active generation.
    pub async fn active_connections(&self) -> usize {
        self.inner
            .lock()
            .await
            .generation
            .as_ref()
            .map_or(0, |generation| generation.tracker.active_count())
    }

    async fn start_locked(&self, inner: &mut Inner, config: ServerConfig) -> Result<(), ServerError> {
        if inner.generation.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        inner.state = ServerState::Starting;
        if config.port == 0 {
            return Err(self.fail(inner, ServerError::InvalidPort(0)));
        }

        let listener = match Listener::bind(config.socket_addr(), config.limits.max_connections).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.fail(inner, e.into())),
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                let error = ListenerError::Bind {
                    addr: config.socket_addr(),
                    source,
                };
                return Err(self.fail(inner, error.into()));
            }
        };

        let advertiser = config.discovery.as_ref().and_then(|discovery| {
            match Advertiser::publish(discovery, local_addr.port()) {
                Ok(advertiser) => Some(advertiser),
                Err(e) => {
                    tracing::warn!(error = %e, "Discovery publication failed; continuing without it");
                    None
                }
            }
        });

        let slot = Arc::new(ArcSwapOption::from_pointee(config));
        let tracker = ConnectionTracker::new();
        let context = AcceptContext {
            config: Arc::clone(&slot),
            tracker: tracker.clone(),
            sink: Arc::clone(&self.sink),
            patterns: Arc::clone(&self.patterns),
        };
        let accept_task = tokio::spawn(accept_loop(listener, context));

        inner.generation = Some(Generation {
            local_addr,
            config: slot,
            accept_task,
            tracker,
            advertiser,
        });
        inner.state = ServerState::Listening;
        self.status.send_replace(ServerStatus::Running(local_addr.port()));

        tracing::info!(address = %local_addr, "Trigger server listening");
        Ok(())
    }

    async fn stop_locked(&self, inner: &mut Inner) {
        let Some(mut generation) = inner.generation.take() else {
            if inner.state != ServerState::Stopped {
                inner.state = ServerState::Stopped;
                self.status.send_replace(ServerStatus::Stopped);
            }
            return;
        };

        inner.state = ServerState::Stopping;

        generation.accept_task.abort();
        if let Err(e) = (&mut generation.accept_task).await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Accept loop ended abnormally");
            }
        }

        generation.config.store(None);
        let cancelled = generation.tracker.cancel_all();
        if let Some(advertiser) = generation.advertiser.take() {
            tracing::debug!(record = advertiser.fullname(), "Withdrawing discovery record");
            advertiser.shutdown();
        }

        tracing::info!(
            address = %generation.local_addr,
            cancelled_connections = cancelled,
            "Trigger server stopped"
        );
        drop(generation);

        inner.state = ServerState::Stopped;
        self.status.send_replace(ServerStatus::Stopped);
    }

    fn fail(&self, inner: &mut Inner, error: ServerError) -> ServerError {
        tracing::error!(error = %error, "Failed to start trigger server");
        inner.state = ServerState::Error;
        self.status.send_replace(ServerStatus::Error(error.to_string()));
        error
    }
}

async fn accept_loop(listener: Listener, context: AcceptContext) {
    loop {
        match listener.accept().await {
            Ok((stream, peer, permit)) => {
                let id = ConnectionId::new();
                tracing::debug!(connection_id = %id, peer_addr = %peer, "Session started");

                let session = Session::new(
                    id,
                    Arc::clone(&context.config),
                    Arc::clone(&context.sink),
                    Arc::clone(&context.patterns),
                )
                .with_peer(peer);

                context.tracker.spawn(id, async move {
                    let _permit = permit;
                    session.run(stream).await;
                });

                if listener.available_permits() == 0 {
                    tracing::warn!(
                        max_connections = listener.max_connections(),
                        "Connection limit reached; new clients wait"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn local(port: u16) -> ServerConfig {
        ServerConfig::new(port, r"https?://.+").with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn server() -> TriggerServer {
        TriggerServer::new(Arc::new(crate::playback::LogSink))
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let server = server();
        server.stop().await;
        assert_eq!(server.state().await, ServerState::Stopped);
        server.stop().await;
        assert_eq!(server.state().await, ServerState::Stopped);
        assert_eq!(server.status(), ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn start_then_stop() {
        let server = server();
        let port = free_port();
        let mut status = server.subscribe_status();

        server.start(local(port)).await.unwrap();
        assert_eq!(server.state().await, ServerState::Listening);
        assert_eq!(server.status(), ServerStatus::Running(port));
        assert_eq!(server.local_addr().await.unwrap().port(), port);
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), ServerStatus::Running(port));

        server.stop().await;
        assert_eq!(server.state().await, ServerState::Stopped);
        assert_eq!(*status.borrow_and_update(), ServerStatus::Stopped);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let server = server();
        server.start(local(free_port())).await.unwrap();
        let err = server.start(local(free_port())).await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning));
        assert_eq!(server.state().await, ServerState::Listening);
        server.stop().await;
    }

    #[tokio::test]
    async fn port_zero_is_rejected() {
        let server = server();
        let err = server.start(local(0)).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidPort(0)));
        assert_eq!(server.state().await, ServerState::Error);
        assert!(matches!(server.status(), ServerStatus::Error(_)));

        server.stop().await;
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn bind_failure_leaves_error_state() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let server = server();
        let err = server.start(local(port)).await.unwrap_err();
        assert!(matches!(err, ServerError::Listener(ListenerError::Bind { .. })));
        assert_eq!(server.state().await, ServerState::Error);
        assert!(server.local_addr().await.is_none());

        drop(blocker);
        server.restart(local(port)).await.unwrap();
        assert_eq!(server.status(), ServerStatus::Running(port));
        server.stop().await;
    }

    #[tokio::test]
    async fn failed_discovery_does_not_fail_start() {
        use crate::config::schema::DiscoveryConfig;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let port = free_port();
        let discovery = DiscoveryConfig {
            service_type: "not a service type".to_string(),
            ..DiscoveryConfig::default()
        };
        let server = server();
        server.start(local(port).with_discovery(discovery)).await.unwrap();
        assert_eq!(server.status(), ServerStatus::Running(port));

        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client
            .write_all(b"POST /play HTTP/1.1\r\nContent-Length: 26\r\n\r\nhttps://example.com/stream")
            .await
            .unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);

        server.stop().await;
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn abandoned_restart_does_not_block_an_older_one() {
        let server = Arc::new(server());
        let original = free_port();
        let wanted = free_port();
        server.start(local(original)).await.unwrap();

        let guard = server.inner.lock().await;
        let waiting = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.restart(local(wanted)).await }
        });
        while server.restart_requests.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), server.restart(local(free_port()))).await;
        assert!(abandoned.is_err());
        drop(guard);

        waiting.await.unwrap().unwrap();
        assert_eq!(server.status(), ServerStatus::Running(wanted));
        assert_eq!(server.local_addr().await.unwrap().port(), wanted);
        server.stop().await;
    }

    #[tokio::test]
    async fn older_restart_applies_newest_waiting_configuration() {
        let server = Arc::new(server());
        let first = free_port();
        let second = free_port();

        let guard = server.inner.lock().await;
        let a = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.restart(local(first)).await }
        });
        while server.restart_requests.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        let b = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.restart(local(second)).await }
        });
        while server.restart_requests.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        // The first caller gets the lock and binds the second port.
        a.await.unwrap().unwrap();
        assert_eq!(server.status(), ServerStatus::Running(second));
        b.await.unwrap().unwrap();
        assert_eq!(server.local_addr().await.unwrap().port(), second);
        server.stop().await;
    }

    #[test]
    fn status_display() {
        assert_eq!(ServerStatus::Running(9900).to_string(), "running on port 9900");
        assert_eq!(ServerStatus::Stopped.to_string(), "stopped");
    }
}
