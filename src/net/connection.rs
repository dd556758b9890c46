//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Keep one abort handle per live session so a stop can cancel them all
//! - Remove a session from the set when it finishes or is cancelled

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

type ConnectionSet = Arc<Mutex<HashMap<ConnectionId, AbortHandle>>>;

/// The live sessions of one listener generation.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    connections: ConnectionSet,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `session` on its own task and track it under `id`.
    ///
    /// The set lock is held until the abort handle is registered, so a
    /// session that finishes immediately still removes its own entry.
    pub fn spawn<F>(&self, id: ConnectionId, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut connections = lock(&self.connections);
        let guard = ConnectionGuard {
            connections: Arc::clone(&self.connections),
            id,
        };
        metrics::connection_opened();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            session.await;
        });
        connections.insert(id, handle.abort_handle());
    }

    /// Abort every tracked session and clear the set.
    ///
    /// Returns how many sessions were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.connections).drain().collect();
        for (id, handle) in &drained {
            handle.abort();
            tracing::debug!(connection_id = %id, "Connection cancelled");
        }
        drained.len()
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> usize {
        lock(&self.connections).len()
    }
}

fn lock(set: &ConnectionSet) -> MutexGuard<'_, HashMap<ConnectionId, AbortHandle>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Guard that tracks a session's lifetime.
/// Removes the session from its set when dropped, including on abort.
#[derive(Debug)]
struct ConnectionGuard {
    connections: ConnectionSet,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        lock(&self.connections).remove(&self.id);
        metrics::connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
