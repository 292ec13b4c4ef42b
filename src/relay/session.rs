//! Pending backend connections, keyed by correlation id.
//!
//! # Lifecycle
//! ```text
//! reserve()          → Connecting   (pre-upgrade started, backend connecting)
//! mark_open()        → Pending      (backend socket open, handshake not done)
//! take_for_pairing() → Paired       (client socket attached, relay running)
//! release()          → removed      (first terminating event from either side)
//! ```
//!
//! Entries that never reach `Paired` are removed by the reaper once older
//! than the configured TTL. Releasing an id twice is a no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::request::Parts;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::ConfigHandle;
use crate::http::request::RequestId;
use crate::observability::metrics;

/// Session table misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a session for request '{0}' already exists")]
    Duplicate(RequestId),
    #[error("no connecting session for request '{0}'")]
    NotReserved(RequestId),
}

/// A backend socket that is open but not yet paired with a client socket.
#[derive(Debug)]
pub struct PendingBackendConnection<S> {
    pub backend: S,
    /// Head of the client's upgrade request, used to re-run the gate on
    /// every relayed message.
    pub upgrade_request: Arc<Parts>,
    pub opened_at: Instant,
}

impl<S> PendingBackendConnection<S> {
    pub fn new(backend: S, upgrade_request: Arc<Parts>) -> Self {
        Self {
            backend,
            upgrade_request,
            opened_at: Instant::now(),
        }
    }
}

/// Copy method, uri, version and headers of a request head.
pub fn capture_head(parts: &Parts) -> Parts {
    let (mut head, ()) = axum::http::Request::new(()).into_parts();
    head.method = parts.method.clone();
    head.uri = parts.uri.clone();
    head.version = parts.version;
    head.headers = parts.headers.clone();
    head
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Pending,
    Paired,
}

#[derive(Debug)]
enum SessionState<S> {
    Connecting { since: Instant },
    Pending(PendingBackendConnection<S>),
    Paired,
}

impl<S> SessionState<S> {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Connecting { .. } => SessionPhase::Connecting,
            SessionState::Pending(_) => SessionPhase::Pending,
            SessionState::Paired => SessionPhase::Paired,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        match self {
            SessionState::Connecting { since } => now.duration_since(*since) >= ttl,
            SessionState::Pending(pending) => now.duration_since(pending.opened_at) >= ttl,
            SessionState::Paired => false,
        }
    }
}

/// Concurrent map of relay sessions.
///
/// Every transition is a single map operation, so insert, lookup and removal
/// are atomic with respect to each other.
#[derive(Debug)]
pub struct SessionTable<S> {
    inner: DashMap<RequestId, SessionState<S>>,
}

impl<S> Default for SessionTable<S> {
    fn default() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<S> SessionTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` before connecting to the backend.
    pub fn reserve(&self, id: &RequestId) -> Result<(), SessionError> {
        match self.inner.entry(id.clone()) {
            Entry::Occupied(_) => Err(SessionError::Duplicate(id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(SessionState::Connecting {
                    since: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Record the open backend socket for a reserved id.
    ///
    /// Fails if the reservation is gone (reaped or released meanwhile). The
    /// backend socket is dropped in that case.
    pub fn mark_open(
        &self,
        id: &RequestId,
        pending: PendingBackendConnection<S>,
    ) -> Result<(), SessionError> {
        match self.inner.get_mut(id) {
            Some(mut state) if matches!(*state, SessionState::Connecting { .. }) => {
                *state = SessionState::Pending(pending);
                Ok(())
            }
            _ => Err(SessionError::NotReserved(id.clone())),
        }
    }

    /// Hand the backend socket over to the relay.
    pub fn take_for_pairing(&self, id: &RequestId) -> Option<PendingBackendConnection<S>> {
        let mut state = self.inner.get_mut(id)?;
        match std::mem::replace(&mut *state, SessionState::Paired) {
            SessionState::Pending(pending) => Some(pending),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Remove `id`. Returns false if it was already gone.
    pub fn release(&self, id: &RequestId) -> bool {
        self.inner.remove(id).is_some()
    }

    pub fn phase(&self, id: &RequestId) -> Option<SessionPhase> {
        self.inner.get(id).map(|state| state.phase())
    }

    /// Remove unpaired sessions older than `ttl`.
    pub fn reap_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut reaped = 0;
        self.inner.retain(|id, state| {
            if state.is_expired(now, ttl) {
                tracing::warn!(request_id = %id, phase = ?state.phase(), "Reaping unpaired relay session");
                reaped += 1;
                false
            } else {
                true
            }
        });
        reaped
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Releases a reservation when dropped, unless disarmed.
///
/// Covers the pre-upgrade future being dropped or failing half way.
pub struct Reservation<'a, S> {
    table: &'a SessionTable<S>,
    id: &'a RequestId,
    armed: bool,
}

impl<'a, S> Reservation<'a, S> {
    pub fn new(table: &'a SessionTable<S>, id: &'a RequestId) -> Result<Self, SessionError> {
        table.reserve(id)?;
        Ok(Self {
            table,
            id,
            armed: true,
        })
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S> Drop for Reservation<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.table.release(self.id);
        }
    }
}

/// Periodically reap unpaired sessions until shutdown.
///
/// TTL and interval are read from the live config on every tick.
pub async fn run_reaper<S>(
    table: Arc<SessionTable<S>>,
    config: ConfigHandle,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: Send + Sync + 'static,
{
    tracing::info!("Relay session reaper starting");

    loop {
        let relay = config.snapshot().relay.clone();
        let interval = Duration::from_secs(relay.reap_interval_secs.max(1));

        tokio::select! {
            _ = time::sleep(interval) => {
                let reaped = table.reap_expired(Duration::from_secs(relay.pending_ttl_secs));
                if reaped > 0 {
                    metrics::record_sessions_reaped(reaped);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Relay session reaper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
