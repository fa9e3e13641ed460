//! Update Dispatcher
//!
//! Centralized manager for every live subscription session. It runs as a
//! single long-lived background task and spawns one worker task per session.
//!
//! ```text
//! TelemetryServer::subscribe()
//!   └─> DispatcherHandle::register()  [slot reserved, registry entry]
//!         └─> Dispatcher::run()
//!               ├─> spawns SessionWorker for session 1
//!               ├─> spawns SessionWorker for session 2
//!               └─> ...
//! ```
//!
//! Workers never share state with each other: a slow client or a failing
//! store path only ever stalls its own task. Shutdown cancels the root token,
//! which cancels every session token derived from it.

mod change_feed;
mod worker;

pub use change_feed::*;
pub use worker::SessionEvent;
pub(crate) use worker::SessionWorker;


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::ACTIVE_SESSIONS;
use crate::DispatcherConfig;
use crate::NetworkError;
use crate::Result;
use crate::Session;
use crate::SessionError;
use crate::SessionId;
use crate::SubscribeMode;
use crate::ValueReader;

/// Registry entry of one live session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub mode: SubscribeMode,
    pub paths: usize,
    pub registered_at: Instant,
    cancel: CancellationToken,
}

type Registry = DashMap<SessionId, SessionEntry>;

/// Holds a session's place in the registry; released when the worker ends
struct SessionSlot {
    id: SessionId,
    registry: Arc<Registry>,
    active_count: Arc<AtomicU64>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        let prev = self.active_count.fetch_sub(1, Ordering::AcqRel);
        ACTIVE_SESSIONS.dec();
        debug!(session_id = %self.id, active_count = prev.saturating_sub(1), "session slot released");
    }
}

/// Request to start a worker for an accepted session
struct Registration {
    session: Session,
    outbound: mpsc::Sender<SessionEvent>,
    poll_rx: Option<mpsc::Receiver<()>>,
    cancel: CancellationToken,
    slot: SessionSlot,
}

/// Cancels the session; the worker exits at its next scheduling point
#[derive(Debug, Clone)]
pub struct SessionControl {
    pub id: SessionId,
    cancel: CancellationToken,
}

impl SessionControl {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct Dispatcher {
    registration_rx: mpsc::Receiver<Registration>,
    reader: ValueReader,
    change_feed: ChangeFeed,
    shutdown: watch::Receiver<()>,
    root_token: CancellationToken,
    slow_consumer_threshold: Duration,
    active_count: Arc<AtomicU64>,
}

/// Handle for communicating with the dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    registration_tx: mpsc::Sender<Registration>,
    registry: Arc<Registry>,
    active_count: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    root_token: CancellationToken,
    max_sessions: usize,
}

impl Dispatcher {
    /// Returns (dispatcher, handle) pair
    pub fn new(
        reader: ValueReader,
        config: &DispatcherConfig,
        max_sessions: usize,
        shutdown: watch::Receiver<()>,
    ) -> (Self, DispatcherHandle) {
        let (registration_tx, registration_rx) = mpsc::channel(config.registration_buffer.max(1));
        let active_count = Arc::new(AtomicU64::new(0));
        let root_token = CancellationToken::new();

        let dispatcher = Self {
            registration_rx,
            reader,
            change_feed: ChangeFeed::new(config.watcher_buffer),
            shutdown,
            root_token: root_token.clone(),
            slow_consumer_threshold: config.slow_consumer_threshold(),
            active_count: active_count.clone(),
        };

        let handle = DispatcherHandle {
            registration_tx,
            registry: Arc::new(DashMap::new()),
            active_count,
            next_id: Arc::new(AtomicU64::new(1)),
            root_token,
            max_sessions,
        };

        (dispatcher, handle)
    }

    pub fn change_feed(&self) -> &ChangeFeed {
        &self.change_feed
    }

    /// Processes registrations until the shutdown signal, then cancels every session
    pub async fn run(mut self) {
        info!("Update dispatcher started");
        let _pump = self.change_feed.start(self.reader.store().as_ref(), self.root_token.clone());

        loop {
            tokio::select! {
                registration = self.registration_rx.recv() => match registration {
                    Some(registration) => self.handle_registration(registration),
                    None => break,
                },

                _ = self.shutdown.changed() => {
                    info!("Update dispatcher shutting down");
                    break;
                }
            }
        }

        self.root_token.cancel();
        // Registrations still queued release their slots on drop
        self.registration_rx.close();
        info!(
            active_count = self.active_count.load(Ordering::Acquire),
            "Update dispatcher stopped"
        );
    }

    fn handle_registration(
        &self,
        registration: Registration,
    ) {
        let Registration {
            session,
            outbound,
            poll_rx,
            cancel,
            slot,
        } = registration;

        let session_id = session.id();
        let worker = SessionWorker::new(
            session,
            self.reader.clone(),
            self.change_feed.clone(),
            outbound,
            poll_rx,
            cancel,
            self.root_token.clone(),
            self.slow_consumer_threshold,
        );

        info!(
            session_id = %session_id,
            active_count = self.active_count.load(Ordering::Acquire),
            "Spawning session worker"
        );

        tokio::spawn(async move {
            // Keep the slot alive for the worker's lifetime
            let _slot = slot;
            let reason = worker.run().await;
            info!(session_id = %session_id, %reason, "Session worker completed");
        });
    }
}

impl DispatcherHandle {
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Hands an accepted session to the dispatcher.
    ///
    /// Fails with `TooManySessions` once `max_sessions` sessions are live.
    pub async fn register(
        &self,
        session: Session,
        outbound: mpsc::Sender<SessionEvent>,
        poll_rx: Option<mpsc::Receiver<()>>,
    ) -> Result<SessionControl> {
        if self.root_token.is_cancelled() {
            return Err(NetworkError::ServerUnavailable("dispatcher is shutting down".into()).into());
        }

        let max = self.max_sessions as u64;
        if self
            .active_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            warn!(max_sessions = self.max_sessions, "session limit reached");
            return Err(SessionError::TooManySessions(self.max_sessions).into());
        }
        ACTIVE_SESSIONS.inc();

        let id = session.id();
        let cancel = self.root_token.child_token();
        self.registry.insert(
            id,
            SessionEntry {
                mode: session.request().mode(),
                paths: session.request().entries().len(),
                registered_at: Instant::now(),
                cancel: cancel.clone(),
            },
        );
        let slot = SessionSlot {
            id,
            registry: self.registry.clone(),
            active_count: self.active_count.clone(),
        };

        let registration = Registration {
            session,
            outbound,
            poll_rx,
            cancel: cancel.clone(),
            slot,
        };
        // On failure the registration, and with it the slot, is dropped
        self.registration_tx
            .send(registration)
            .await
            .map_err(|_| NetworkError::ServerUnavailable("dispatcher stopped".into()))?;

        Ok(SessionControl { id, cancel })
    }

    /// Cancels one live session, false if it is not registered
    pub fn cancel(
        &self,
        id: SessionId,
    ) -> bool {
        match self.registry.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(
        &self,
        id: SessionId,
    ) -> bool {
        self.registry.contains_key(&id)
    }

    /// Get the current number of live sessions
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Acquire)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.registry.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}
