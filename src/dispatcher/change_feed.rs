//! Shared change-notification feed for ON_CHANGE sessions
//!
//! ```text
//! store write -> broadcast<KeyChange> -> ChangeFeed pump task
//!                                          -> filter per watcher (db + key/prefix)
//!                                          -> try_send(per-watcher channel)
//! ```
//!
//! A full watcher channel is not an error: the watcher is flagged through its
//! `resync` notify and the session re-reads every on-change path. A lagging
//! broadcast receiver flags every watcher the same way.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::DataSource;
use crate::DataStore;
use crate::KeyChange;

struct Watcher {
    sources: Vec<DataSource>,
    sender: mpsc::Sender<KeyChange>,
    resync: Arc<Notify>,
}

impl Watcher {
    fn wants(
        &self,
        change: &KeyChange,
    ) -> bool {
        self.sources.iter().any(|s| s.is_affected_by(change))
    }
}

#[derive(Default)]
struct ChangeFeedInner {
    watchers: DashMap<u64, Watcher>,
    next_id: AtomicU64,
}

impl ChangeFeedInner {
    fn dispatch(
        &self,
        change: &KeyChange,
    ) {
        for watcher in self.watchers.iter() {
            if !watcher.wants(change) {
                continue;
            }
            match watcher.sender.try_send(change.clone()) {
                Ok(()) => trace!(watcher_id = *watcher.key(), key = %change.key, "change forwarded"),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(watcher_id = *watcher.key(), "watcher channel full, coalescing into resync");
                    watcher.resync.notify_one();
                }
                // The guard removes it shortly
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    fn resync_all(&self) {
        for watcher in self.watchers.iter() {
            watcher.resync.notify_one();
        }
    }
}

/// Handle returned by [`ChangeFeed::register`]; dropping it unregisters
pub struct WatchRegistration {
    pub receiver: mpsc::Receiver<KeyChange>,
    pub resync: Arc<Notify>,
    pub guard: WatcherGuard,
}

/// Removes the watcher from the feed when dropped
pub struct WatcherGuard {
    id: u64,
    inner: Arc<ChangeFeedInner>,
}

impl WatcherGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.inner.watchers.remove(&self.id);
        trace!(watcher_id = self.id, "watcher unregistered");
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<ChangeFeedInner>,
    watcher_buffer: usize,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("watchers", &self.inner.watchers.len())
            .field("watcher_buffer", &self.watcher_buffer)
            .finish()
    }
}

impl ChangeFeed {
    pub fn new(watcher_buffer: usize) -> Self {
        Self {
            inner: Arc::new(ChangeFeedInner::default()),
            watcher_buffer: watcher_buffer.max(1),
        }
    }

    /// Spawns the pump forwarding the store's change broadcast until `shutdown`
    pub fn start(
        &self,
        store: &dyn DataStore,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let rx = store.changes();
        let inner = self.inner.clone();
        tokio::spawn(Self::pump(inner, rx, shutdown))
    }

    async fn pump(
        inner: Arc<ChangeFeedInner>,
        mut rx: broadcast::Receiver<KeyChange>,
        shutdown: CancellationToken,
    ) {
        info!("Change feed started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(change) => inner.dispatch(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged, resyncing all watchers");
                        inner.resync_all();
                    }
                    Err(RecvError::Closed) => {
                        info!("store change broadcast closed");
                        break;
                    }
                },
            }
        }
        info!("Change feed stopped");
    }

    /// Registers interest in every change affecting one of `sources`
    pub fn register(
        &self,
        sources: Vec<DataSource>,
    ) -> WatchRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.watcher_buffer);
        let resync = Arc::new(Notify::new());
        self.inner.watchers.insert(
            id,
            Watcher {
                sources,
                sender,
                resync: resync.clone(),
            },
        );
        trace!(watcher_id = id, "watcher registered");

        WatchRegistration {
            receiver,
            resync,
            guard: WatcherGuard {
                id,
                inner: self.inner.clone(),
            },
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }
}
