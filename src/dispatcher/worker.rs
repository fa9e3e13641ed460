use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ChangeFeed;
use crate::metrics::UPDATES_SENT;
use crate::CloseReason;
use crate::Emission;
use crate::KeyChange;
use crate::Session;
use crate::SessionError;
use crate::SubscribeMode;
use crate::UpdateEvent;
use crate::ValueReader;

/// What a session sends towards its client
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Update(Emission),
    /// All paths were reported once since the last sync point
    Sync,
    /// Last event of every session
    Closed { reason: CloseReason, updates_sent: u64 },
}

/// Why the worker woke up in STREAM mode
enum Trigger {
    Sample(usize),
    Change(KeyChange),
    Resync,
    FeedClosed,
}

/// Drives one session from activation to close
pub(crate) struct SessionWorker {
    session: Session,
    reader: ValueReader,
    change_feed: ChangeFeed,
    outbound: mpsc::Sender<SessionEvent>,
    poll_rx: Option<mpsc::Receiver<()>>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    slow_consumer_threshold: Duration,
}

impl SessionWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: Session,
        reader: ValueReader,
        change_feed: ChangeFeed,
        outbound: mpsc::Sender<SessionEvent>,
        poll_rx: Option<mpsc::Receiver<()>>,
        cancel: CancellationToken,
        shutdown: CancellationToken,
        slow_consumer_threshold: Duration,
    ) -> Self {
        Self {
            session,
            reader,
            change_feed,
            outbound,
            poll_rx,
            cancel,
            shutdown,
            slow_consumer_threshold,
        }
    }

    /// Runs until the session closes and returns why it did
    pub(crate) async fn run(mut self) -> CloseReason {
        let reason = match self.drive().await {
            Ok(reason) | Err(reason) => reason,
        };

        if !self.session.is_closed() {
            let _ = self.session.close(reason.clone());
        }

        // Limit markers are delivered inside drive(); cancelled clients get nothing
        if !matches!(
            reason,
            CloseReason::UpdateLimitReached(_) | CloseReason::ClientCancelled
        ) {
            let closed = SessionEvent::Closed {
                reason: reason.clone(),
                updates_sent: self.session.updates_sent(),
            };
            if reason == CloseReason::Shutdown {
                // cancelled already, a blocking send would return at once
                let _ = self.outbound.try_send(closed);
            } else {
                let _ = self.send(closed).await;
            }
        }

        debug!(
            session_id = %self.session.id(),
            %reason,
            updates_sent = self.session.updates_sent(),
            "session worker finished"
        );
        reason
    }

    async fn drive(&mut self) -> Result<CloseReason, CloseReason> {
        self.session.activate().map_err(aborted)?;

        let all: Vec<usize> = (0..self.session.request().entries().len()).collect();
        if let Some(done) = self.emit(&all, false).await? {
            return Ok(done);
        }
        self.send(SessionEvent::Sync).await?;

        match self.session.request().mode() {
            SubscribeMode::Once => Ok(CloseReason::Completed),
            SubscribeMode::Poll => self.poll_loop(&all).await,
            SubscribeMode::Stream => self.stream_loop().await,
        }
    }

    async fn poll_loop(
        &mut self,
        all: &[usize],
    ) -> Result<CloseReason, CloseReason> {
        let Some(mut poll_rx) = self.poll_rx.take() else {
            return Err(aborted(SessionError::MissingSubscriptionList));
        };
        let cancel = self.cancel.clone();
        let outbound = self.outbound.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancel_reason()),
                _ = outbound.closed() => return Err(CloseReason::ClientCancelled),
                poll = poll_rx.recv() => match poll {
                    Some(()) => {
                        if let Some(done) = self.emit(all, false).await? {
                            return Ok(done);
                        }
                        self.send(SessionEvent::Sync).await?;
                    }
                    None => return Err(CloseReason::ClientCancelled),
                },
            }
        }
    }

    async fn stream_loop(&mut self) -> Result<CloseReason, CloseReason> {
        let start = Instant::now();
        let mut timers: Vec<(Interval, Vec<usize>)> = self
            .session
            .sample_groups()
            .into_iter()
            .map(|(period, indices)| {
                // The seed emission stands in for the first tick
                let mut timer = interval_at(start + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                (timer, indices)
            })
            .collect();

        let on_change = self.session.on_change_paths();
        let mut registration = (!on_change.is_empty()).then(|| {
            let sources = on_change
                .iter()
                .map(|&i| self.session.request().entries()[i].path.source.clone())
                .collect();
            self.change_feed.register(sources)
        });
        let resync = registration
            .as_ref()
            .map(|r| r.resync.clone())
            .unwrap_or_else(|| Arc::new(Notify::new()));

        if timers.is_empty() && registration.is_none() {
            return Err(aborted(SessionError::EmptySubscription));
        }

        // Changes landing between the seed read and the registration
        if let Some(done) = self.emit(&on_change, true).await? {
            return Ok(done);
        }

        let cancel = self.cancel.clone();
        let outbound = self.outbound.clone();
        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancel_reason()),
                _ = outbound.closed() => return Err(CloseReason::ClientCancelled),
                index = next_tick(&mut timers) => Trigger::Sample(index),
                _ = resync.notified() => Trigger::Resync,
                change = next_change(&mut registration) => match change {
                    Some(change) => Trigger::Change(change),
                    None => Trigger::FeedClosed,
                },
            };

            let done = match trigger {
                Trigger::FeedClosed => {
                    // catch up once, later changes can no longer be observed
                    warn!(session_id = %self.session.id(), "change feed closed");
                    registration = None;
                    self.emit(&on_change, true).await?
                }
                Trigger::Sample(index) => {
                    let indices = timers[index].1.clone();
                    self.emit(&indices, false).await?
                }
                Trigger::Change(change) => {
                    let indices: Vec<usize> = on_change
                        .iter()
                        .copied()
                        .filter(|&i| self.session.request().entries()[i].path.source.is_affected_by(&change))
                        .collect();
                    self.emit(&indices, true).await?
                }
                Trigger::Resync => self.emit(&on_change, true).await?,
            };
            if let Some(done) = done {
                return Ok(done);
            }
        }
    }

    /// Reads `indices`, emits one notification and applies the update cap.
    ///
    /// With `only_changed` unchanged paths are skipped and nothing is sent when
    /// no path changed. Returns the close reason once the cap is reached.
    async fn emit(
        &mut self,
        indices: &[usize],
        only_changed: bool,
    ) -> Result<Option<CloseReason>, CloseReason> {
        if indices.is_empty() {
            return Ok(None);
        }

        let cancel = self.cancel.clone();
        let mut values = Vec::with_capacity(indices.len());
        for &index in indices {
            let source = &self.session.request().entries()[index].path.source;
            let value = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancel_reason()),
                read = self.reader.read(source) => read,
            };
            match value {
                Ok(value) => values.push((index, value)),
                Err(e) => {
                    warn!(session_id = %self.session.id(), path = ?source, "store read failed: {}", e);
                    return Err(CloseReason::StoreFailure(e.to_string()));
                }
            }
        }

        let mut changed = Vec::with_capacity(values.len());
        for (index, value) in values {
            if self.session.diff(index, &value) || !only_changed {
                changed.push((index, value));
            }
        }
        if changed.is_empty() {
            return Ok(None);
        }

        let timestamp = self.session.begin_emission().map_err(aborted)?;
        let updates = changed
            .into_iter()
            .map(|(index, value)| {
                let path = &self.session.request().entries()[index].path;
                UpdateEvent {
                    target: path.target.clone(),
                    path: path.elems.clone(),
                    value,
                    timestamp,
                }
            })
            .collect();
        self.send(SessionEvent::Update(Emission { timestamp, updates })).await?;
        UPDATES_SENT.with_label_values(&[self.mode_label(indices[0])]).inc();

        if self.session.finish_emission().map_err(aborted)? {
            let limit = self.session.updates_sent();
            self.send(SessionEvent::Closed {
                reason: CloseReason::UpdateLimitReached(limit),
                updates_sent: limit,
            })
            .await?;
            return Ok(Some(CloseReason::UpdateLimitReached(limit)));
        }
        Ok(None)
    }

    /// Pushes onto the bounded outbound queue, waiting while it is full
    async fn send(
        &self,
        event: SessionEvent,
    ) -> Result<(), CloseReason> {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(self.cancel_reason()),
            sent = self.outbound.send(event) => {
                if sent.is_err() {
                    return Err(CloseReason::ClientCancelled);
                }
            }
        }

        let waited = started.elapsed();
        if waited >= self.slow_consumer_threshold {
            warn!(
                session_id = %self.session.id(),
                waited_ms = waited.as_millis() as u64,
                "slow consumer, outbound queue was full"
            );
        }
        Ok(())
    }

    fn cancel_reason(&self) -> CloseReason {
        if self.shutdown.is_cancelled() {
            CloseReason::Shutdown
        } else {
            CloseReason::ClientCancelled
        }
    }

    fn mode_label(
        &self,
        index: usize,
    ) -> &'static str {
        match self.session.request().mode() {
            SubscribeMode::Stream => self.session.effective_mode(index).map(|m| m.as_str()).unwrap_or("stream"),
            other => other.as_str(),
        }
    }
}

fn aborted(e: SessionError) -> CloseReason {
    CloseReason::Aborted(e.to_string())
}

/// Index of the first sample timer to fire; pending forever without timers
async fn next_tick(timers: &mut [(Interval, Vec<usize>)]) -> usize {
    if timers.is_empty() {
        return std::future::pending().await;
    }
    let ticks = timers
        .iter_mut()
        .map(|(timer, _)| async move { timer.tick().await }.boxed());
    let (_, index, _) = select_all(ticks).await;
    index
}

async fn next_change(registration: &mut Option<super::WatchRegistration>) -> Option<KeyChange> {
    match registration {
        Some(r) => r.receiver.recv().await,
        None => std::future::pending().await,
    }
}
