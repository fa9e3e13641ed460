//! Subscription Session
//!
//! One client's accepted subscription: the immutable request, the emitted
//! update counter, the last-known value of every monitored path and the
//! session's own timestamp clock.
//!
//! ```text
//! Created --activate--> Active --begin_emission--> Emitting
//!                         ^                           |
//!                         +------finish_emission------+
//!
//! Created | Active | Emitting --close--> Closed(reason)
//! ```

mod request;
pub use request::*;

#[cfg(test)]
mod session_test;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::constants::MAX_UPDATE_COUNT_REACHED;
use crate::utils::time::MonotonicClock;
use crate::SessionError;
use crate::TelemetryValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `update_count` notifications were delivered
    UpdateLimitReached(u64),
    /// ONCE subscription delivered its single emission
    Completed,
    /// Client closed its stream or dropped the response receiver
    ClientCancelled,
    /// Store reads kept failing after the retry budget
    StoreFailure(String),
    /// Server is shutting down
    Shutdown,
    /// Illegal state transition inside the worker
    Aborted(String),
}

impl fmt::Display for CloseReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CloseReason::UpdateLimitReached(n) => write!(f, "{} {}", MAX_UPDATE_COUNT_REACHED, n),
            CloseReason::Completed => write!(f, "Subscription completed"),
            CloseReason::ClientCancelled => write!(f, "Cancelled by client"),
            CloseReason::StoreFailure(msg) => write!(f, "Store failure: {}", msg),
            CloseReason::Shutdown => write!(f, "Server shutting down"),
            CloseReason::Aborted(msg) => write!(f, "Session aborted: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Emitting,
    Closed(CloseReason),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Created => "Created",
            SessionState::Active => "Active",
            SessionState::Emitting => "Emitting",
            SessionState::Closed(_) => "Closed",
        }
    }
}

/// One value produced for one monitored path
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub target: String,
    pub path: Vec<String>,
    /// `None` when the data behind the path was deleted
    pub value: Option<TelemetryValue>,
    pub timestamp: u64,
}

/// All updates of one emission, delivered as a single notification
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub timestamp: u64,
    pub updates: Vec<UpdateEvent>,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    request: SubscriptionRequest,
    effective: Vec<EffectiveMode>,
    state: SessionState,
    updates_sent: u64,
    /// Outer `None`: path never read yet
    snapshot: Vec<Option<Option<TelemetryValue>>>,
    clock: MonotonicClock,
}

impl Session {
    /// `default_interval` applies to TARGET_DEFINED paths resolved to sampling
    pub fn new(
        id: SessionId,
        request: SubscriptionRequest,
        default_interval: Duration,
    ) -> Self {
        let effective = request
            .entries()
            .iter()
            .map(|e| e.mode.effective(e.path.policy, default_interval))
            .collect();
        let snapshot = vec![None; request.entries().len()];
        Self {
            id,
            request,
            effective,
            state: SessionState::Created,
            updates_sent: 0,
            snapshot,
            clock: MonotonicClock::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn request(&self) -> &SubscriptionRequest {
        &self.request
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn updates_sent(&self) -> u64 {
        self.updates_sent
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed(_))
    }

    pub fn effective_mode(
        &self,
        index: usize,
    ) -> Option<EffectiveMode> {
        self.effective.get(index).copied()
    }

    /// Indices of sampled paths grouped by interval
    pub fn sample_groups(&self) -> BTreeMap<Duration, Vec<usize>> {
        let mut groups: BTreeMap<Duration, Vec<usize>> = BTreeMap::new();
        for (i, mode) in self.effective.iter().enumerate() {
            if let EffectiveMode::Sample(interval) = mode {
                groups.entry(*interval).or_default().push(i);
            }
        }
        groups
    }

    pub fn on_change_paths(&self) -> Vec<usize> {
        self.effective
            .iter()
            .enumerate()
            .filter(|(_, m)| **m == EffectiveMode::OnChange)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn activate(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Created, SessionState::Active)
    }

    /// Enters `Emitting` and hands out the timestamp shared by this emission
    pub fn begin_emission(&mut self) -> Result<u64, SessionError> {
        self.transition(SessionState::Active, SessionState::Emitting)?;
        Ok(self.clock.next())
    }

    /// Leaves `Emitting`, returns true when the update cap was reached and the
    /// session is now closed.
    pub fn finish_emission(&mut self) -> Result<bool, SessionError> {
        self.transition(SessionState::Emitting, SessionState::Active)?;
        if self.record_emission() {
            let limit = self.updates_sent;
            self.close(CloseReason::UpdateLimitReached(limit))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Counts one delivered notification, true once the cap is reached
    pub fn record_emission(&mut self) -> bool {
        self.updates_sent += 1;
        matches!(self.request.update_limit(), Some(limit) if self.updates_sent >= limit)
    }

    pub fn close(
        &mut self,
        reason: CloseReason,
    ) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::InvalidTransition {
                from: self.state.name(),
                to: "Closed",
            });
        }
        debug!(session_id = %self.id, %reason, updates_sent = self.updates_sent, "session closed");
        self.state = SessionState::Closed(reason);
        Ok(())
    }

    /// Stores `value` as the last known value of path `index` and
    /// reports whether it differs from the previous one.
    ///
    /// The first read of a path always counts as a change.
    pub fn diff(
        &mut self,
        index: usize,
        value: &Option<TelemetryValue>,
    ) -> bool {
        let Some(slot) = self.snapshot.get_mut(index) else {
            return false;
        };
        let changed = slot.as_ref() != Some(value);
        if changed {
            *slot = Some(value.clone());
        }
        changed
    }

    fn transition(
        &mut self,
        from: SessionState,
        to: SessionState,
    ) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
        Ok(())
    }
}
