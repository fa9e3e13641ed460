use std::time::Duration;

use crate::ResolvedPath;
use crate::SessionError;
use crate::TargetDefinedPolicy;

/// Wire values of `SubscriptionList.Mode`
const WIRE_STREAM: i32 = 0;
const WIRE_ONCE: i32 = 1;
const WIRE_POLL: i32 = 2;

/// Wire values of `SubscriptionMode`
const WIRE_TARGET_DEFINED: i32 = 0;
const WIRE_ON_CHANGE: i32 = 1;
const WIRE_SAMPLE: i32 = 2;

/// A validated client request
///
/// GET never creates a session, so it carries no subscription fields at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryRequest {
    Get(GetRequest),
    Subscribe(SubscriptionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub paths: Vec<ResolvedPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    Stream,
    Once,
    Poll,
}

impl SubscribeMode {
    pub fn from_wire(mode: i32) -> Result<Self, SessionError> {
        match mode {
            WIRE_STREAM => Ok(SubscribeMode::Stream),
            WIRE_ONCE => Ok(SubscribeMode::Once),
            WIRE_POLL => Ok(SubscribeMode::Poll),
            other => Err(SessionError::UnsupportedMode(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeMode::Stream => "stream",
            SubscribeMode::Once => "once",
            SubscribeMode::Poll => "poll",
        }
    }
}

/// Per-path trigger policy of a STREAM subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMode {
    /// Resolved per path from the catalog; a requested interval is kept for
    /// paths that turn out to be sampled.
    TargetDefined { interval: Option<Duration> },
    OnChange,
    Sample { interval: Duration },
}

impl SubMode {
    /// Validates the wire sub-mode; `interval_ns` is `sample_interval` in nanoseconds
    pub fn from_wire(
        mode: i32,
        interval_ns: u64,
        path: &str,
    ) -> Result<Self, SessionError> {
        match mode {
            WIRE_TARGET_DEFINED => Ok(SubMode::TargetDefined {
                interval: (interval_ns > 0).then(|| Duration::from_nanos(interval_ns)),
            }),
            WIRE_ON_CHANGE => Ok(SubMode::OnChange),
            WIRE_SAMPLE if interval_ns == 0 => Err(SessionError::InvalidInterval(path.to_string())),
            WIRE_SAMPLE => Ok(SubMode::Sample {
                interval: Duration::from_nanos(interval_ns),
            }),
            other => Err(SessionError::UnsupportedMode(other)),
        }
    }

    /// Concrete behaviour for a path with the given TARGET_DEFINED policy
    pub fn effective(
        &self,
        policy: TargetDefinedPolicy,
        default_interval: Duration,
    ) -> EffectiveMode {
        match *self {
            SubMode::OnChange => EffectiveMode::OnChange,
            SubMode::Sample { interval } => EffectiveMode::Sample(interval),
            SubMode::TargetDefined { interval } => match policy {
                TargetDefinedPolicy::OnChange => EffectiveMode::OnChange,
                TargetDefinedPolicy::Sample => EffectiveMode::Sample(interval.unwrap_or(default_interval)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveMode {
    OnChange,
    Sample(Duration),
}

impl EffectiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveMode::OnChange => "on_change",
            EffectiveMode::Sample(_) => "sample",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    pub path: ResolvedPath,
    pub mode: SubMode,
}

/// Immutable once accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    mode: SubscribeMode,
    entries: Vec<SubscriptionEntry>,
    update_limit: Option<u64>,
}

impl SubscriptionRequest {
    /// `update_count` of 0 means unbounded
    pub fn new(
        mode: SubscribeMode,
        entries: Vec<SubscriptionEntry>,
        update_count: u64,
    ) -> Result<Self, SessionError> {
        if entries.is_empty() {
            return Err(SessionError::EmptySubscription);
        }
        Ok(Self {
            mode,
            entries,
            update_limit: (update_count > 0).then_some(update_count),
        })
    }

    pub fn mode(&self) -> SubscribeMode {
        self.mode
    }

    pub fn entries(&self) -> &[SubscriptionEntry] {
        &self.entries
    }

    pub fn update_limit(&self) -> Option<u64> {
        self.update_limit
    }
}
