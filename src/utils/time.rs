use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub fn get_duration_since_epoch() -> Duration {
    // A clock set before 1970 reads as the epoch
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// return nanoseconds since the UNIX epoch
pub fn get_now_as_nanos() -> u64 {
    u64::try_from(get_duration_since_epoch().as_nanos()).unwrap_or(u64::MAX)
}

/// Timestamp source that never goes backwards
///
/// Wall clock adjustments are absorbed by repeating the last value handed out.
#[derive(Debug, Default, Clone)]
pub struct MonotonicClock {
    last: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.last = self.last.max(get_now_as_nanos());
        self.last
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}
