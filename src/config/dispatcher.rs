use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Session scheduling parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Per-session outbound queue depth; a full queue blocks the next emission
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Pending registrations accepted by the dispatcher loop
    #[serde(default = "default_registration_buffer")]
    pub registration_buffer: usize,

    /// Per-session change notification buffer; notifications coalesce when full
    #[serde(default = "default_watcher_buffer")]
    pub watcher_buffer: usize,

    /// Interval used for TARGET_DEFINED paths that resolve to sampling
    #[serde(default = "default_sample_interval_ms")]
    pub default_sample_interval_ms: u64,

    /// Outbound sends slower than this are logged as a slow consumer
    #[serde(default = "default_slow_consumer_warn_ms")]
    pub slow_consumer_warn_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            registration_buffer: default_registration_buffer(),
            watcher_buffer: default_watcher_buffer(),
            default_sample_interval_ms: default_sample_interval_ms(),
            slow_consumer_warn_ms: default_slow_consumer_warn_ms(),
        }
    }
}

impl DispatcherConfig {
    pub fn default_sample_interval(&self) -> Duration {
        Duration::from_millis(self.default_sample_interval_ms)
    }

    pub fn slow_consumer_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_consumer_warn_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("outbound_buffer", self.outbound_buffer),
            ("registration_buffer", self.registration_buffer),
            ("watcher_buffer", self.watcher_buffer),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{} must be greater than 0",
                    name
                ))));
            }
        }

        if self.default_sample_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "default_sample_interval_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_outbound_buffer() -> usize {
    64
}
fn default_registration_buffer() -> usize {
    1024
}
fn default_watcher_buffer() -> usize {
    16
}
fn default_sample_interval_ms() -> u64 {
    10_000
}
fn default_slow_consumer_warn_ms() -> u64 {
    1000
}
