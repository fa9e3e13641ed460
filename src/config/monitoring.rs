use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::Error;
use crate::Result;

/// Prometheus exporter next to the gNMI listener.
///
/// The exporter serves `/metrics` on its own port; session, GET and
/// rejection counters are registered at startup either way.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// The exporter needs a fixed port of its own, distinct from `gnmi_port`.
    pub fn validate(
        &self,
        gnmi_port: u16,
    ) -> Result<()> {
        if !self.prometheus_enabled {
            debug!("metrics exporter disabled");
            return Ok(());
        }
        if self.prometheus_port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "monitoring.prometheus_port must be set when the metrics exporter is enabled".into(),
            )));
        }
        if self.prometheus_port == gnmi_port {
            return Err(Error::Config(ConfigError::Message(format!(
                "monitoring.prometheus_port {} is already taken by the gNMI listener",
                self.prometheus_port
            ))));
        }
        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    false
}

fn default_prometheus_port() -> u16 {
    8080
}
