//! Overlay of the `TELEMETRY|gnmi` and `TELEMETRY|certs` config database hashes.
//!
//! The hashes are read once when the server starts; later edits only take effect
//! after a restart.

use config::ConfigError;
use tracing::info;

use super::TelemetryConfig;
use crate::Error;
use crate::FieldMap;
use crate::Result;

/// Values found in the config database, each one optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnmiTableOverrides {
    pub port: Option<u16>,
    pub client_auth: Option<bool>,
    pub ca_crt: Option<String>,
    pub server_crt: Option<String>,
    pub server_key: Option<String>,
}

impl GnmiTableOverrides {
    /// Merges both hashes; `TELEMETRY|certs` wins for certificate paths
    pub fn from_fields(
        gnmi: &FieldMap,
        certs: &FieldMap,
    ) -> Result<Self> {
        let port = match gnmi.get("port") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "TELEMETRY|gnmi port '{}' is not a valid port: {}",
                    raw, e
                )))
            })?),
            None => None,
        };

        let client_auth = match gnmi.get("client_auth") {
            Some(raw) => Some(parse_bool(raw)?),
            None => None,
        };

        let pick = |field: &str| -> Option<String> {
            certs
                .get(field)
                .or_else(|| gnmi.get(field))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            port,
            client_auth,
            ca_crt: pick("ca_crt"),
            server_crt: pick("server_crt"),
            server_key: pick("server_key"),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the overlay on top of a loaded configuration.
    ///
    /// Providing both `server_crt` and `server_key` turns TLS on.
    pub fn apply(
        self,
        mut config: TelemetryConfig,
    ) -> Result<TelemetryConfig> {
        if let Some(port) = self.port {
            config.server.set_port(port)?;
        }
        if let Some(ca) = self.ca_crt {
            config.tls.ca_certificate_path = ca;
        }
        if let (Some(crt), Some(key)) = (self.server_crt, self.server_key) {
            config.tls.server_certificate_path = crt;
            config.tls.server_private_key_path = key;
            config.tls.enable_tls = true;
        }
        if let Some(client_auth) = self.client_auth {
            config.tls.client_auth = client_auth;
        }

        info!(
            listen_address = %config.server.listen_address,
            enable_tls = config.tls.enable_tls,
            client_auth = config.tls.client_auth,
            "Applied TELEMETRY|gnmi overrides"
        );
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::Config(ConfigError::Message(format!(
            "TELEMETRY|gnmi client_auth '{}' is not true/false",
            other
        )))),
    }
}
