//! Configuration management for the telemetry server.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`TELEMETRY__SECTION__FIELD`)
//! - Config database overlay of the `TELEMETRY|gnmi` table, applied once at start
//! - Component-wise validation
mod dispatcher;
mod gnmi_table;
mod monitoring;
mod retry;
mod server;
mod store;
mod tls;
pub use dispatcher::*;
pub use gnmi_table::*;
pub use monitoring::*;
pub use retry::*;
pub use server::*;
pub use store::*;
pub use tls::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TELEMETRY";

/// Main configuration container for the telemetry server
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// gRPC listener parameters
    #[serde(default)]
    pub server: ServerConfig,
    /// TLS/SSL security configuration
    #[serde(default)]
    pub tls: TlsConfig,
    /// Data store backend and database catalog
    #[serde(default)]
    pub store: StoreConfig,
    /// Session scheduling parameters
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Retry policies for store access
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Metrics exporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for TelemetryConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("server", &self.server)
            .field("tls", &self.tls)
            .field("store_backend", &self.store.backend)
            .finish_non_exhaustive()
    }
}

impl TelemetryConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `TELEMETRY__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so callers can still apply `with_override_config()`
    /// or the config database overlay. Callers MUST call `validate()`.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/telemetry.toml");
    /// std::env::set_var("TELEMETRY__SERVER__MAX_SESSIONS", "64");
    /// let cfg = TelemetryConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Unparseable listen address
    /// - Zero timeouts or buffer sizes
    /// - Missing certificate files
    /// - Duplicate or malformed catalog entries
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.tls.validate()?;
        self.store.validate()?;
        self.dispatcher.validate()?;
        self.retry.validate()?;
        self.monitoring.validate(self.server.socket_addr()?.port())?;
        Ok(self)
    }
}
