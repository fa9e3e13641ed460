use std::net::SocketAddr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::TELEMETRY_PORT;
use crate::Error;
use crate::Result;

/// gRPC listener parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address the gNMI service binds to
    /// Default: "0.0.0.0:50051"
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound for a single GET, store retries included
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,

    /// Maximum number of concurrently registered subscription sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Max concurrent requests per connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            get_timeout_ms: default_get_timeout_ms(),
            max_sessions: default_max_sessions(),
            concurrency_limit: default_concurrency_limit(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "invalid listen_address '{}': {}",
                self.listen_address, e
            )))
        })
    }

    /// Replaces the port of `listen_address`, keeping the host part
    pub fn set_port(
        &mut self,
        port: u16,
    ) -> Result<()> {
        let mut addr = self.socket_addr()?;
        addr.set_port(port);
        self.listen_address = addr.to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.get_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "get_timeout_ms must be greater than 0".into(),
            )));
        }

        if self.max_sessions == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_sessions must be greater than 0".into(),
            )));
        }

        if self.concurrency_limit == 0 {
            return Err(Error::Config(ConfigError::Message(
                "concurrency_limit must be greater than 0".into(),
            )));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "http2_keep_alive_timeout_in_secs ({}) must be less than http2_keep_alive_interval_in_secs ({})",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        Ok(())
    }
}

fn default_listen_address() -> String {
    format!("0.0.0.0:{}", TELEMETRY_PORT)
}
fn default_get_timeout_ms() -> u64 {
    2000
}
fn default_max_sessions() -> usize {
    1024
}
fn default_concurrency_limit() -> usize {
    256
}
fn default_tcp_keepalive() -> u64 {
    3600
}
fn default_h2_keepalive_interval() -> u64 {
    300
}
fn default_h2_keepalive_timeout() -> u64 {
    20
}
fn default_tcp_nodelay() -> bool {
    true
}
