use std::fs;
use std::path::Path;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Enables TLS encryption for the gNMI channel
    /// Default: false (disabled)
    #[serde(default = "default_enable_tls")]
    pub enable_tls: bool,

    /// Generates self-signed certificates on startup when the files are absent
    /// Default: false (requires pre-provisioned certificates)
    #[serde(default = "default_generate_self_signed")]
    pub generate_self_signed_certificates: bool,

    /// Certificate Authority used to verify client certificates (`ca_crt`)
    /// Default: "/etc/sonic/telemetry/dsmsroot.cer"
    #[serde(default = "default_ca_path")]
    pub ca_certificate_path: String,

    /// Server certificate chain path in PEM format (`server_crt`)
    /// Default: "/etc/sonic/telemetry/streamingtelemetryserver.cer"
    #[serde(default = "default_server_cert_path")]
    pub server_certificate_path: String,

    /// Server private key path in PEM format (`server_key`)
    /// Default: "/etc/sonic/telemetry/streamingtelemetryserver.key"
    #[serde(default = "default_server_key_path")]
    pub server_private_key_path: String,

    /// Requires clients to present a certificate signed by the CA (`client_auth`)
    /// Default: false (server-side TLS only)
    #[serde(default = "default_client_auth")]
    pub client_auth: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable_tls: default_enable_tls(),
            generate_self_signed_certificates: default_generate_self_signed(),
            ca_certificate_path: default_ca_path(),
            server_certificate_path: default_server_cert_path(),
            server_private_key_path: default_server_key_path(),
            client_auth: default_client_auth(),
        }
    }
}

impl TlsConfig {
    /// Validates TLS configuration consistency and file existence
    /// # Errors
    /// Returns `Error::Config` when:
    /// - client_auth is enabled without base TLS
    /// - Required certificate files are missing or unreadable
    /// - A private key file does not look like PEM
    pub fn validate(&self) -> Result<()> {
        if self.client_auth && !self.enable_tls {
            return Err(Error::Config(ConfigError::Message(
                "client_auth requires enable_tls to be true".into(),
            )));
        }

        if !self.enable_tls {
            return Ok(());
        }

        // Missing server files are created at start
        if self.generate_self_signed_certificates {
            if self.client_auth {
                self.validate_cert_file(&self.ca_certificate_path, "CA certificate")?;
            }
            return Ok(());
        }

        self.validate_cert_file(&self.server_certificate_path, "server certificate")?;
        self.validate_key_file(&self.server_private_key_path, "server private key")?;

        if self.client_auth {
            self.validate_cert_file(&self.ca_certificate_path, "CA certificate")?;
        }

        Ok(())
    }

    fn validate_cert_file(
        &self,
        path: &str,
        description: &str,
    ) -> Result<()> {
        let content = self.read_file(path, description)?;
        if !content.contains("-----BEGIN CERTIFICATE-----") {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} at {} is not a PEM encoded certificate",
                description, path
            ))));
        }
        Ok(())
    }

    fn validate_key_file(
        &self,
        path: &str,
        description: &str,
    ) -> Result<()> {
        let content = self.read_file(path, description)?;
        if !content.contains("PRIVATE KEY-----") {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} at {} is not a PEM encoded private key",
                description, path
            ))));
        }
        Ok(())
    }

    fn read_file(
        &self,
        path: &str,
        description: &str,
    ) -> Result<String> {
        if !Path::new(path).exists() {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} file not found: {}",
                description, path
            ))));
        }
        fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "failed to read {} at {}: {}",
                description, path, e
            )))
        })
    }
}

fn default_enable_tls() -> bool {
    false
}
fn default_generate_self_signed() -> bool {
    false
}
fn default_ca_path() -> String {
    "/etc/sonic/telemetry/dsmsroot.cer".into()
}
fn default_server_cert_path() -> String {
    "/etc/sonic/telemetry/streamingtelemetryserver.cer".into()
}
fn default_server_key_path() -> String {
    "/etc/sonic/telemetry/streamingtelemetryserver.key".into()
}
fn default_client_auth() -> bool {
    false
}
