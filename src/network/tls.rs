//! TLS material for the gNMI listener
//!
//! With `client_auth` the CA at `ca_certificate_path` is installed as client
//! root: rustls then refuses the handshake of any client that does not present
//! a certificate signed by it, before a single RPC is decoded.

use std::fs;
use std::path::Path;

use rcgen::generate_simple_self_signed;
use rcgen::CertifiedKey;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::ServerTlsConfig;
use tracing::info;
use tracing::warn;

use crate::NetworkError;
use crate::Result;
use crate::TlsConfig;

/// Names the generated development certificate is valid for
const SELF_SIGNED_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

pub fn server_tls_config(tls: &TlsConfig) -> Result<ServerTlsConfig> {
    if tls.generate_self_signed_certificates {
        if Path::new(&tls.server_certificate_path).exists() && Path::new(&tls.server_private_key_path).exists() {
            warn!(
                "Server certificate already exists, remove {} to generate a new one. Skipping self signed certificate generation.",
                tls.server_certificate_path
            );
        } else {
            info!("Generating self signed certificates");
            generate_self_signed_certificates(&tls.server_certificate_path, &tls.server_private_key_path)?;
        }
    }

    let cert = read_pem(&tls.server_certificate_path, "server certificate")?;
    let key = read_pem(&tls.server_private_key_path, "server private key")?;
    let config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if tls.client_auth {
        let ca = read_pem(&tls.ca_certificate_path, "CA certificate")?;
        info!("gNMI TLS enabled, client certificates required");
        Ok(config.client_ca_root(Certificate::from_pem(ca)))
    } else {
        info!("gNMI TLS enabled");
        Ok(config)
    }
}

/// Writes a self signed certificate and its private key as PEM
pub fn generate_self_signed_certificates(
    cert_path: &str,
    key_path: &str,
) -> Result<()> {
    let names: Vec<String> = SELF_SIGNED_NAMES.iter().map(|n| n.to_string()).collect();
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(names).map_err(|e| NetworkError::Tls(format!("certificate generation failed: {}", e)))?;

    write_pem(cert_path, &cert.pem())?;
    write_pem(key_path, &key_pair.serialize_pem())?;
    Ok(())
}

fn read_pem(
    path: &str,
    description: &str,
) -> Result<String> {
    fs::read_to_string(path).map_err(|e| NetworkError::Tls(format!("failed to read {} {}: {}", description, path, e)).into())
}

fn write_pem(
    path: &str,
    content: &str,
) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| NetworkError::Tls(format!("failed to create {:?}: {}", parent, e)))?;
        }
    }
    fs::write(path, content).map_err(|e| NetworkError::Tls(format!("failed to write {}: {}", path, e)).into())
}
