//! gRPC listener for the `gnmi.gNMI` service
//!
//! Wires [`GnmiService`] into a `tonic` server next to the standard health
//! service, with gzip in both directions, keepalives from [`ServerConfig`] and
//! optional (m)TLS from [`TlsConfig`]. The server stops when the shutdown watch
//! channel fires.
//!
//! [`ServerConfig`]: crate::ServerConfig
//! [`TlsConfig`]: crate::TlsConfig

mod convert;
mod gnmi_service;
mod tls;

pub use gnmi_service::*;
pub use tls::*;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tonic::codec::CompressionEncoding;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::proto::g_nmi_server::GNmiServer;
use crate::server::TelemetryServer;
use crate::NetworkError;
use crate::Result;
use crate::TelemetryConfig;

/// Binds `server.listen_address` and serves until shutdown
pub async fn start_rpc_server(
    server: Arc<TelemetryServer>,
    config: &TelemetryConfig,
    shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listen_address = config.server.socket_addr()?;
    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| NetworkError::ServerUnavailable(format!("failed to bind {}: {}", listen_address, e)))?;
    serve_with_listener(server, listener, config, shutdown_signal).await
}

/// Serves on an already bound listener, e.g. one on an ephemeral port
pub async fn serve_with_listener(
    server: Arc<TelemetryServer>,
    listener: TcpListener,
    config: &TelemetryConfig,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| NetworkError::ServerUnavailable(format!("listener has no local address: {}", e)))?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter.set_serving::<GNmiServer<GnmiService>>().await;

    let server_config = &config.server;
    let mut server_builder = Server::builder()
        .concurrency_limit_per_connection(server_config.concurrency_limit)
        .http2_keepalive_interval(Some(Duration::from_secs(
            server_config.http2_keep_alive_interval_in_secs,
        )))
        .http2_keepalive_timeout(Some(Duration::from_secs(
            server_config.http2_keep_alive_timeout_in_secs,
        )));

    if config.tls.enable_tls {
        server_builder = server_builder
            .tls_config(server_tls_config(&config.tls)?)
            .map_err(NetworkError::Transport)?;
    } else {
        warn!("gNMI TLS disabled, serving plaintext");
    }

    // TCP options apply to accepted sockets only through the incoming stream
    let incoming = TcpIncoming::from_listener(
        listener,
        server_config.tcp_nodelay,
        Some(Duration::from_secs(server_config.tcp_keepalive_in_secs)),
    )
    .map_err(|e| NetworkError::ServerUnavailable(format!("failed to accept on {}: {}", local_addr, e)))?;

    info!(%local_addr, tls = config.tls.enable_tls, client_auth = config.tls.client_auth, "gNMI server listening");

    if let Err(e) = server_builder
        .add_service(health_service)
        .add_service(
            GNmiServer::new(GnmiService::new(server))
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal.changed().map(move |_| {
                warn!("Stopping gNMI server. {}", local_addr);
            }),
        )
        .await
    {
        error!("gNMI server stopped with error: {:?}", e);
        return Err(NetworkError::Transport(e).into());
    }
    debug!("gNMI service finished");
    Ok(())
}
