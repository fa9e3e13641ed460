use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gnmi_telemetry::constants::CONFIG_DB;
use gnmi_telemetry::constants::FEATURE_ENABLED;
use gnmi_telemetry::constants::FEATURE_STATUS_FIELD;
use gnmi_telemetry::constants::FEATURE_TELEMETRY_KEY;
use gnmi_telemetry::constants::TELEMETRY_CERTS_KEY;
use gnmi_telemetry::constants::TELEMETRY_GNMI_KEY;
use gnmi_telemetry::metrics;
use gnmi_telemetry::open_store;
use gnmi_telemetry::start_rpc_server;
use gnmi_telemetry::Error;
use gnmi_telemetry::GnmiTableOverrides;
use gnmi_telemetry::Result;
use gnmi_telemetry::ServerBuilder;
use gnmi_telemetry::StoreHandle;
use gnmi_telemetry::TelemetryConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const LOG_DIR_ENV: &str = "TELEMETRY_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "./logs";
const LOG_FILE: &str = "telemetry.log";

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let log_dir = env::var(LOG_DIR_ENV).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));

    // Initializing Logs
    let _guard = init_observability(&log_dir)?;

    // Validation waits for the config database overlay, only the store must be usable now
    let config = TelemetryConfig::new()?;
    config.store.validate()?;
    let store = open_store(&config.store).await?;

    if !telemetry_feature_enabled(&store).await? {
        return Ok(());
    }
    let config = apply_config_db_overlay(config, &store).await?.validate()?;
    info!(?config, "Configuration loaded");

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if config.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(config.monitoring.prometheus_port, graceful_rx.clone()));
    }

    let server = ServerBuilder::new(config.clone(), store, graceful_rx.clone())
        .build()
        .ready()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = start_rpc_server(server, &config, graceful_rx).await {
        error!("gNMI server stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

/// `FEATURE|telemetry` gates the whole process; a missing entry counts as enabled
async fn telemetry_feature_enabled(store: &StoreHandle) -> Result<bool> {
    let status = store
        .reader
        .get_field(CONFIG_DB, FEATURE_TELEMETRY_KEY, FEATURE_STATUS_FIELD)
        .await?;

    match status.as_deref() {
        None => {
            warn!("{} not found in {}, starting anyway", FEATURE_TELEMETRY_KEY, CONFIG_DB);
            Ok(true)
        }
        Some(FEATURE_ENABLED) => Ok(true),
        Some(other) => {
            info!(status = other, "Telemetry feature is not enabled, exiting");
            Ok(false)
        }
    }
}

async fn apply_config_db_overlay(
    config: TelemetryConfig,
    store: &StoreHandle,
) -> Result<TelemetryConfig> {
    let gnmi = store.reader.get_entry(CONFIG_DB, TELEMETRY_GNMI_KEY).await?.unwrap_or_default();
    let certs = store.reader.get_entry(CONFIG_DB, TELEMETRY_CERTS_KEY).await?.unwrap_or_default();

    let overrides = GnmiTableOverrides::from_fields(&gnmi, &certs)?;
    if overrides.is_empty() {
        return Ok(config);
    }
    info!(?overrides, "Applying config database overrides");
    overrides.apply(config)
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("SIGTERM handler: {}", e)))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir).map_err(|e| Error::Fatal(format!("failed to create log dir {:?}: {}", log_dir, e)))?;
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter());
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(env_filter());

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();

    Ok(guard)
}
