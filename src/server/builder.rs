//! Assembles a [`TelemetryServer`] out of a loaded configuration and an
//! opened store.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let server = ServerBuilder::new(config, store, shutdown_rx)
//!     .build()
//!     .ready()?;
//! ```
//!
//! `build()` spawns the dispatcher loop, so it must run inside a tokio runtime.
//! The dispatcher stops, and cancels every session, when the shutdown channel
//! fires or its sender is dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::TelemetryServer;
use crate::DatabaseCatalog;
use crate::Dispatcher;
use crate::NetworkError;
use crate::PathResolver;
use crate::Result;
use crate::StoreHandle;
use crate::TelemetryConfig;
use crate::ValueReader;
use crate::VersionInfo;

pub struct ServerBuilder {
    config: TelemetryConfig,
    store: StoreHandle,
    shutdown_signal: watch::Receiver<()>,
    version: Option<Arc<VersionInfo>>,
    server: Option<Arc<TelemetryServer>>,
}

impl ServerBuilder {
    pub fn new(
        config: TelemetryConfig,
        store: StoreHandle,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store,
            shutdown_signal,
            version: None,
            server: None,
        }
    }

    /// Overrides the version info otherwise loaded from `store.version_file`
    pub fn version(
        mut self,
        version: Arc<VersionInfo>,
    ) -> Self {
        self.version = Some(version);
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn build(mut self) -> Self {
        let catalog = Arc::new(DatabaseCatalog::from_config(&self.config.store.databases));
        let version = match self.version.take() {
            Some(version) => version,
            None => Arc::new(VersionInfo::load(&self.config.store.version_file)),
        };
        let retry = self.config.retry.store_read;

        let resolver = PathResolver::new(catalog, self.store.reader.clone(), retry);
        let reader = ValueReader::new(self.store.reader.clone(), version.clone(), retry);

        let (dispatcher, handle) = Dispatcher::new(
            reader.clone(),
            &self.config.dispatcher,
            self.config.server.max_sessions,
            self.shutdown_signal.clone(),
        );
        tokio::spawn(dispatcher.run());

        info!(
            build_version = version.build_version(),
            max_sessions = self.config.server.max_sessions,
            "Telemetry server built"
        );
        self.server = Some(Arc::new(TelemetryServer::new(
            resolver,
            reader,
            handle,
            version,
            &self.config,
        )));
        self
    }

    /// Returns the built server
    ///
    /// # Errors
    /// `NetworkError::ServerUnavailable` if `build()` was not called
    pub fn ready(self) -> Result<Arc<TelemetryServer>> {
        self.server
            .ok_or_else(|| NetworkError::ServerUnavailable("server was not built".into()).into())
    }
}
