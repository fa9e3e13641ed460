//! Server Frontend
//!
//! [`TelemetryServer`] is the transport independent entry point. GET is one
//! bounded read with no session behind it; SUBSCRIBE creates a [`Session`],
//! registers it with the dispatcher and hands back a [`SessionStream`]. The
//! gRPC service in `network` only converts between wire messages and the
//! types used here.

mod builder;
mod session_stream;

pub use builder::*;
pub use session_stream::*;


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::constants::GNMI_VERSION;
use crate::constants::OTHERS_TARGET;
use crate::constants::POLL_QUEUE_DEPTH;
use crate::metrics::GET_REQUESTS;
use crate::metrics::REJECTED_REQUESTS;
use crate::utils::time::get_now_as_nanos;
use crate::DispatcherHandle;
use crate::Error;
use crate::PathResolver;
use crate::ResolveError;
use crate::ResolvedPath;
use crate::Result;
use crate::Session;
use crate::SessionError;
use crate::StoreError;
use crate::SubscribeMode;
use crate::SubscriptionRequest;
use crate::TelemetryConfig;
use crate::TelemetryRequest;
use crate::UpdateEvent;
use crate::ValueReader;
use crate::VersionInfo;

/// What the server advertises through `Capabilities`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Catalog databases followed by the virtual targets
    pub targets: Vec<String>,
    pub build_version: String,
    pub gnmi_version: &'static str,
}

/// Result of [`TelemetryServer::handle`], one variant per request kind
pub enum TelemetryResponse {
    Get(Vec<UpdateEvent>),
    Subscribe(SessionStream),
}

pub struct TelemetryServer {
    resolver: PathResolver,
    reader: ValueReader,
    dispatcher: DispatcherHandle,
    version: Arc<VersionInfo>,
    get_timeout: Duration,
    outbound_buffer: usize,
    default_sample_interval: Duration,
}

impl std::fmt::Debug for TelemetryServer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TelemetryServer")
            .field("resolver", &self.resolver)
            .field("active_sessions", &self.dispatcher.active_count())
            .field("get_timeout", &self.get_timeout)
            .finish()
    }
}

impl TelemetryServer {
    pub(crate) fn new(
        resolver: PathResolver,
        reader: ValueReader,
        dispatcher: DispatcherHandle,
        version: Arc<VersionInfo>,
        config: &TelemetryConfig,
    ) -> Self {
        Self {
            resolver,
            reader,
            dispatcher,
            version,
            get_timeout: Duration::from_millis(config.server.get_timeout_ms),
            outbound_buffer: config.dispatcher.outbound_buffer,
            default_sample_interval: config.dispatcher.default_sample_interval(),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    /// Budget of one GET, resolution included
    pub fn get_timeout(&self) -> Duration {
        self.get_timeout
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut targets = self.resolver.catalog().names();
        targets.push(OTHERS_TARGET.to_string());
        Capabilities {
            targets,
            build_version: self.version.build_version().to_string(),
            gnmi_version: GNMI_VERSION,
        }
    }

    /// Reads the current value of `xpath` on `target`.
    ///
    /// Resolution and the read share one `get_timeout_ms` budget; running out
    /// of it fails with `StoreError::Unavailable`.
    pub async fn get(
        &self,
        target: &str,
        xpath: &str,
    ) -> Result<UpdateEvent> {
        let read = async {
            let path = self.resolver.resolve(xpath, target).await?;
            self.read_path(&path).await
        };
        let result = match timeout(self.get_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(self.get_timed_out(target, xpath)),
        };
        record_get(&result);
        result
    }

    /// Dispatches a tagged request
    pub async fn handle(
        &self,
        request: TelemetryRequest,
    ) -> Result<TelemetryResponse> {
        match request {
            TelemetryRequest::Get(get) => {
                let reads = async {
                    let mut updates = Vec::with_capacity(get.paths.len());
                    for path in &get.paths {
                        updates.push(self.read_path(path).await?);
                    }
                    Ok(updates)
                };
                let result = match timeout(self.get_timeout, reads).await {
                    Ok(result) => result,
                    Err(_) => {
                        let xpaths: Vec<String> = get.paths.iter().map(|p| p.xpath()).collect();
                        let target = get.paths.first().map(|p| p.target.as_str()).unwrap_or_default();
                        Err(self.get_timed_out(target, &xpaths.join(",")))
                    }
                };
                record_get(&result);
                result.map(TelemetryResponse::Get)
            }
            TelemetryRequest::Subscribe(request) => self.subscribe(request).await.map(TelemetryResponse::Subscribe),
        }
    }

    /// Starts a session for an already validated request.
    ///
    /// POLL sessions come with a [`Poller`] on the returned stream.
    pub async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SessionStream> {
        let mode = request.mode();
        let paths = request.entries().len();
        let (poller, poll_rx) = match mode {
            SubscribeMode::Poll => {
                let (tx, rx) = mpsc::channel(POLL_QUEUE_DEPTH);
                (Some(Poller::new(tx)), Some(rx))
            }
            SubscribeMode::Stream | SubscribeMode::Once => (None, None),
        };

        let session = Session::new(self.dispatcher.next_session_id(), request, self.default_sample_interval);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_buffer);
        let control = match self.dispatcher.register(session, outbound_tx, poll_rx).await {
            Ok(control) => control,
            Err(e) => {
                record_rejection(&e);
                return Err(e);
            }
        };

        info!(
            session_id = %control.id,
            mode = mode.as_str(),
            paths,
            "Subscription accepted"
        );
        Ok(SessionStream::new(control, outbound_rx, poller))
    }

    async fn read_path(
        &self,
        path: &ResolvedPath,
    ) -> Result<UpdateEvent> {
        let value = self.reader.read(&path.source).await?;
        let value = value.ok_or_else(|| ResolveError::PathNotFound {
            target: path.target.clone(),
            path: path.xpath(),
        })?;
        debug!(target = %path.target, path = %path.xpath(), "GET served");

        Ok(UpdateEvent {
            target: path.target.clone(),
            path: path.elems.clone(),
            value: Some(value),
            timestamp: get_now_as_nanos(),
        })
    }

    pub(crate) fn get_timed_out(
        &self,
        target: &str,
        xpath: &str,
    ) -> Error {
        warn!(target = %target, path = xpath, timeout = ?self.get_timeout, "GET timed out");
        StoreError::Unavailable(format!("GET {} timed out after {:?}", xpath, self.get_timeout)).into()
    }
}

/// Counts a finished GET by outcome
pub(crate) fn record_get<T>(result: &Result<T>) {
    record_get_outcome(result.as_ref().err());
}

pub(crate) fn record_get_outcome(err: Option<&Error>) {
    let status = match err {
        None => "ok",
        Some(Error::Resolve(ResolveError::PathNotFound { .. })) => "not_found",
        Some(Error::Resolve(_)) | Some(Error::Session(_)) => "invalid",
        Some(Error::Store(_)) => "unavailable",
        Some(_) => "error",
    };
    GET_REQUESTS.with_label_values(&[status]).inc();
}

/// Counts a SUBSCRIBE refused before its session started
pub(crate) fn record_rejection(err: &Error) {
    let reason = match err {
        Error::Session(SessionError::TooManySessions(_)) => "too_many_sessions",
        Error::Session(SessionError::InvalidInterval(_)) => "invalid_interval",
        Error::Session(_) => "invalid_request",
        Error::Resolve(_) => "invalid_path",
        Error::Store(_) => "store_unavailable",
        _ => "unavailable",
    };
    debug!(reason, "subscription rejected: {}", err);
    REJECTED_REQUESTS.with_label_values(&[reason]).inc();
}
