//! Telemetry Server Error Hierarchy
//!
//! Errors are grouped by the layer that raises them. Request validation errors
//! (`Resolve`, `Session`) are returned synchronously before any session exists.
//! Store errors are transient and only surface after the retry budget is spent.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;
use tonic::Status;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Target or xpath could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Subscription request rejected or illegal session transition
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Data store read failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transport, TLS and listener failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),

    #[error("{0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Target is neither a catalog database nor a virtual namespace
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Malformed xpath (empty segments, too many elements, unknown virtual path)
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Well formed path with no data behind it
    #[error("Path '{path}' not found in {target}")]
    PathNotFound { target: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// SAMPLE requested with a zero interval
    #[error("Invalid interval for SAMPLE subscription on '{0}': interval must be > 0")]
    InvalidInterval(String),

    #[error("Subscription list contains no paths")]
    EmptySubscription,

    #[error("Unsupported subscription mode value {0}")]
    UnsupportedMode(i32),

    #[error("Unsupported encoding value {0}, expected JSON or JSON_IETF")]
    UnsupportedEncoding(i32),

    #[error("First message on a Subscribe stream must be a SubscriptionList")]
    MissingSubscriptionList,

    #[error("Illegal session transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Session limit of {0} reached")]
    TooManySessions(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend temporarily unable to serve reads
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A single read exceeded its deadline
    #[error("Store read timed out after {0:?}")]
    Timeout(Duration),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    Backend(#[from] sled::Error),

    /// Value (de)serialization failures
    #[error(transparent)]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Errors worth another attempt under the retry policy
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Listener could not be started or stopped unexpectedly
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// Certificate material could not be loaded or generated
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Resolve(ResolveError::PathNotFound { .. }) => Status::not_found(err.to_string()),
            Error::Resolve(e) => Status::invalid_argument(e.to_string()),
            Error::Session(SessionError::TooManySessions(n)) => {
                Status::resource_exhausted(format!("Session limit of {} reached", n))
            }
            Error::Session(e) => Status::invalid_argument(e.to_string()),
            Error::Store(e) => Status::unavailable(e.to_string()),
            other => Status::internal(other.to_string()),
        }
    }
}
