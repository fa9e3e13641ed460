//! Streaming telemetry server speaking a subset of gNMI.
//!
//! ```text
//! gRPC (GnmiService)
//!   -> TelemetryServer  GET / SUBSCRIBE entry points
//!      -> PathResolver  target + xpath -> table/key/field or virtual path
//!      -> Dispatcher    one worker task per Session, SAMPLE / ON_CHANGE / ONCE / POLL
//!         -> ValueReader -> DataStore (memory | sled) + ChangeFeed
//! ```
//!
//! The binary in `main.rs` wires these together from a [`TelemetryConfig`];
//! tests and embedders can do the same through [`ServerBuilder`].

mod config;
pub mod constants;
mod dispatcher;
mod errors;
pub mod metrics;
mod network;
pub mod proto;
mod resolver;
mod server;
mod session;
mod store;
pub mod utils;

pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use network::*;
pub use resolver::*;
pub use server::*;
pub use session::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
