// -
// Well-known endpoints

/// Default gNMI listen port
pub const TELEMETRY_PORT: u16 = 50051;

pub const GNMI_VERSION: &str = "0.7.0";

// -
// Config database tables read once at start

pub const CONFIG_DB: &str = "CONFIG_DB";
pub const COUNTERS_DB: &str = "COUNTERS_DB";
pub const APPL_DB: &str = "APPL_DB";
pub const STATE_DB: &str = "STATE_DB";

/// gNMI listener parameters (`port`, `client_auth`, certificate paths)
pub const TELEMETRY_GNMI_KEY: &str = "TELEMETRY|gnmi";
/// Certificate paths (`ca_crt`, `server_crt`, `server_key`)
pub const TELEMETRY_CERTS_KEY: &str = "TELEMETRY|certs";
/// Feature gate consulted by the binary at boot
pub const FEATURE_TELEMETRY_KEY: &str = "FEATURE|telemetry";
pub const FEATURE_STATUS_FIELD: &str = "status";
pub const FEATURE_ENABLED: &str = "enabled";

// -
// Virtual targets

pub const OTHERS_TARGET: &str = "OTHERS";
pub const OSVERSION_BUILD: [&str; 2] = ["osversion", "build"];
pub const BUILD_VERSION_FIELD: &str = "build_version";

// -
// Name maps translating element names into counter object ids

pub const COUNTERS_TABLE: &str = "COUNTERS";
pub const COUNTERS_PORT_NAME_MAP: &str = "COUNTERS_PORT_NAME_MAP";
pub const COUNTERS_QUEUE_NAME_MAP: &str = "COUNTERS_QUEUE_NAME_MAP";

/// Terminal marker sent when a session reaches its update_count
pub(crate) const MAX_UPDATE_COUNT_REACHED: &str = "Max update count reached";

/// Poll requests queued ahead of a POLL session's worker
pub(crate) const POLL_QUEUE_DEPTH: usize = 16;
