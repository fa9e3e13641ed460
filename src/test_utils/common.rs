use tracing_subscriber::EnvFilter;

use crate::BackoffPolicy;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Retry policy that fails fast, for tests exercising store failures
pub fn fast_retry() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 2,
        timeout_ms: 50,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}
