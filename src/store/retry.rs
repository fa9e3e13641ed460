use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use super::StoreResult;
use crate::metrics::STORE_READ_FAILURES;
use crate::BackoffPolicy;
use crate::StoreError;

/// Runs a store read under a per-attempt deadline, retrying transient
/// failures with exponential backoff.
///
/// Non transient errors (codec, unknown database) are returned immediately.
/// Once `policy.max_retries` attempts are spent the last error is returned.
pub(crate) async fn read_with_retry<F, T, U>(
    db: &str,
    mut task: F,
    policy: BackoffPolicy,
) -> StoreResult<U>
where
    F: FnMut() -> T,
    T: Future<Output = StoreResult<U>>,
{
    let mut retries = 0;
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let max_retries = policy.max_retries.max(1);

    let mut last_error = StoreError::Unavailable("read failed after max retries".to_string());
    while retries < max_retries {
        debug!("Store read attempt {} of {}", retries + 1, max_retries);
        match timeout(timeout_duration, task()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => {
                STORE_READ_FAILURES.with_label_values(&[db]).inc();
                return Err(e);
            }
            Ok(Err(e)) => {
                warn!(db, "Store read failed: {}", e);
                last_error = e;
            }
            Err(_) => {
                warn!(db, "Store read timed out after {:?}", timeout_duration);
                last_error = StoreError::Timeout(timeout_duration);
            }
        }
        STORE_READ_FAILURES.with_label_values(&[db]).inc();

        if retries < max_retries - 1 {
            debug!("Retrying in {:?}...", current_delay);
            sleep(current_delay).await;
            current_delay = (current_delay * 2).min(max_delay);
        }
        retries += 1;
    }
    warn!(db, "Store read failed after {} attempts", max_retries);
    Err(last_error)
}
