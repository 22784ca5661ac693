use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

/// Invoke `operation` up to `max_attempts` times.
///
/// The operation receives its 1-based attempt number. A success returns
/// immediately. An error for which `is_retryable` holds is retried until the
/// attempt budget is spent and then returned unchanged; any other error is
/// returned on the attempt that produced it. Retries are immediate.
///
/// A `max_attempts` of zero is treated as one.
pub async fn auto_retry<T, E, F, Fut, P>(
    name: &str,
    max_attempts: u32,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(operation = name, attempt, max_attempts, "Attempting operation");
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt < max_attempts => {
                warn!(
                    operation = name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "🔄 Retryable failure, trying again"
                );
                attempt += 1;
            }
            Err(err) => {
                warn!(operation = name, attempt, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}
