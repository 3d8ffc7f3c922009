use crate::config::RetryPolicy;
use std::future::Future;
use tokio::time::sleep;

/// Runs `operation` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between failed attempts. Returns the last error once attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(op = op_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::error!(
                    op = op_name,
                    attempt,
                    error = %err,
                    "Operation failed after max attempts"
                );
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
