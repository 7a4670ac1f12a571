use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Longest single pause between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Bounded exponential backoff for printer requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Seconds; retry `n` waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(31) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
    }
}

/// Run `action` until it succeeds, the error is not retryable, or the policy
/// is exhausted. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let mut retry = 0u32;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if retry >= policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }
                retry += 1;
                let delay = policy.delay_for(retry);
                debug!(retry, delay_ms = delay.as_millis() as u64, error = %err, "Retrying request");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
