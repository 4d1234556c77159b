//! Retry of transient data source failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use questline_core::error::SourceError;

use crate::config::RetryPolicy;

/// Backoff for `attempt` plus random jitter up to `policy.jitter_ms`.
pub fn delay_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let jitter = if policy.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=policy.jitter_ms)
    } else {
        0
    };
    policy.backoff(attempt) + Duration::from_millis(jitter)
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts are used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = delay_for(policy, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient data source failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
