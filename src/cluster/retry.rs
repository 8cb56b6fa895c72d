//! Retry-with-backoff wrapper used by every idempotent Cluster Gateway call.
//!
//! §4.1: "up to 5 tries, initial delay 1 s, multiplier 1 (configurable)".
//! `backoff::ExponentialBackoff` drives the delay schedule; the try count is
//! enforced here since the crate's own `max_elapsed_time` is a wall-clock
//! bound, not a count.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;

use super::error::ClusterError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_tries: 5,
            initial_interval: Duration::from_secs(1),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// Retries `op` up to `policy.max_tries` times, sleeping the backoff's
/// computed interval between attempts. `op` decides per-error whether a
/// failure is retryable by returning `Err(backoff::Error::transient)` vs
/// `Err(backoff::Error::permanent)` through the returned `ClusterError`;
/// here every `ClusterError::Transport` is treated as transient and
/// everything else as permanent, matching "the exception class captured
/// and logged" from §4.1.
pub async fn retry_transport<F, Fut, T>(policy: RetryPolicy, mut op: F) -> Result<T, ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClusterError>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(ClusterError::Transport(msg)) if attempt < policy.max_tries => {
                let delay = backoff.next_backoff().unwrap_or(policy.initial_interval);
                tracing::warn!(attempt, %msg, ?delay, "transport error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
