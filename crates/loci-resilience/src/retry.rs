//! Retry with exponential backoff and jitter.
//!
//! Retries only errors the `Retryable` classification marks transient;
//! permanent errors propagate immediately without delay.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use loci_core::config::RetryConfig;

use crate::error::Retryable;

/// Backoff policy for a retried call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempting after failure number `attempt` (0-based).
    ///
    /// `min(initial * multiplier^attempt, max)`, ± 20% jitter. Rate-limited
    /// failures are floored at `initial * multiplier` so an early 429 never
    /// retries on the shortest delay.
    pub fn delay_for(&self, attempt: u32, rate_limited: bool) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let mut delay = initial * self.backoff_multiplier.powi(attempt as i32);

        if rate_limited {
            let floor = initial * self.backoff_multiplier;
            delay = delay.max(floor);
        }

        delay = delay.min(self.max_delay.as_millis() as f64);

        if self.jitter {
            let factor = rand::rng().random_range(0.8..=1.2);
            delay *= factor;
        }

        Duration::from_millis(delay.round() as u64)
    }
}

/// Drive `op` to completion, retrying transient failures.
///
/// The call blocks for the cumulative backoff duration; after
/// `max_retries` re-attempts the last error is returned. Non-retryable
/// errors propagate on the first occurrence.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt, err.is_rate_limited());
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
