//! Activity retry policy (§4.4 activity options): exponential backoff
//! bounded by a fixed attempt count, built on the `backoff` crate's
//! interval generator rather than hand-rolled doubling.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::config::WorkflowConfig;
use crate::domain::error::ActivityError;

pub struct ActivityRetryPolicy {
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl ActivityRetryPolicy {
    #[must_use]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_backoff_ms),
            max_interval: Duration::from_secs(config.max_backoff_secs),
            multiplier: config.backoff_multiplier,
            max_attempts: config.max_attempts,
        }
    }

    /// Run `operation` until it succeeds, a non-retryable error is
    /// returned, or `max_attempts` is exhausted.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, ActivityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let wait = backoff.next_backoff().unwrap_or(self.max_interval);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
