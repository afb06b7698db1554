//! Backoff for files held by foreground operations.
//!
//! A rescatter that cannot take a file's lock in time fails with
//! `LockTimeout`. Only that error is worth repeating; anything else would
//! read the same cells and fail the same way.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use dimvault_common::{Error, Result};

/// Backoff schedule for busy files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub delay_cap: Duration,
    /// Growth factor from one retry to the next.
    pub growth: f64,
    /// Spread every delay uniformly over 75-125 % of its nominal value.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(200),
            delay_cap: Duration::from_secs(30),
            growth: 2.0,
            jitter: true,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_delay_cap(mut self, cap: Duration) -> Self {
        self.delay_cap = cap;
        self
    }

    pub fn with_growth(mut self, growth: f64) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry `retry` (0-based), ignoring jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let grown = self.base_delay.as_secs_f64() * self.growth.max(1.0).powi(retry as i32);
        Duration::from_secs_f64(grown.min(self.delay_cap.as_secs_f64()))
    }

    /// Delay before retry `retry`, jittered if enabled.
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if !self.jitter {
            return nominal;
        }
        nominal.mul_f64(0.75 + rand::random::<f64>() * 0.5)
    }

    /// Delays of all retries, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|retry| self.delay(retry))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs an operation under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, backing off while it fails with a transient error.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_if(operation, Error::is_transient).await
    }

    /// Run `operation`, backing off while `retryable` accepts its error.
    ///
    /// The last error is returned once the schedule is used up.
    pub async fn execute_if<F, Fut, T, P>(&self, mut operation: F, retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut delays = self.config.schedule();
        let mut retries = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "Succeeded after backing off");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            if !retryable(&err) {
                return Err(err);
            }
            let Some(delay) = delays.next() else {
                warn!(retries, error = %err, "Retries exhausted");
                return Err(err);
            };
            retries += 1;
            debug!(retry = retries, ?delay, error = %err, "Backing off");
            sleep(delay).await;
        }
    }
}
