//! Retry with exponential backoff.
//!
//! The delay before retry `n` (counting from zero) is `base * 2^n`, capped at
//! `max_delay`. With jitter enabled the actual sleep is drawn uniformly from
//! `0..=delay`. Every attempt runs under its own deadline; a missed deadline
//! counts as a transient failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{Result, UpstreamError};

/// How a call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Draw each delay uniformly from `0..=delay`.
    pub jitter: bool,
    /// Deadline applied to every attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the retry count.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Un-jittered delay before retry `retry` (zero-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay actually slept before retry `retry`, jitter applied.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = self.delay_for_retry(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Runs `op` until it succeeds, fails permanently, or retries run out.
///
/// Only errors for which [`UpstreamError::is_retryable`] holds are retried.
/// The error of the last attempt is returned.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;

    loop {
        let outcome = match timeout(policy.attempt_timeout, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UpstreamError::Timeout {
                timeout_ms: policy.attempt_timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(value) => {
                if retry > 0 {
                    debug!(retries = retry, "upstream call succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                let delay = policy.backoff(retry);
                warn!(
                    error = %e,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    "upstream call failed, retrying"
                );
                sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
