//! Retry policy for model backend calls.
//!
//! One immutable policy is attached uniformly to every model call made by
//! every stage, including calls made on behalf of delegates. A failure is
//! retried only when it carries a status code the policy lists and fewer
//! than `max_attempts` calls have been made.

use crate::errors::{BackendError, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of calls, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Status codes that are eligible for retry.
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: BTreeSet<u16>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    7.0
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [429, 500, 503, 504].into_iter().collect()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts remain.
    GiveUp,
    /// The failure is not eligible for retry.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates a new retry policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replaces the retryable status codes.
    #[must_use]
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Checks the policy's invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero or `backoff_base` is not
    /// a finite number of at least 1.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::new("Retry max_attempts must be at least 1")
                .with_keys(vec!["max_attempts".to_string()]));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(ConfigurationError::new(format!(
                "Retry backoff_base must be a finite number >= 1, got {}",
                self.backoff_base
            ))
            .with_keys(vec!["backoff_base".to_string()]));
        }
        Ok(())
    }

    /// Returns true if a failure with `status_code` should be retried after
    /// `attempt` calls have been made.
    #[must_use]
    pub fn should_retry(&self, status_code: u16, attempt: u32) -> bool {
        self.retryable_status_codes.contains(&status_code) && attempt < self.max_attempts
    }

    /// Returns the delay before the retry that follows call number `attempt`.
    ///
    /// `initial_delay * backoff_base^(attempt - 1)`, capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_base.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Decides what to do after call number `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, error: &BackendError, attempt: u32) -> RetryDecision {
        let Some(status_code) = error.status_code() else {
            return RetryDecision::NotRetryable;
        };
        if !self.retryable_status_codes.contains(&status_code) {
            return RetryDecision::NotRetryable;
        }
        if self.should_retry(status_code, attempt) {
            RetryDecision::Retry(self.delay_for(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Runs `operation`, retrying failures as the policy allows.
    ///
    /// The last failure is returned unchanged once the policy gives up or
    /// the failure is not retryable.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.decide(&error, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying model call after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    debug!(operation = label, attempt, error = %error, "Retry attempts exhausted");
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    debug!(operation = label, attempt, error = %error, "Failure is not retryable");
                    return Err(error);
                }
            }
        }
    }
}
