//! Bounded retry with exponential backoff for network-backed drivers.
//!
//! Every network driver owns a [`RetryPolicy`] value and routes each
//! backend call through [`RetryPolicy::run`]. Only errors accepted by the
//! policy's predicate are retried; by default that is
//! [`AssetError::is_transient`], so `ObjectNotFound` fails immediately.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::error::AssetError;

/// Decides whether an error is worth another attempt.
pub type RetryPredicate = fn(&AssetError) -> bool;

/// Retry configuration passed into each driver instance.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Retryable-error predicate.
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            retryable: AssetError::is_transient,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Replace the retryable-error predicate.
    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay after the given failed attempt (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying retryable failures. The last error is returned unchanged.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, AssetError>
    where
        F: FnMut() -> Result<T, AssetError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_attempts || !(self.retryable)(&error) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
