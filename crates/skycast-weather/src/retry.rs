//! Retry utilities for provider requests with linear backoff.
//!
//! Retried:
//! - Timeouts and connection failures
//! - 5xx server errors
//!
//! Never retried:
//! - 4xx client errors (bad requests, invalid keys, unknown locations)
//! - Cancelled requests
//! - Malformed responses

use std::future::Future;
use std::time::Duration;

use skycast_core::{ApiError, RetrySettings};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Base delay; attempt `n` waits `delay * n` before attempt `n + 1`
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts, settings.delay_ms)
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Wait after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Decide from the structured error, never from its message text.
pub fn classify(error: &ApiError) -> RetryDecision {
    if error.is_cancelled() {
        return RetryDecision::NoRetry;
    }
    if error.is_client_error() {
        tracing::debug!("Client error ({}), not retryable", error);
        return RetryDecision::NoRetry;
    }
    if error.is_retryable() {
        return RetryDecision::Retry;
    }
    RetryDecision::NoRetry
}

/// Run `operation` until it succeeds, fails permanently, or the attempts
/// run out. The last error is returned when attempts are exhausted.
///
/// Dropping the returned future abandons the loop, so a cancelled caller
/// never triggers another attempt.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("Request succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if classify(&e) == RetryDecision::NoRetry {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(e);
                }
                if attempt >= attempts {
                    tracing::error!("All {} attempts exhausted: {}", attempts, e);
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    "Retryable error on attempt {} of {}, waiting {:?}: {}",
                    attempt,
                    attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
