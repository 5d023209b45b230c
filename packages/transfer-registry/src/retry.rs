//! Retry with exponential backoff for backend calls
//!
//! Only transport failures are retried. Contract rejections and reverts are
//! returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// How an RPC error message should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network trouble, rate limiting, node unavailable
    Transient,
    /// The EVM executed and reverted
    Revert,
    Unknown,
}

/// Classify a raw RPC error message
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("revert") || error_lower.contains("ownable:") {
        return ErrorClass::Revert;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    op_name: &str,
    mut operation: F,
) -> BackendResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = op_name, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && config.should_retry(attempt) => {
                let backoff = config.backoff_for_attempt(attempt);
                warn!(
                    operation = op_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(operation = op_name, attempts = attempt + 1, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Turn an error message from the RPC layer into a [`BackendError`]
pub fn transport_or_revert(message: String) -> BackendError {
    match classify_error(&message) {
        ErrorClass::Revert => BackendError::Reverted { reason: message },
        ErrorClass::Transient | ErrorClass::Unknown => BackendError::Transport(message),
    }
}
