//! Retry logic with exponential backoff
//!
//! This module provides the retry policy shared by the index walker and the
//! fetch scheduler: classification of transient errors, the exponential
//! backoff schedule with an upper cap, and optional jitter to prevent
//! thundering herd against a recovering remote.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, 429, 5xx, failed local persist)
/// should return `true`. Permanent failures (bad configuration, 404, database
/// errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors are retryable when they are timeouts or
            // connection-level failures
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // Rate limiting and server-side failures are transient
            Error::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            // The remote copy is intact; only the local persist failed
            Error::WriteFailed { .. } => true,
            // A truncated index download produces an unreadable archive
            Error::IndexArchive(_) => true,
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Everything else is permanent for the operation that raised it
            Error::Config { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::IndexUnavailable { .. }
            | Error::FetchExhausted { .. }
            | Error::Serialization(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Delay before retry attempt number `attempt` (0-based)
///
/// Exponential growth from `backoff_base` by `backoff_multiplier`, capped at
/// `backoff_cap`, with up to +100% uniform jitter when enabled. The jittered
/// delay may exceed the cap by at most the cap itself.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.backoff_multiplier.powi(attempt.min(63) as i32);
    let raw = Duration::from_secs_f64(config.backoff_base.as_secs_f64() * exp);
    let capped = raw.min(config.backoff_cap);
    if config.jitter { add_jitter(capped) } else { capped }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, base/cap delays, multiplier, jitter)
/// * `operation` - Async closure returning `Result<T, E>` where `E` implements [`IsRetryable`]
///
/// # Returns
///
/// The successful result, or the last error once the budget is exhausted or a
/// non-retryable error occurs.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
