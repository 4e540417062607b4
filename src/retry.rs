//! Retry logic
//!
//! Two policies live here:
//! - [`download_with_retry`]: exponential backoff with optional jitter, used
//!   for the one-shot content-length probe.
//! - [`StreamRetry`]: the fixed-delay policy a worker applies when its ranged
//!   connection drops mid-transfer.
//!
//! # Example
//!
//! ```no_run
//! use mirror_dl::retry::{IsRetryable, download_with_retry};
//! use mirror_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! download_with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{RetryConfig, SegmentConfig};
use crate::error::{Error, TransferError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, overloaded mirrors) return `true`.
/// Permanent failures (missing resource, malformed headers, disk errors) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            // 408 Request Timeout, 429 Too Many Requests and server-side errors
            TransferError::UnexpectedStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            TransferError::Stream(_) | TransferError::Timeout => true,
            TransferError::MissingLength
            | TransferError::InvalidContentRange(_)
            | TransferError::Write(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transfer(e) => e.is_retryable(),
            Error::Probe { source, .. } => source.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
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
            // Everything else needs a different request, more disk or a new digest
            Error::Config { .. }
            | Error::InvalidRequest(_)
            | Error::ChecksumMismatch { .. }
            | Error::Incomplete { .. }
            | Error::Cancelled
            | Error::ShuttingDown
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::FileCollision { .. } => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted. Non-retryable errors are returned immediately.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Fixed-delay retry budget for one worker's ranged connection
///
/// Counts consecutive failures; any attempt that writes bytes resets the
/// count. With no ceiling the worker retries until cancelled.
#[derive(Clone, Debug)]
pub struct StreamRetry {
    delay: Duration,
    ceiling: Option<u32>,
    consecutive: u32,
    total: u32,
}

impl StreamRetry {
    /// Policy built from the segment settings
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            delay: config.retry_delay,
            ceiling: config.max_stream_retries,
            consecutive: 0,
            total: 0,
        }
    }

    /// Register a failed attempt; `Some(delay)` to retry, `None` when the budget is spent
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive += 1;
        if self.ceiling.is_some_and(|max| self.consecutive > max) {
            return None;
        }
        self.total += 1;
        Some(self.delay)
    }

    /// Register that the current attempt wrote at least one byte
    pub fn record_progress(&mut self) {
        self.consecutive = 0;
    }

    /// Failures since the last progress
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Retries granted over the worker's lifetime
    pub fn total(&self) -> u32 {
        self.total
    }
}
