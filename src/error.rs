//! Error types for mirror-dl
//!
//! This module provides error handling for the library, including:
//! - The job-level [`Error`] returned by every public operation
//! - [`TransferError`] for failures of a single HTTP range attempt
//! - Machine-readable error codes so observers can tell failure kinds apart

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mirror-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mirror-dl
///
/// Each variant carries enough context to explain why a job stopped.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "segment.retry_delay")
        key: Option<String>,
    },

    /// The download request itself is unusable (no mirrors, bad URL, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The length probe against the first mirror failed
    #[error("failed to determine content length from {url}: {source}")]
    Probe {
        /// Mirror that was probed
        url: String,
        /// Underlying transfer failure
        #[source]
        source: TransferError,
    },

    /// A single ranged transfer attempt failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// All bytes arrived but the content digest does not match
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest supplied by the caller (lowercased)
        expected: String,
        /// Digest computed from the file on disk
        actual: String,
    },

    /// Every worker stopped while bytes were still missing
    #[error("download incomplete: {downloaded} of {total} bytes transferred")]
    Incomplete {
        /// Bytes written before the last worker gave up
        downloaded: u64,
        /// Expected content length
        total: u64,
    },

    /// The job was cancelled by the caller
    #[error("download cancelled")]
    Cancelled,

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Insufficient disk space for the pre-sized destination
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Destination already exists and the collision policy forbids replacing it
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error raised while building or sending a request
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Failure of one ranged request attempt
///
/// Workers retry these locally; they only reach the caller through
/// [`Error::Probe`] or when a worker exhausts its retry budget.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server answered with a status other than the one required
    #[error("unexpected HTTP status {status} (expected {expected})")]
    UnexpectedStatus {
        /// Status code received
        status: u16,
        /// Status code the request required
        expected: u16,
    },

    /// The probe response carried neither Content-Range nor Content-Length
    #[error("response did not report a content length")]
    MissingLength,

    /// The Content-Range header could not be parsed
    #[error("invalid Content-Range header: {0}")]
    InvalidContentRange(String),

    /// Connection or body stream failure
    #[error("stream error: {0}")]
    Stream(String),

    /// Connect or read deadline elapsed
    #[error("request timed out")]
    Timeout,

    /// Received bytes could not be written to the destination
    #[error("write failed: {0}")]
    Write(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransferError::Timeout
        } else if let Some(status) = err.status() {
            TransferError::UnexpectedStatus {
                status: status.as_u16(),
                expected: 206,
            }
        } else {
            TransferError::Stream(err.to_string())
        }
    }
}

impl Error {
    /// Machine-readable error code
    ///
    /// Lets observers distinguish a checksum mismatch from a transfer failure
    /// even though both end in [`crate::types::Event::Failed`].
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Probe { .. } => "probe_failed",
            Error::Transfer(e) => match e {
                TransferError::UnexpectedStatus { .. } => "unexpected_status",
                TransferError::MissingLength => "missing_length",
                TransferError::InvalidContentRange(_) => "invalid_content_range",
                TransferError::Stream(_) => "stream_error",
                TransferError::Timeout => "timeout",
                TransferError::Write(_) => "write_error",
            },
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::Incomplete { .. } => "incomplete",
            Error::Cancelled => "cancelled",
            Error::ShuttingDown => "shutting_down",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::FileCollision { .. } => "file_collision",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
        }
    }
}
