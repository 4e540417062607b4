//! Core types for mirror-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier for a download job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a worker (and of its mirror) within a job
pub type WorkerId = usize;

/// Digest algorithm used to verify a finished download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (128-bit)
    #[default]
    Md5,
    /// SHA-256
    Sha256,
}

/// Digest the finished file must match
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedChecksum {
    /// Algorithm to hash the file with
    pub algorithm: ChecksumAlgorithm,
    /// Hex digest; compared case-insensitively
    pub digest: String,
}

impl ExpectedChecksum {
    /// Expect an MD5 hex digest
    pub fn md5(digest: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Md5,
            digest: digest.into(),
        }
    }

    /// Expect a SHA-256 hex digest
    pub fn sha256(digest: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            digest: digest.into(),
        }
    }
}

/// A file to fetch from one or more mirrors
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Mirror URLs serving identical content; one worker per mirror
    pub mirrors: Vec<String>,
    /// Where the file is written
    pub destination: PathBuf,
    /// Optional digest checked once every byte has arrived
    pub checksum: Option<ExpectedChecksum>,
}

impl DownloadRequest {
    /// Create a request without checksum verification
    pub fn new(mirrors: Vec<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            mirrors,
            destination: destination.into(),
            checksum: None,
        }
    }

    /// Require the finished file to match `checksum`
    pub fn with_checksum(mut self, checksum: ExpectedChecksum) -> Self {
        self.checksum = Some(checksum);
        self
    }
}

/// What one worker did over the lifetime of a job
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Mirror this worker read from
    pub mirror: String,
    /// Bytes this worker wrote to the destination
    pub bytes: u64,
    /// Ranges this worker took over from other workers
    pub steals: u32,
    /// Failed attempts that were retried
    pub retries: u32,
    /// Whether the worker stopped after exhausting its retry budget
    pub gave_up: bool,
}

/// Summary returned by a successful download
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadReport {
    /// Job identifier
    pub id: JobId,
    /// Final destination (may differ from the request after collision renaming)
    pub path: PathBuf,
    /// Total content length
    pub total_bytes: u64,
    /// Wall-clock duration of the transfer
    pub elapsed: Duration,
    /// Lowercase hex digest, when a checksum was requested
    pub checksum: Option<String>,
    /// Per-worker statistics, indexed like the mirror list
    pub workers: Vec<WorkerReport>,
    /// When the job finished
    pub finished_at: DateTime<Utc>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Content length known, destination pre-sized, workers starting
    Started {
        /// Job ID
        id: JobId,
        /// Destination path
        path: PathBuf,
        /// Total content length in bytes
        total_bytes: u64,
        /// Number of workers (one per mirror)
        workers: usize,
    },

    /// Periodic progress update
    Progress {
        /// Job ID
        id: JobId,
        /// Bytes written so far
        downloaded_bytes: u64,
        /// Total content length in bytes
        total_bytes: u64,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Smoothed speed in bytes per second
        speed_bps: u64,
        /// Estimated seconds remaining (None while speed is zero)
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_secs: Option<u64>,
    },

    /// An idle worker took over part of another worker's range
    WorkStolen {
        /// Job ID
        id: JobId,
        /// Worker that ran out of work
        thief: WorkerId,
        /// Worker that gave up part of its range
        victim: WorkerId,
        /// First byte handed over
        start: u64,
        /// One past the last byte handed over
        end: u64,
    },

    /// A worker lost its connection and will reopen its remaining range
    WorkerRetrying {
        /// Job ID
        id: JobId,
        /// Worker index
        worker: WorkerId,
        /// Offset the next attempt starts from
        offset: u64,
        /// Failed attempts since the last progress
        attempt: u32,
        /// Error message
        error: String,
    },

    /// Every byte written and verified
    Completed {
        /// Job ID
        id: JobId,
        /// Final destination
        path: PathBuf,
        /// Lowercase hex digest, when verified
        #[serde(skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },

    /// Job failed (transfer failure or checksum mismatch)
    Failed {
        /// Job ID
        id: JobId,
        /// Machine-readable error code (see [`crate::Error::error_code`])
        code: String,
        /// Error message
        error: String,
    },

    /// Job cancelled by the caller
    Cancelled {
        /// Job ID
        id: JobId,
    },
}

impl Event {
    /// Job the event belongs to
    pub fn job_id(&self) -> JobId {
        match self {
            Event::Started { id, .. }
            | Event::Progress { id, .. }
            | Event::WorkStolen { id, .. }
            | Event::WorkerRetrying { id, .. }
            | Event::Completed { id, .. }
            | Event::Failed { id, .. }
            | Event::Cancelled { id } => *id,
        }
    }
}
