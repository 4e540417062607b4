//! Configuration types for mirror-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-worker transfer and rebalancing behavior
///
/// Groups settings that control how a worker retries its range and when
/// idle workers may take over part of a slower worker's range.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Fixed delay before reopening a range after a stream error (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Consecutive failed attempts without progress before a worker gives up (default: 10)
    ///
    /// `None` retries forever, bounded only by cancellation. The counter resets
    /// whenever an attempt writes at least one byte. A worker that gives up
    /// leaves its range flagged so the remaining workers take it over.
    #[serde(default = "default_max_stream_retries")]
    pub max_stream_retries: Option<u32>,

    /// A range with no progress for this long counts as stalled (default: 10 seconds)
    #[serde(default = "default_stall_timeout", with = "duration_ms_serde")]
    pub stall_timeout: Duration,

    /// Never split a range whose estimated time to finish is below this (default: 3 seconds)
    #[serde(default = "default_min_steal_remaining", with = "duration_ms_serde")]
    pub min_steal_remaining: Duration,

    /// Never split a range with fewer unwritten bytes than this (default: 1 byte,
    /// leaving the decision to `min_steal_remaining`)
    #[serde(default = "default_min_steal_bytes")]
    pub min_steal_bytes: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            retry_delay: default_retry_delay(),
            max_stream_retries: default_max_stream_retries(),
            stall_timeout: default_stall_timeout(),
            min_steal_remaining: default_min_steal_remaining(),
            min_steal_bytes: default_min_steal_bytes(),
        }
    }
}

/// HTTP client settings applied to every mirror request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout (default: 15 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_ms_serde")]
    pub connect_timeout: Duration,

    /// Maximum wait for the next body chunk (default: 30 seconds)
    #[serde(default = "default_read_timeout", with = "duration_ms_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent to mirrors
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for the content-length probe
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Progress reporting cadence and smoothing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Interval between progress events (default: 1 second)
    #[serde(default = "default_progress_interval", with = "duration_ms_serde")]
    pub interval: Duration,

    /// Number of recent samples averaged into the reported speed (default: 5)
    #[serde(default = "default_progress_window")]
    pub window: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: default_progress_interval(),
            window: default_progress_window(),
        }
    }
}

/// Disk space checking before the destination is pre-sized
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to keep after pre-sizing (default: 64 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
        }
    }
}

/// What to do when the destination file already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Pick a free name by appending (1), (2), ...
    Rename,
    /// Refuse to download
    Skip,
}

/// Main configuration for [`crate::Downloader`]
///
/// Every field has a default, so `Config::default()` works out of the box.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker retry and work-stealing behavior
    #[serde(default)]
    pub segment: SegmentConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Content-length probe retries
    #[serde(default)]
    pub retry: RetryConfig,

    /// Progress reporting
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Free space check before pre-sizing the destination
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Destination collision handling
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Global speed limit in bytes per second shared by all workers (None = unlimited)
    #[serde(default)]
    pub speed_limit_bps: Option<u64>,
}

impl Config {
    /// Check settings that would make a download misbehave
    pub fn validate(&self) -> Result<()> {
        if self.progress.window == 0 {
            return Err(Error::Config {
                message: "progress window must hold at least one sample".to_string(),
                key: Some("progress.window".to_string()),
            });
        }
        if self.progress.interval.is_zero() {
            return Err(Error::Config {
                message: "progress interval must be positive".to_string(),
                key: Some("progress.interval".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier {} would shrink delays",
                    self.retry.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.speed_limit_bps == Some(0) {
            return Err(Error::Config {
                message: "speed limit of 0 bytes/s; use None for unlimited".to_string(),
                key: Some("speed_limit_bps".to_string()),
            });
        }
        Ok(())
    }
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_stream_retries() -> Option<u32> {
    Some(10)
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_min_steal_remaining() -> Duration {
    Duration::from_secs(3)
}

fn default_min_steal_bytes() -> u64 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("mirror-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_window() -> usize {
    5
}

fn default_min_free_space() -> u64 {
    64 * 1024 * 1024
}

// Duration serialization helper (integer milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
