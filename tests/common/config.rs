//! Test configuration helpers for creating downloaders and loading live mirrors

use mirror_dl::{Config, Downloader};
use std::time::Duration;
use tempfile::TempDir;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Defaults tightened so failure paths finish within a test timeout
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.segment.retry_delay = Duration::from_millis(20);
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config.progress.interval = Duration::from_millis(100);
    config.disk_space.enabled = false;
    config
}

/// Create a Downloader over HTTP plus a temp directory for destinations
///
/// Keep the temp dir alive for the duration of the test.
pub fn create_test_downloader(config: Config) -> (Downloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let downloader = Downloader::new(config).unwrap();
    (downloader, temp_dir)
}

/// Mirror URLs for live tests
///
/// Required environment variables:
/// - `MIRROR_DL_LIVE_MIRRORS` - comma-separated URLs serving the same file
///
/// Optional environment variables:
/// - `MIRROR_DL_LIVE_MD5` - expected MD5 of the file
pub fn load_live_mirrors() -> Result<(Vec<String>, Option<String>), ConfigError> {
    dotenvy::dotenv().ok();

    let mirrors: Vec<String> = std::env::var("MIRROR_DL_LIVE_MIRRORS")
        .map_err(|_| ConfigError("MIRROR_DL_LIVE_MIRRORS not set in environment".to_string()))?
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();
    if mirrors.is_empty() {
        return Err(ConfigError("MIRROR_DL_LIVE_MIRRORS is empty".to_string()));
    }

    Ok((mirrors, std::env::var("MIRROR_DL_LIVE_MD5").ok()))
}

/// Check if live mirrors are configured
pub fn has_live_mirrors() -> bool {
    load_live_mirrors().is_ok()
}
