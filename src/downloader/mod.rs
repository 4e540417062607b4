//! Core downloader implementation split into focused submodules.
//!
//! The [`Downloader`] struct and its methods are organized by domain:
//! - [`control`] - Starting, awaiting and cancelling jobs
//! - [`lifecycle`] - Shutdown coordination
//! - `job` - One job from length probe to verified file
//! - `worker` - Per-mirror transfer state machine
//! - `coordinator` - Steal requests and range rebalancing
//! - `file` - Pre-sizing and positional writes

mod context;
mod control;
mod coordinator;
mod file;
mod job;
mod lifecycle;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use control::JobHandle;

use crate::config::Config;
use crate::error::Result;
use crate::source::{HttpRangeSource, RangeSource};
use crate::speed_limiter::SpeedLimiter;
use crate::types::{Event, JobId};

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns its HTTP client, configuration and bandwidth limiter; independent
/// instances share nothing.
#[derive(Clone)]
pub struct Downloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Where byte ranges come from (HTTP in production, scripted in tests)
    pub(crate) source: std::sync::Arc<dyn RangeSource>,
    /// Bandwidth cap shared across all jobs (token bucket algorithm)
    pub(crate) speed_limiter: SpeedLimiter,
    /// Map of running jobs to their cancellation tokens
    pub(crate) active_jobs: std::sync::Arc<
        tokio::sync::Mutex<
            std::collections::HashMap<JobId, tokio_util::sync::CancellationToken>,
        >,
    >,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Parent of every job token; cancelled on shutdown
    pub(crate) shutdown_token: tokio_util::sync::CancellationToken,
    /// Next job ID to hand out
    pub(crate) next_job_id: std::sync::Arc<std::sync::atomic::AtomicU64>,
    #[cfg(test)]
    pub(crate) write_log: Option<context::WriteLog>,
}

impl Downloader {
    /// Create a downloader that fetches over HTTP
    ///
    /// Validates the configuration and builds the shared HTTP client with the
    /// configured connect timeout and User-Agent.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpRangeSource::new(&config.http)?;
        Self::with_source(config, std::sync::Arc::new(source))
    }

    /// Create a downloader reading ranges from a custom [`RangeSource`]
    pub fn with_source(config: Config, source: std::sync::Arc<dyn RangeSource>) -> Result<Self> {
        config.validate()?;

        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        let speed_limiter = SpeedLimiter::new(config.speed_limit_bps);

        Ok(Self {
            event_tx,
            config: std::sync::Arc::new(config),
            source,
            speed_limiter,
            active_jobs: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::HashMap::new(),
            )),
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
            shutdown_token: tokio_util::sync::CancellationToken::new(),
            next_job_id: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(1)),
            #[cfg(test)]
            write_log: None,
        })
    }

    /// Subscribe to download events
    ///
    /// Each subscriber gets every event emitted after it subscribed. Slow
    /// subscribers that fall more than 1000 events behind see a `Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to download events as a [`futures::Stream`]
    pub fn event_stream(&self) -> tokio_stream::wrappers::BroadcastStream<Event> {
        tokio_stream::wrappers::BroadcastStream::new(self.event_tx.subscribe())
    }

    /// Configuration this downloader was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current bandwidth cap in bytes per second, `None` when unlimited
    pub fn speed_limit(&self) -> Option<u64> {
        self.speed_limiter.limit()
    }

    /// Change the bandwidth cap for running and future jobs
    pub fn set_speed_limit(&self, limit_bps: Option<u64>) {
        tracing::info!(limit_bps = ?limit_bps, "Speed limit changed");
        self.speed_limiter.set_limit(limit_bps);
    }

    /// Send an event to all subscribers; having none is not an error
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
