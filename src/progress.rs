//! Progress reporting for running jobs
//!
//! [`ProgressWindow`] turns periodic readings of the shared byte counter into
//! a smoothed speed, percentage and ETA. [`spawn_progress_reporter`] drives it
//! on a fixed interval and broadcasts [`Event::Progress`].

use crate::config::ProgressConfig;
use crate::types::{Event, JobId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One computed progress reading
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    /// Average of the recent per-tick speeds
    pub speed_bps: u64,
    /// Seconds until done at the smoothed speed
    pub eta_secs: Option<u64>,
}

/// Sliding window over per-tick throughput samples
#[derive(Debug)]
pub struct ProgressWindow {
    total_bytes: u64,
    capacity: usize,
    last_bytes: u64,
    samples: VecDeque<f64>,
}

impl ProgressWindow {
    /// Window averaging the last `capacity` samples of a `total_bytes` transfer
    pub fn new(total_bytes: u64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            total_bytes,
            capacity,
            last_bytes: 0,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Feed the counter value observed `elapsed` after the previous sample
    pub fn sample(&mut self, downloaded_bytes: u64, elapsed: Duration) -> ProgressSnapshot {
        let delta = downloaded_bytes.saturating_sub(self.last_bytes);
        self.last_bytes = downloaded_bytes;

        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(delta as f64 / secs);
        }

        let speed = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        };

        let percent = if self.total_bytes > 0 {
            ((downloaded_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0) as f32
        } else {
            100.0
        };

        let left = self.total_bytes.saturating_sub(downloaded_bytes);
        let eta_secs = if left == 0 {
            Some(0)
        } else if speed >= 1.0 {
            Some((left as f64 / speed).ceil() as u64)
        } else {
            None
        };

        ProgressSnapshot {
            downloaded_bytes,
            percent,
            speed_bps: speed as u64,
            eta_secs,
        }
    }
}

/// Parameters for spawning a progress reporter background task
pub(crate) struct ProgressReporterParams {
    /// Job ID
    pub id: JobId,
    /// Total size in bytes
    pub total_bytes: u64,
    /// Shared counter of bytes written
    pub downloaded_bytes: Arc<AtomicU64>,
    /// Cadence and window size
    pub config: ProgressConfig,
    /// Event broadcast sender
    pub event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Stops the reporter when the job ends
    pub cancel_token: tokio_util::sync::CancellationToken,
}

/// Spawn a background task that periodically reports download progress.
pub(crate) fn spawn_progress_reporter(
    params: ProgressReporterParams,
) -> tokio::task::JoinHandle<()> {
    let ProgressReporterParams {
        id,
        total_bytes,
        downloaded_bytes,
        config,
        event_tx,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let mut window = ProgressWindow::new(total_bytes, config.window);
        let mut interval = tokio::time::interval(config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        interval.tick().await;
        let mut last_tick = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now();
                    let current = downloaded_bytes.load(Ordering::Relaxed);
                    let snapshot = window.sample(current, now.duration_since(last_tick));
                    last_tick = now;

                    event_tx
                        .send(Event::Progress {
                            id,
                            downloaded_bytes: snapshot.downloaded_bytes,
                            total_bytes,
                            percent: snapshot.percent,
                            speed_bps: snapshot.speed_bps,
                            eta_secs: snapshot.eta_secs,
                        })
                        .ok();
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_average_of_last_samples() {
        let mut window = ProgressWindow::new(10_000, 3);
        let second = Duration::from_secs(1);

        window.sample(100, second); // 100
        window.sample(300, second); // 200
        let snap = window.sample(600, second); // 300
        assert_eq!(snap.speed_bps, 200);

        // Oldest sample (100) drops out
        let snap = window.sample(1_000, second); // 400
        assert_eq!(snap.speed_bps, 300);
    }

    #[test]
    fn percent_and_eta_follow_the_counter() {
        let mut window = ProgressWindow::new(1_000, 5);

        let snap = window.sample(250, Duration::from_secs(1));
        assert!((snap.percent - 25.0).abs() < f32::EPSILON);
        assert_eq!(snap.speed_bps, 250);
        assert_eq!(snap.eta_secs, Some(3));

        let snap = window.sample(1_000, Duration::from_secs(1));
        assert!((snap.percent - 100.0).abs() < f32::EPSILON);
        assert_eq!(snap.eta_secs, Some(0));
    }

    #[test]
    fn eta_unknown_without_throughput() {
        let mut window = ProgressWindow::new(1_000, 5);

        let snap = window.sample(0, Duration::from_secs(1));
        assert_eq!(snap.speed_bps, 0);
        assert_eq!(snap.eta_secs, None);
    }

    #[test]
    fn empty_transfer_reports_complete() {
        let mut window = ProgressWindow::new(0, 5);
        let snap = window.sample(0, Duration::from_secs(1));

        assert!((snap.percent - 100.0).abs() < f32::EPSILON);
        assert_eq!(snap.eta_secs, Some(0));
    }

    #[tokio::test]
    async fn reporter_emits_on_each_tick_until_cancelled() {
        let (event_tx, mut rx) = tokio::sync::broadcast::channel(16);
        let counter = Arc::new(AtomicU64::new(0));
        let cancel_token = tokio_util::sync::CancellationToken::new();

        let handle = spawn_progress_reporter(ProgressReporterParams {
            id: JobId(7),
            total_bytes: 4_000,
            downloaded_bytes: counter.clone(),
            config: ProgressConfig {
                interval: Duration::from_millis(50),
                window: 5,
            },
            event_tx,
            cancel_token: cancel_token.clone(),
        });

        counter.store(1_000, Ordering::Relaxed);

        match rx.recv().await.unwrap() {
            Event::Progress {
                id,
                downloaded_bytes,
                percent,
                ..
            } => {
                assert_eq!(id, JobId(7));
                assert_eq!(downloaded_bytes, 1_000);
                assert!((percent - 25.0).abs() < f32::EPSILON);
            }
            other => panic!("expected progress event, got {other:?}"),
        }

        cancel_token.cancel();
        handle.await.unwrap();
    }
}
