//! Bandwidth cap shared by every worker of a [`crate::Downloader`]
//!
//! Token bucket: tokens are bytes, they refill at `limit_bps` and the bucket
//! holds at most one second worth. A worker acquires tokens for each chunk
//! before writing it. Without a limit `acquire` returns immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Cloneable handle to one shared token bucket
#[derive(Clone, Debug)]
pub struct SpeedLimiter {
    /// Bytes per second, 0 = unlimited
    limit_bps: Arc<AtomicU64>,
    bucket: Arc<Mutex<Bucket>>,
}

impl SpeedLimiter {
    /// Create a limiter; `None` means unlimited
    ///
    /// ```
    /// use mirror_dl::speed_limiter::SpeedLimiter;
    ///
    /// let limiter = SpeedLimiter::new(Some(10 * 1024 * 1024));
    /// assert_eq!(limiter.limit(), Some(10 * 1024 * 1024));
    /// assert_eq!(SpeedLimiter::new(None).limit(), None);
    /// ```
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let limit = limit_bps.unwrap_or(0);
        Self {
            limit_bps: Arc::new(AtomicU64::new(limit)),
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: limit as f64,
                refilled_at: Instant::now(),
            })),
        }
    }

    /// Current limit in bytes per second
    pub fn limit(&self) -> Option<u64> {
        match self.limit_bps.load(Ordering::Relaxed) {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Change the limit; waiting callers pick it up on their next check
    pub fn set_limit(&self, limit_bps: Option<u64>) {
        let new_limit = limit_bps.unwrap_or(0);
        let old_limit = self.limit_bps.swap(new_limit, Ordering::SeqCst);
        if new_limit > old_limit {
            let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
            bucket.tokens = (bucket.tokens + (new_limit - old_limit) as f64).min(new_limit as f64);
        }
    }

    /// Wait until `bytes` may be transferred
    ///
    /// Large requests are served in slices so one worker cannot starve the
    /// others for a whole second.
    pub async fn acquire(&self, bytes: u64) {
        let mut remaining = bytes as f64;

        while remaining > 0.0 {
            let limit = self.limit_bps.load(Ordering::Relaxed);
            if limit == 0 {
                return;
            }

            let wait = {
                let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * limit as f64).min(limit as f64);
                bucket.refilled_at = now;

                let take = remaining.min(bucket.tokens);
                if take > 0.0 {
                    bucket.tokens -= take;
                    remaining -= take;
                }
                if remaining <= 0.0 {
                    None
                } else {
                    let secs = remaining.min(limit as f64) / limit as f64;
                    Some(Duration::from_secs_f64(secs).clamp(
                        Duration::from_millis(5),
                        Duration::from_millis(100),
                    ))
                }
            };

            match wait {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }

    #[cfg(test)]
    fn drain(&self) {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.tokens = 0.0;
        bucket.refilled_at = Instant::now();
    }
}
