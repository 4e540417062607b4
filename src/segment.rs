//! Byte ranges owned by workers
//!
//! A [`Segment`] is the half-open interval `[start, end)` one worker is
//! responsible for. `start` moves forward when an attempt fails (so the next
//! request resumes after the bytes already written), `end` moves backward
//! when another worker steals the tail. Bytes are first reserved
//! (`in_flight`) and only counted as `downloaded` once they are on disk, so a
//! steal never hands out bytes a worker is still writing. The next byte to
//! reserve is `start + downloaded + in_flight`.

use std::time::{Duration, Instant};

/// One worker's share of the file
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Offset the current attempt started from
    pub start: u64,
    /// One past the last byte this worker owns
    pub end: u64,
    /// Bytes written by the current attempt
    pub downloaded: u64,
    /// Bytes reserved by the worker but not yet written
    pub in_flight: u64,
    /// When throughput measurement for the current attempt began
    pub since: Instant,
    /// When the last byte was committed (or the attempt began)
    pub last_progress: Instant,
    /// Set while the worker is backing off after a failure, or after it gave up
    pub errored: bool,
}

/// Measured speed of a segment's worker
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Throughput {
    /// No bytes yet in this attempt and not yet considered stalled
    Unknown,
    /// Average bytes per second since the attempt began
    Measured(f64),
    /// Errored or silent for longer than the stall timeout
    Stalled,
}

impl Segment {
    /// New segment covering `[start, end)`
    pub fn new(start: u64, end: u64, now: Instant) -> Self {
        Self {
            start,
            end,
            downloaded: 0,
            in_flight: 0,
            since: now,
            last_progress: now,
            errored: false,
        }
    }

    /// Next byte the worker will reserve
    pub fn position(&self) -> u64 {
        self.start + self.downloaded + self.in_flight
    }

    /// Bytes not yet written
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.position())
    }

    /// True once every owned byte has been written
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Inclusive `(first, last)` pair for a `Range` header, `None` when exhausted
    pub fn http_range(&self) -> Option<(u64, u64)> {
        if self.is_exhausted() {
            None
        } else {
            Some((self.position(), self.end - 1))
        }
    }

    /// Claim up to `len` bytes at the current position
    ///
    /// Returns the offset to write at and how many bytes were granted. The
    /// count is clamped to the current `end`, which may have shrunk since the
    /// request was issued; bytes past `end` belong to another worker.
    pub fn reserve(&mut self, len: u64) -> (u64, u64) {
        let offset = self.position();
        let granted = len.min(self.remaining());
        self.in_flight += granted;
        (offset, granted)
    }

    /// Mark `len` reserved bytes as written
    pub fn complete(&mut self, len: u64, now: Instant) {
        let len = len.min(self.in_flight);
        self.in_flight -= len;
        self.downloaded += len;
        if len > 0 {
            self.last_progress = now;
        }
    }

    /// Give back `len` reserved bytes whose write failed
    pub fn release(&mut self, len: u64) {
        self.in_flight -= len.min(self.in_flight);
    }

    /// Reserve and complete in one step; returns the accepted byte count
    pub fn commit(&mut self, len: u64, now: Instant) -> u64 {
        let (_, granted) = self.reserve(len);
        self.complete(granted, now);
        granted
    }

    /// Fold the failed attempt's bytes into `start` and flag the segment
    ///
    /// Any reservation still open is dropped; those bytes were never written.
    pub fn fail(&mut self) {
        self.start += self.downloaded;
        self.downloaded = 0;
        self.in_flight = 0;
        self.errored = true;
    }

    /// Begin a fresh attempt from the current `start`
    pub fn resume(&mut self, now: Instant) {
        self.errored = false;
        self.since = now;
        self.last_progress = now;
    }

    /// Replace the owned range with `[start, end)` and reset measurement
    pub fn assign(&mut self, start: u64, end: u64, now: Instant) {
        *self = Segment::new(start, end, now);
    }

    /// Speed of the current attempt, without stall detection
    pub fn rate(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.since).as_secs_f64();
        if self.downloaded == 0 || elapsed <= 0.0 {
            return None;
        }
        Some(self.downloaded as f64 / elapsed)
    }

    /// Classify the worker's speed for rebalancing
    pub fn throughput(&self, now: Instant, stall_timeout: Duration) -> Throughput {
        if self.errored || now.saturating_duration_since(self.last_progress) >= stall_timeout {
            return Throughput::Stalled;
        }
        match self.rate(now) {
            Some(bps) => Throughput::Measured(bps),
            None => Throughput::Unknown,
        }
    }
}

/// Split `[0, total)` into `count` contiguous segments
///
/// Every segment gets `total / count` bytes; the last one also takes the
/// remainder. When `total < count` the leading segments are empty.
pub fn partition(total: u64, count: usize, now: Instant) -> Vec<Segment> {
    let count = count.max(1);
    let base = total / count as u64;

    (0..count)
        .map(|i| {
            let start = base * i as u64;
            let end = if i + 1 == count {
                total
            } else {
                start + base
            };
            Segment::new(start, end, now)
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_total_without_gaps() {
        let now = Instant::now();
        let segments = partition(1003, 4, now);

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].start, 0);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "segments must be contiguous");
        }
        assert_eq!(segments[3].end, 1003);
        // The remainder lands on the last segment
        assert_eq!(segments[0].remaining(), 250);
        assert_eq!(segments[3].remaining(), 253);
    }

    #[test]
    fn partition_smaller_than_worker_count_gives_everything_to_the_last() {
        let segments = partition(3, 4, Instant::now());

        let sizes: Vec<u64> = segments.iter().map(Segment::remaining).collect();
        assert_eq!(sizes, vec![0, 0, 0, 3]);
    }

    #[test]
    fn http_range_is_inclusive_of_last_byte() {
        let mut seg = Segment::new(100, 200, Instant::now());
        assert_eq!(seg.http_range(), Some((100, 199)));

        seg.commit(100, Instant::now());
        assert_eq!(seg.http_range(), None);
    }

    #[test]
    fn commit_clamps_to_shrunk_end() {
        let now = Instant::now();
        let mut seg = Segment::new(0, 100, now);

        assert_eq!(seg.commit(40, now), 40);
        seg.end = 50; // another worker took [50, 100)
        assert_eq!(seg.commit(40, now), 10);
        assert!(seg.is_exhausted());
        assert_eq!(seg.commit(5, now), 0);
    }

    #[test]
    fn reserved_bytes_are_not_remaining_until_released() {
        let now = Instant::now();
        let mut seg = Segment::new(0, 100, now);

        assert_eq!(seg.reserve(30), (0, 30));
        assert_eq!(seg.remaining(), 70);
        assert_eq!(seg.downloaded, 0);

        // Write failed: the bytes go back to the unwritten part
        seg.release(30);
        assert_eq!(seg.remaining(), 100);

        assert_eq!(seg.reserve(30), (0, 30));
        seg.complete(30, now);
        assert_eq!(seg.downloaded, 30);
        assert_eq!(seg.in_flight, 0);
        assert_eq!(seg.reserve(10), (30, 10));
    }

    #[test]
    fn fail_then_resume_continues_after_written_bytes() {
        let now = Instant::now();
        let mut seg = Segment::new(1000, 2000, now);
        seg.commit(300, now);

        seg.fail();
        assert_eq!(seg.start, 1300);
        assert_eq!(seg.downloaded, 0);
        assert!(seg.errored);
        assert_eq!(seg.http_range(), Some((1300, 1999)));

        seg.resume(now);
        assert!(!seg.errored);
        assert_eq!(seg.position(), 1300);
    }

    #[test]
    fn throughput_classification() {
        let start = Instant::now();
        let stall = Duration::from_secs(10);
        let mut seg = Segment::new(0, 10_000, start);

        assert_eq!(seg.throughput(start, stall), Throughput::Unknown);

        seg.commit(2000, start + Duration::from_secs(1));
        match seg.throughput(start + Duration::from_secs(2), stall) {
            Throughput::Measured(bps) => assert!((bps - 1000.0).abs() < 1e-6),
            other => panic!("expected measured throughput, got {other:?}"),
        }

        // Silent for longer than the stall timeout
        assert_eq!(
            seg.throughput(start + Duration::from_secs(12), stall),
            Throughput::Stalled
        );

        seg.fail();
        assert_eq!(seg.throughput(start, stall), Throughput::Stalled);
    }
}
