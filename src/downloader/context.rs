//! Shared state of one running job and the worker/coordinator protocol.

use crate::config::Config;
use crate::segment::Segment;
use crate::source::RangeSource;
use crate::speed_limiter::SpeedLimiter;
use crate::types::{Event, JobId, WorkerId, WorkerReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Every positional write as `(job, offset, len)`
#[cfg(test)]
pub(crate) type WriteLog = Arc<std::sync::Mutex<Vec<(JobId, u64, u64)>>>;

/// State every task of a job reads or mutates.
///
/// The segment table is the only mutable structure shared between workers;
/// all boundary changes (commits, failures, steals) happen under its lock.
pub(crate) struct JobContext {
    pub(crate) id: JobId,
    /// Mirror URL per worker
    pub(crate) mirrors: Vec<String>,
    pub(crate) total_bytes: u64,
    /// One segment per worker, indexed by [`WorkerId`]
    pub(crate) segments: tokio::sync::Mutex<Vec<Segment>>,
    /// Bytes written to disk across all workers
    pub(crate) downloaded: Arc<AtomicU64>,
    pub(crate) file: Arc<std::fs::File>,
    pub(crate) source: Arc<dyn RangeSource>,
    pub(crate) config: Arc<Config>,
    pub(crate) speed_limiter: SpeedLimiter,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Stops every worker; fired on cancellation or once all bytes are written
    pub(crate) stop: tokio_util::sync::CancellationToken,
    /// Whether idle workers may take over other workers' ranges
    pub(crate) rebalance: bool,
    #[cfg(test)]
    pub(crate) write_log: Option<WriteLog>,
}

impl JobContext {
    /// Bytes written so far
    pub(crate) fn downloaded_bytes(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// True once every byte of the file is on disk
    pub(crate) fn is_complete(&self) -> bool {
        self.downloaded_bytes() >= self.total_bytes
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    #[cfg(test)]
    pub(crate) fn record_write(&self, offset: u64, len: u64) {
        if let Some(log) = &self.write_log
            && let Ok(mut log) = log.lock()
        {
            log.push((self.id, offset, len));
        }
    }
}

/// Message from a worker to the job coordinator
pub(crate) enum WorkerMessage {
    /// The worker's range is exhausted and it wants more
    StealRequest {
        worker: WorkerId,
        reply: tokio::sync::oneshot::Sender<StealReply>,
    },
    /// The worker exited and will send nothing else
    Finished {
        worker: WorkerId,
        report: WorkerReport,
    },
}

/// Coordinator's answer to a steal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StealReply {
    /// The worker now owns `[start, end)`; its segment was already updated
    Granted { start: u64, end: u64 },
    /// Nothing left to take; the worker should terminate
    NoWork,
}
