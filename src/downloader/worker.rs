//! Per-mirror worker task.
//!
//! A worker streams its segment from its own mirror, writing each chunk at
//! its absolute offset. States:
//!
//! - Downloading: ranged request for `[position, end)` open, chunks flowing
//! - Retrying: the attempt failed; the segment is flagged errored while the
//!   worker waits `retry_delay`, then it reopens from the first unwritten byte
//! - SeekingWork: the segment is exhausted; ask the coordinator for more
//! - Terminated: nothing left to take, retry budget spent, or job stopped

use super::context::{JobContext, StealReply, WorkerMessage};
use super::file;
use crate::error::TransferError;
use crate::retry::StreamRetry;
use crate::types::{Event, WorkerId, WorkerReport};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// How a transfer attempt ended without an error
enum AttemptEnd {
    /// The segment is exhausted (possibly because its end was stolen)
    Exhausted,
    /// The job told workers to stop
    Stopped,
}

/// Drive one worker until it terminates, then report to the coordinator.
pub(crate) async fn run_worker(
    ctx: Arc<JobContext>,
    worker: WorkerId,
    tx: tokio::sync::mpsc::Sender<WorkerMessage>,
) {
    let mut report = WorkerReport {
        mirror: ctx.mirrors[worker].clone(),
        ..WorkerReport::default()
    };
    let mut retry = StreamRetry::new(&ctx.config.segment);

    loop {
        if ctx.stop.is_cancelled() {
            break;
        }

        let range = {
            let segments = ctx.segments.lock().await;
            segments[worker].http_range()
        };

        let Some((first, last)) = range else {
            if !ctx.rebalance {
                break;
            }
            match request_work(&ctx, worker, &tx).await {
                Some((start, end)) => {
                    report.steals += 1;
                    retry.record_progress();
                    tracing::debug!(
                        job_id = ctx.id.0,
                        worker,
                        start,
                        end,
                        "Worker took over a new range"
                    );
                    continue;
                }
                None => break,
            }
        };

        match transfer(&ctx, worker, first, last, &mut report, &mut retry).await {
            Ok(AttemptEnd::Exhausted) => {}
            Ok(AttemptEnd::Stopped) => break,
            Err(e) => {
                let offset = {
                    let mut segments = ctx.segments.lock().await;
                    segments[worker].fail();
                    segments[worker].position()
                };

                let Some(delay) = retry.record_failure() else {
                    tracing::error!(
                        job_id = ctx.id.0,
                        worker,
                        mirror = %ctx.mirrors[worker],
                        offset,
                        error = %e,
                        "Worker exhausted its retry budget, leaving range to other workers"
                    );
                    report.gave_up = true;
                    break;
                };

                report.retries += 1;
                tracing::warn!(
                    job_id = ctx.id.0,
                    worker,
                    mirror = %ctx.mirrors[worker],
                    offset,
                    attempt = retry.consecutive(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Range transfer failed, retrying"
                );
                ctx.emit(Event::WorkerRetrying {
                    id: ctx.id,
                    worker,
                    offset,
                    attempt: retry.consecutive(),
                    error: e.to_string(),
                });

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.stop.cancelled() => break,
                }

                ctx.segments.lock().await[worker].resume(Instant::now());
            }
        }
    }

    tracing::debug!(
        job_id = ctx.id.0,
        worker,
        bytes = report.bytes,
        steals = report.steals,
        retries = report.retries,
        gave_up = report.gave_up,
        "Worker terminated"
    );
    tx.send(WorkerMessage::Finished { worker, report })
        .await
        .ok();
}

/// Ask the coordinator for another range; `None` means terminate.
async fn request_work(
    ctx: &JobContext,
    worker: WorkerId,
    tx: &tokio::sync::mpsc::Sender<WorkerMessage>,
) -> Option<(u64, u64)> {
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    tx.send(WorkerMessage::StealRequest {
        worker,
        reply: reply_tx,
    })
    .await
    .ok()?;

    tokio::select! {
        reply = reply_rx => match reply {
            Ok(StealReply::Granted { start, end }) => Some((start, end)),
            Ok(StealReply::NoWork) | Err(_) => None,
        },
        _ = ctx.stop.cancelled() => None,
    }
}

/// Stream `first..=last` from this worker's mirror into the file.
///
/// Returns when the segment is exhausted, when the job stops, or with the
/// error that ended the attempt. Bytes beyond the segment's current end are
/// dropped and the connection closed, since another worker owns them now.
async fn transfer(
    ctx: &JobContext,
    worker: WorkerId,
    first: u64,
    last: u64,
    report: &mut WorkerReport,
    retry: &mut StreamRetry,
) -> Result<AttemptEnd, TransferError> {
    let mirror = &ctx.mirrors[worker];
    let read_timeout = ctx.config.http.read_timeout;

    tracing::debug!(job_id = ctx.id.0, worker, first, last, "Opening range");
    let mut stream = tokio::select! {
        opened = tokio::time::timeout(
            ctx.config.http.connect_timeout + read_timeout,
            ctx.source.open_range(mirror, first, last),
        ) => opened.map_err(|_| TransferError::Timeout)??,
        _ = ctx.stop.cancelled() => return Ok(AttemptEnd::Stopped),
    };

    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
            _ = ctx.stop.cancelled() => return Ok(AttemptEnd::Stopped),
        };

        let mut chunk = match next {
            Err(_) => return Err(TransferError::Timeout),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(chunk))) => chunk,
            Ok(None) => {
                let segments = ctx.segments.lock().await;
                return if segments[worker].is_exhausted() {
                    Ok(AttemptEnd::Exhausted)
                } else {
                    Err(TransferError::Stream(
                        "connection closed before end of range".to_string(),
                    ))
                };
            }
        };
        if chunk.is_empty() {
            continue;
        }

        ctx.speed_limiter.acquire(chunk.len() as u64).await;

        let (offset, granted) = ctx.segments.lock().await[worker].reserve(chunk.len() as u64);
        if granted == 0 {
            return Ok(AttemptEnd::Exhausted);
        }
        let truncated = (granted as usize) < chunk.len();
        chunk.truncate(granted as usize);

        if let Err(e) = file::write_at(&ctx.file, chunk, offset).await {
            ctx.segments.lock().await[worker].release(granted);
            return Err(TransferError::Write(e.to_string()));
        }
        #[cfg(test)]
        ctx.record_write(offset, granted);

        let exhausted = {
            let mut segments = ctx.segments.lock().await;
            let segment = &mut segments[worker];
            segment.complete(granted, Instant::now());
            segment.is_exhausted()
        };
        ctx.downloaded.fetch_add(granted, Ordering::AcqRel);
        report.bytes += granted;
        retry.record_progress();

        if truncated || exhausted {
            return Ok(AttemptEnd::Exhausted);
        }
    }
}
