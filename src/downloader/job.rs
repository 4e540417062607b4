//! One download job from probe to verified file.
//!
//! Phases:
//! 1. Validate mirrors and probe the content length (with retry)
//! 2. Resolve the destination, check disk space, pre-size the file
//! 3. Partition, spawn one worker per mirror plus the coordinator and the
//!    progress reporter
//! 4. Decide the outcome: complete, cancelled or incomplete
//! 5. Flush and verify the checksum

use super::Downloader;
use super::context::JobContext;
use super::coordinator::run_coordinator;
use super::file;
use super::worker::run_worker;
use crate::checksum;
use crate::error::{Error, Result};
use crate::progress::{ProgressReporterParams, spawn_progress_reporter};
use crate::retry::download_with_retry;
use crate::segment::partition;
use crate::types::{DownloadReport, Event, ExpectedChecksum, JobId, WorkerReport};
use crate::utils::{ensure_disk_space, resolve_destination};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

/// Everything needed to run a job, independent of how it was requested
pub(crate) struct JobSpec {
    pub(crate) mirrors: Vec<String>,
    pub(crate) destination: PathBuf,
    pub(crate) checksum: Option<ExpectedChecksum>,
    /// Whether idle workers may take over other workers' ranges
    pub(crate) rebalance: bool,
}

/// Reject empty mirror lists and anything that is not an http(s) URL.
pub(crate) fn validate_mirrors(mirrors: &[String]) -> Result<()> {
    if mirrors.is_empty() {
        return Err(Error::InvalidRequest(
            "at least one mirror is required".to_string(),
        ));
    }
    for mirror in mirrors {
        let url = url::Url::parse(mirror)
            .map_err(|e| Error::InvalidRequest(format!("invalid mirror URL '{mirror}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "unsupported scheme '{}' in mirror URL '{mirror}'",
                url.scheme()
            )));
        }
    }
    Ok(())
}

/// Run a job to completion.
///
/// `cancel` is the job's token; cancelling it stops every task of the job.
pub(crate) async fn run_job(
    downloader: &Downloader,
    id: JobId,
    spec: JobSpec,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<DownloadReport> {
    let started = Instant::now();
    validate_mirrors(&spec.mirrors)?;

    // Phase 1: probe the first mirror for the total length
    let probe_url = spec.mirrors[0].clone();
    let source = Arc::clone(&downloader.source);
    let total_bytes = tokio::select! {
        probed = download_with_retry(&downloader.config.retry, || {
            let source = Arc::clone(&source);
            let url = probe_url.clone();
            async move { source.content_length(&url).await }
        }) => probed.map_err(|source| Error::Probe { url: probe_url.clone(), source })?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };
    tracing::info!(
        job_id = id.0,
        total_bytes,
        mirrors = spec.mirrors.len(),
        "Probed content length"
    );

    // Phase 2: destination
    let path = resolve_destination(&spec.destination, downloader.config.file_collision)?;
    ensure_disk_space(&path, total_bytes, &downloader.config.disk_space)?;
    let output = file::create_presized(&path, total_bytes).await?;

    downloader.emit_event(Event::Started {
        id,
        path: path.clone(),
        total_bytes,
        workers: spec.mirrors.len(),
    });

    // Phase 3: transfer
    let workers = if total_bytes == 0 {
        spec.mirrors
            .iter()
            .map(|mirror| WorkerReport {
                mirror: mirror.clone(),
                ..WorkerReport::default()
            })
            .collect()
    } else {
        transfer_all(downloader, id, &spec, total_bytes, Arc::clone(&output), &cancel).await?
    };

    // Phase 5: flush and verify
    file::sync(&output).await?;
    drop(output);
    let checksum = match spec.checksum {
        Some(expected) => Some(verify(&path, expected).await?),
        None => None,
    };

    let elapsed = started.elapsed();
    tracing::info!(
        job_id = id.0,
        path = %path.display(),
        total_bytes,
        elapsed_ms = elapsed.as_millis() as u64,
        steals = workers.iter().map(|w| w.steals).sum::<u32>(),
        "Download complete"
    );

    Ok(DownloadReport {
        id,
        path,
        total_bytes,
        elapsed,
        checksum,
        workers,
        finished_at: chrono::Utc::now(),
    })
}

/// Spawn the workers, coordinator and progress reporter and wait for them.
async fn transfer_all(
    downloader: &Downloader,
    id: JobId,
    spec: &JobSpec,
    total_bytes: u64,
    output: Arc<std::fs::File>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Vec<WorkerReport>> {
    let worker_count = spec.mirrors.len();
    let downloaded = Arc::new(AtomicU64::new(0));

    let ctx = Arc::new(JobContext {
        id,
        mirrors: spec.mirrors.clone(),
        total_bytes,
        segments: tokio::sync::Mutex::new(partition(total_bytes, worker_count, Instant::now())),
        downloaded: Arc::clone(&downloaded),
        file: output,
        source: Arc::clone(&downloader.source),
        config: Arc::clone(&downloader.config),
        speed_limiter: downloader.speed_limiter.clone(),
        event_tx: downloader.event_tx.clone(),
        stop: cancel.child_token(),
        rebalance: spec.rebalance,
        #[cfg(test)]
        write_log: downloader.write_log.clone(),
    });

    let reporter_token = tokio_util::sync::CancellationToken::new();
    let reporter = spawn_progress_reporter(ProgressReporterParams {
        id,
        total_bytes,
        downloaded_bytes: Arc::clone(&downloaded),
        config: downloader.config.progress.clone(),
        event_tx: downloader.event_tx.clone(),
        cancel_token: reporter_token.clone(),
    });

    let (tx, rx) = tokio::sync::mpsc::channel(worker_count * 2);
    let handles: Vec<_> = (0..worker_count)
        .map(|worker| tokio::spawn(run_worker(Arc::clone(&ctx), worker, tx.clone())))
        .collect();
    drop(tx);

    let workers = run_coordinator(Arc::clone(&ctx), rx).await;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(job_id = id.0, error = %e, "Worker task panicked");
        }
    }
    reporter_token.cancel();
    reporter.await.ok();

    // Phase 4: outcome
    let written = ctx.downloaded_bytes();
    if written < total_bytes {
        if cancel.is_cancelled() {
            tracing::info!(job_id = id.0, written, total_bytes, "Download cancelled");
            return Err(Error::Cancelled);
        }
        tracing::error!(
            job_id = id.0,
            written,
            total_bytes,
            "All workers stopped before the file was complete"
        );
        return Err(Error::Incomplete {
            downloaded: written,
            total: total_bytes,
        });
    }

    Ok(workers)
}

/// Hash the finished file on the blocking pool and compare.
async fn verify(path: &Path, expected: ExpectedChecksum) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || checksum::verify_file(&path, &expected))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}
