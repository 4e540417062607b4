//! Starting, awaiting and cancelling jobs.

use super::Downloader;
use super::job::{JobSpec, run_job};
use crate::error::{Error, Result};
use crate::types::{DownloadReport, DownloadRequest, Event, ExpectedChecksum, JobId};
use std::path::PathBuf;

/// A job running in the background, see [`Downloader::spawn`]
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    cancel_token: tokio_util::sync::CancellationToken,
    task: tokio::task::JoinHandle<Result<DownloadReport>>,
}

impl JobHandle {
    /// Job identifier used in events
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Stop the job; [`JobHandle::wait`] then returns [`Error::Cancelled`]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for the job to finish
    pub async fn wait(self) -> Result<DownloadReport> {
        self.task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

impl Downloader {
    /// Download a file from all mirrors in parallel and wait for the result
    ///
    /// One worker per mirror; workers that finish early take over work from
    /// slower or stalled ones. Emits `Started`, periodic `Progress`, and one
    /// of `Completed`, `Failed` or `Cancelled`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] for an empty mirror list or a non-HTTP URL
    /// - [`Error::Probe`] when the content length cannot be determined
    /// - [`Error::Incomplete`] when every worker gave up with bytes missing
    /// - [`Error::ChecksumMismatch`] when the finished file has the wrong digest
    /// - [`Error::Cancelled`] after [`Downloader::cancel`] or shutdown
    /// - [`Error::ShuttingDown`] once [`Downloader::shutdown`] was called
    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadReport> {
        let (id, cancel_token) = self.register_job().await?;
        self.execute(id, Self::spec_for(request), cancel_token).await
    }

    /// Download a file from a single URL with one resumable stream
    ///
    /// Same events and errors as [`Downloader::download`]; after a dropped
    /// connection the stream reopens at the first byte not yet written.
    pub async fn download_single(
        &self,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        checksum: Option<ExpectedChecksum>,
    ) -> Result<DownloadReport> {
        let (id, cancel_token) = self.register_job().await?;
        let spec = JobSpec {
            mirrors: vec![url.into()],
            destination: destination.into(),
            checksum,
            rebalance: false,
        };
        self.execute(id, spec, cancel_token).await
    }

    /// Start a download in the background and return immediately
    pub async fn spawn(&self, request: DownloadRequest) -> Result<JobHandle> {
        let (id, cancel_token) = self.register_job().await?;
        let downloader = self.clone();
        let token = cancel_token.clone();
        let task = tokio::spawn(async move {
            downloader
                .execute(id, Self::spec_for(request), token)
                .await
        });

        Ok(JobHandle {
            id,
            cancel_token,
            task,
        })
    }

    /// Cancel a running job; returns false if no such job is active
    pub async fn cancel(&self, id: JobId) -> bool {
        let active = self.active_jobs.lock().await;
        match active.get(&id) {
            Some(token) => {
                tracing::info!(job_id = id.0, "Cancelling download");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// IDs of jobs that are currently running
    pub async fn active_jobs(&self) -> Vec<JobId> {
        let active = self.active_jobs.lock().await;
        let mut ids: Vec<JobId> = active.keys().copied().collect();
        ids.sort();
        ids
    }

    fn spec_for(request: DownloadRequest) -> JobSpec {
        JobSpec {
            mirrors: request.mirrors,
            destination: request.destination,
            checksum: request.checksum,
            rebalance: true,
        }
    }

    /// Allocate an ID and a cancellation token tied to the shutdown token
    async fn register_job(&self) -> Result<(JobId, tokio_util::sync::CancellationToken)> {
        if !self
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::ShuttingDown);
        }

        let id = JobId(
            self.next_job_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
        );
        let token = self.shutdown_token.child_token();
        self.active_jobs.lock().await.insert(id, token.clone());
        Ok((id, token))
    }

    /// Run a registered job and publish its terminal event
    async fn execute(
        &self,
        id: JobId,
        spec: JobSpec,
        cancel_token: tokio_util::sync::CancellationToken,
    ) -> Result<DownloadReport> {
        let result = run_job(self, id, spec, cancel_token).await;
        self.active_jobs.lock().await.remove(&id);

        match &result {
            Ok(report) => self.emit_event(Event::Completed {
                id,
                path: report.path.clone(),
                checksum: report.checksum.clone(),
            }),
            Err(Error::Cancelled) => self.emit_event(Event::Cancelled { id }),
            Err(e) => {
                tracing::error!(job_id = id.0, code = e.error_code(), error = %e, "Download failed");
                self.emit_event(Event::Failed {
                    id,
                    code: e.error_code().to_string(),
                    error: e.to_string(),
                });
            }
        }
        result
    }
}
