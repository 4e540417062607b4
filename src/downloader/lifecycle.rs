//! Shutdown coordination.

use super::Downloader;
use crate::error::Result;

impl Downloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new jobs ([`crate::Error::ShuttingDown`])
    /// 2. Cancels every running job through the shared parent token
    /// 3. Waits up to 30 seconds for the jobs to unwind
    ///
    /// Cancelled jobs emit `Cancelled` and return [`crate::Error::Cancelled`].
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        self.shutdown_token.cancel();

        let shutdown_timeout = std::time::Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active downloads stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for downloads to stop, proceeding with shutdown")
            }
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active downloads to stop");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}
