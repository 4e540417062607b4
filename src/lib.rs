//! # mirror-dl
//!
//! Multi-mirror segmented HTTP downloader.
//!
//! A file served identically by several mirrors is split into one contiguous
//! byte range per mirror. Each range is fetched by its own worker with HTTP
//! `Range` requests and written straight into a pre-sized destination file.
//! Workers that finish early take over part of the range of a slower or
//! stalled worker, so one bad mirror never holds the job hostage. Dropped
//! connections resume at the first byte not yet written.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirror_dl::{Config, DownloadRequest, Downloader, ExpectedChecksum};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = Downloader::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = DownloadRequest::new(
//!         vec![
//!             "https://mirror-a.example.com/image.iso".to_string(),
//!             "https://mirror-b.example.com/image.iso".to_string(),
//!         ],
//!         "image.iso",
//!     )
//!     .with_checksum(ExpectedChecksum::md5("d41d8cd98f00b204e9800998ecf8427e"));
//!
//!     let report = downloader.download(request).await?;
//!     println!("{} bytes in {:?}", report.total_bytes, report.elapsed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// File digests (MD5, SHA-256)
pub mod checksum;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Progress aggregation
pub mod progress;
/// Work stealing between workers
pub mod rebalance;
/// Retry logic with exponential backoff
pub mod retry;
/// Byte ranges owned by workers
pub mod segment;
/// Mirror access over HTTP range requests
pub mod source;
/// Speed limiting with token bucket
pub mod speed_limiter;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction};
pub use downloader::{Downloader, JobHandle};
pub use error::{Error, Result, TransferError};
pub use source::{HttpRangeSource, RangeSource};
pub use types::{
    ChecksumAlgorithm, DownloadReport, DownloadRequest, Event, ExpectedChecksum, JobId,
    WorkerReport,
};
