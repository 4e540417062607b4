//! Downloader tests driven by an in-memory [`RangeSource`].

use super::*;
use crate::error::{Error, TransferError};
use crate::source::ByteStream;
use crate::types::{DownloadReport, DownloadRequest};
use bytes::Bytes;
use futures::StreamExt;
use rand::{RngCore, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;


/// What a scripted attempt does instead of serving its range normally
#[derive(Clone, Debug)]
pub(super) enum Failure {
    /// Reject the request with this status
    Status(u16),
    /// Serve this many bytes, then reset the connection
    CutAfter(u64),
}

/// Behaviour of one scripted mirror
#[derive(Clone, Debug, Default)]
pub(super) struct MirrorScript {
    /// Wait before the response opens
    pub(super) open_delay: Duration,
    /// Wait before each chunk
    pub(super) chunk_delay: Duration,
    /// Consumed one per attempt; attempts beyond the list succeed
    pub(super) failures: VecDeque<Failure>,
    /// Every attempt fails with a connection error
    pub(super) always_fail: bool,
}

/// In-memory mirror set serving one body, recording every range requested.
pub(super) struct ScriptedSource {
    body: Bytes,
    chunk_size: usize,
    probe_status: Option<u16>,
    scripts: Mutex<HashMap<String, MirrorScript>>,
    requests: Mutex<Vec<(String, u64, u64)>>,
}

impl ScriptedSource {
    pub(super) fn new(body: Bytes) -> Self {
        Self {
            body,
            chunk_size: 16 * 1024,
            probe_status: None,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Make the length probe fail with `status`
    pub(super) fn with_probe_status(mut self, status: u16) -> Self {
        self.probe_status = Some(status);
        self
    }

    pub(super) fn script(self, mirror: &str, script: MirrorScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(mirror.to_string(), script);
        self
    }

    /// `(first, last)` pairs requested from `mirror`, in order
    pub(super) fn requests_for(&self, mirror: &str) -> Vec<(u64, u64)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _, _)| url == mirror)
            .map(|(_, first, last)| (*first, *last))
            .collect()
    }
}

#[async_trait::async_trait]
impl RangeSource for ScriptedSource {
    async fn content_length(&self, _url: &str) -> std::result::Result<u64, TransferError> {
        match self.probe_status {
            Some(status) => Err(TransferError::UnexpectedStatus {
                status,
                expected: 206,
            }),
            None => Ok(self.body.len() as u64),
        }
    }

    async fn open_range(
        &self,
        url: &str,
        first: u64,
        last: u64,
    ) -> std::result::Result<ByteStream, TransferError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), first, last));

        let (open_delay, chunk_delay, failure, always_fail) = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(url.to_string()).or_default();
            (
                script.open_delay,
                script.chunk_delay,
                script.failures.pop_front(),
                script.always_fail,
            )
        };

        if !open_delay.is_zero() {
            tokio::time::sleep(open_delay).await;
        }
        if always_fail {
            return Err(TransferError::Stream("connection refused".to_string()));
        }

        let mut range = self.body.slice(first as usize..=last as usize);
        let mut cut = false;
        match failure {
            Some(Failure::Status(status)) => {
                return Err(TransferError::UnexpectedStatus {
                    status,
                    expected: 206,
                });
            }
            Some(Failure::CutAfter(n)) if (n as usize) < range.len() => {
                range.truncate(n as usize);
                cut = true;
            }
            _ => {}
        }

        let mut items: Vec<std::result::Result<Bytes, TransferError>> = range
            .chunks(self.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if cut {
            items.push(Err(TransferError::Stream(
                "connection reset by peer".to_string(),
            )));
        }

        Ok(futures::stream::iter(items)
            .then(move |item| async move {
                if !chunk_delay.is_zero() {
                    tokio::time::sleep(chunk_delay).await;
                }
                item
            })
            .boxed())
    }
}

/// Deterministic pseudo-random body; misplaced bytes cannot go unnoticed
pub(super) fn test_body(len: usize) -> Bytes {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x6d69_7272);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    Bytes::from(data)
}

pub(super) fn mirrors(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("http://mirror-{i}.test/file.bin"))
        .collect()
}

/// Defaults with short delays so failure paths finish quickly
pub(super) fn test_config() -> Config {
    let mut config = Config::default();
    config.segment.retry_delay = Duration::from_millis(10);
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.jitter = false;
    config.progress.interval = Duration::from_millis(50);
    config.disk_space.enabled = false;
    config
}

/// Downloader over `source` that records every positional write
pub(super) fn test_downloader(config: Config, source: Arc<ScriptedSource>) -> Downloader {
    let mut downloader = Downloader::with_source(config, source).unwrap();
    downloader.write_log = Some(Arc::new(Mutex::new(Vec::new())));
    downloader
}

/// Everything currently buffered on `rx`
pub(super) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait (bounded) for the first event matching `predicate`
pub(super) async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    predicate: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// The file on disk equals `body` and every byte was written exactly once
pub(super) fn assert_complete(downloader: &Downloader, report: &DownloadReport, body: &Bytes) {
    let written = std::fs::read(&report.path).unwrap();
    assert_eq!(written.len(), body.len(), "file length");
    assert!(written == body.as_ref(), "file content differs from source");

    let mut coverage = vec![0u32; body.len()];
    let log = downloader.write_log.as_ref().unwrap().lock().unwrap();
    for &(_, offset, len) in log.iter().filter(|(job, _, _)| *job == report.id) {
        for count in &mut coverage[offset as usize..(offset + len) as usize] {
            *count += 1;
        }
    }
    if let Some(byte) = coverage.iter().position(|&count| count != 1) {
        panic!("byte {byte} was written {} times", coverage[byte]);
    }

    let sum: u64 = report.workers.iter().map(|w| w.bytes).sum();
    assert_eq!(sum, body.len() as u64, "bytes written across workers");
}

pub(super) fn request(mirror_count: usize, dir: &tempfile::TempDir) -> DownloadRequest {
    DownloadRequest::new(mirrors(mirror_count), dir.path().join("file.bin"))
}
