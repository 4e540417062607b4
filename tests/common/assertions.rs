//! Custom test assertions for integration tests

use mirror_dl::{Event, JobId};
use std::path::Path;
use std::time::Duration;

/// How a job ended, as seen on the event channel
#[derive(Debug)]
pub enum WaitResult {
    /// Job completed successfully
    Completed,
    /// Job failed with this code
    Failed(String),
    /// Job was cancelled
    Cancelled,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for `id` to reach a terminal event (Completed, Failed or Cancelled)
pub async fn wait_for_terminal(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::Failed {
                    id: event_id, code, ..
                }) if event_id == id => {
                    return WaitResult::Failed(code);
                }
                Ok(Event::Cancelled { id: event_id }) if event_id == id => {
                    return WaitResult::Cancelled;
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Everything already buffered on the receiver
pub fn drain_events(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Assert the file at `path` has exactly `expected` as content
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let actual = std::fs::read(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    assert_eq!(actual.len(), expected.len(), "length of {}", path.display());
    if let Some(offset) = actual.iter().zip(expected).position(|(a, b)| a != b) {
        panic!("{} differs from the source at byte {offset}", path.display());
    }
}

/// Lowercase hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
