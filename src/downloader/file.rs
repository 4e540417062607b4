//! Destination file handling: pre-sizing and positional writes.
//!
//! Every worker writes into the same `std::fs::File` through positional writes
//! (`pwrite` on Unix, `seek_write` on Windows). These take `&self`, so workers
//! never contend on a file cursor; the segment table guarantees their byte
//! ranges never overlap.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix `pwrite`.
#[cfg(unix)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix `pwrite`.
#[cfg(windows)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn write_all_at(_file: &std::fs::File, _buf: &[u8], _offset: u64) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "positional writes not supported on this platform",
    ))
}

/// Create (or truncate) `path` and size it to exactly `len` bytes.
///
/// Parent directories are created as needed.
pub(crate) async fn create_presized(path: &Path, len: u64) -> std::io::Result<Arc<std::fs::File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(len)?;
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)??;

    Ok(Arc::new(file))
}

/// Write `data` at `offset` on the blocking pool.
pub(crate) async fn write_at(
    file: &Arc<std::fs::File>,
    data: Bytes,
    offset: u64,
) -> std::io::Result<()> {
    let file = Arc::clone(file);
    tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
        .await
        .map_err(std::io::Error::other)?
}

/// Flush file contents and metadata to disk.
pub(crate) async fn sync(file: &Arc<std::fs::File>) -> std::io::Result<()> {
    let file = Arc::clone(file);
    tokio::task::spawn_blocking(move || file.sync_all())
        .await
        .map_err(std::io::Error::other)?
}
