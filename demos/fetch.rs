//! Fetch one file from several mirrors and print live progress
//!
//! Usage: cargo run --release --example fetch -- <destination> <url> [url...]
//!
//! Mirrors may also come from `MIRROR_DL_MIRRORS` (comma-separated) in .env,
//! with the expected digest in `MIRROR_DL_MD5`.

use mirror_dl::{Config, DownloadRequest, Downloader, Event, ExpectedChecksum};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let destination = args.next().unwrap_or_else(|| "download.bin".to_string());
    let mut mirrors: Vec<String> = args.collect();
    if mirrors.is_empty() {
        mirrors = std::env::var("MIRROR_DL_MIRRORS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
    }
    if mirrors.is_empty() {
        return Err("pass mirror URLs as arguments or set MIRROR_DL_MIRRORS".into());
    }

    println!("═══════════════════════════════════════════════════════════");
    println!("  mirror-dl fetch");
    println!("═══════════════════════════════════════════════════════════");
    for (idx, mirror) in mirrors.iter().enumerate() {
        println!("  Mirror {idx}: {mirror}");
    }
    println!("  Destination: {destination}");
    println!("═══════════════════════════════════════════════════════════");

    let downloader = Downloader::new(Config::default())?;

    let mut events = downloader.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Started { total_bytes, workers, .. } => {
                    println!("  Started: {total_bytes} bytes across {workers} workers");
                }
                Event::Progress {
                    percent,
                    speed_bps,
                    eta_secs,
                    ..
                } => {
                    let eta = eta_secs.map_or_else(|| "?".to_string(), |s| format!("{s}s"));
                    println!(
                        "  {percent:5.1}%  {:8.2} MB/s  eta {eta}",
                        speed_bps as f64 / 1_000_000.0
                    );
                }
                Event::WorkStolen {
                    thief,
                    victim,
                    start,
                    end,
                    ..
                } => {
                    println!("  Worker {thief} took {start}..{end} from worker {victim}");
                }
                Event::WorkerRetrying {
                    worker,
                    offset,
                    error,
                    ..
                } => {
                    println!("  Worker {worker} retrying at {offset}: {error}");
                }
                Event::Completed { .. } | Event::Failed { .. } | Event::Cancelled { .. } => break,
            }
        }
    });

    let mut request = DownloadRequest::new(mirrors, destination);
    if let Ok(md5) = std::env::var("MIRROR_DL_MD5") {
        request = request.with_checksum(ExpectedChecksum::md5(md5));
    }

    let started = Instant::now();
    let result = downloader.download(request).await;
    printer.await.ok();

    let report = result?;
    let secs = started.elapsed().as_secs_f64();
    println!("═══════════════════════════════════════════════════════════");
    println!("  Saved to {}", report.path.display());
    println!(
        "  {} bytes in {:.2}s ({:.2} MB/s)",
        report.total_bytes,
        secs,
        report.total_bytes as f64 / secs.max(f64::EPSILON) / 1_000_000.0
    );
    if let Some(digest) = &report.checksum {
        println!("  Checksum verified: {digest}");
    }
    for worker in &report.workers {
        println!(
            "  {}: {} bytes, {} steals, {} retries{}",
            worker.mirror,
            worker.bytes,
            worker.steals,
            worker.retries,
            if worker.gave_up { ", gave up" } else { "" }
        );
    }
    Ok(())
}
