//! File digests for post-download verification
//!
//! Digests are computed off the async runtime by callers (see
//! `downloader::job`), reading the file in fixed-size blocks.

use crate::error::{Error, Result};
use crate::types::{ChecksumAlgorithm, ExpectedChecksum};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BLOCK: usize = 64 * 1024;

/// Lowercase hex digest of an in-memory buffer
pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Lowercase hex digest of the file at `path`
pub fn digest_file(algorithm: ChecksumAlgorithm, path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = vec![0u8; READ_BLOCK];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                context.consume(&buffer[..n]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

/// Hash `path` and compare against `expected`, returning the computed digest
pub fn verify_file(path: &Path, expected: &ExpectedChecksum) -> Result<String> {
    let actual = digest_file(expected.algorithm, path)?;
    let wanted = expected.digest.trim().to_ascii_lowercase();

    if actual != wanted {
        return Err(Error::ChecksumMismatch {
            expected: wanted,
            actual,
        });
    }
    Ok(actual)
}
