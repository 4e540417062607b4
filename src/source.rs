//! Mirror access: content-length probe and ranged reads
//!
//! Workers never talk to reqwest directly; they go through [`RangeSource`]
//! so tests can script failures and record the ranges that were requested.

use crate::config::HttpConfig;
use crate::error::{Error, Result, TransferError};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};

/// Body of a ranged response, chunk by chunk
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, TransferError>>;

/// Abstraction over a mirror serving byte ranges, enabling testability.
#[async_trait::async_trait]
pub trait RangeSource: Send + Sync {
    /// Total size of the resource at `url`
    async fn content_length(&self, url: &str) -> std::result::Result<u64, TransferError>;

    /// Open the inclusive byte range `first..=last` of `url`
    async fn open_range(
        &self,
        url: &str,
        first: u64,
        last: u64,
    ) -> std::result::Result<ByteStream, TransferError>;
}

/// Production [`RangeSource`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpRangeSource {
    client: reqwest::Client,
}

impl HttpRangeSource {
    /// Build a client with the configured timeouts and User-Agent
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl RangeSource for HttpRangeSource {
    async fn content_length(&self, url: &str) -> std::result::Result<u64, TransferError> {
        // A one-byte range doubles as a HEAD that also proves range support
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let header = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .ok_or(TransferError::MissingLength)?
                    .to_str()
                    .map_err(|e| TransferError::InvalidContentRange(e.to_string()))?;
                let range = ContentRange::parse(header)?;
                range.total.ok_or(TransferError::MissingLength)
            }
            StatusCode::OK => response.content_length().ok_or(TransferError::MissingLength),
            other => Err(TransferError::UnexpectedStatus {
                status: other.as_u16(),
                expected: StatusCode::PARTIAL_CONTENT.as_u16(),
            }),
        }
    }

    async fn open_range(
        &self,
        url: &str,
        first: u64,
        last: u64,
    ) -> std::result::Result<ByteStream, TransferError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={first}-{last}"))
            .send()
            .await?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::UnexpectedStatus {
                status: response.status().as_u16(),
                expected: StatusCode::PARTIAL_CONTENT.as_u16(),
            });
        }

        // A mirror that ignores our offset would corrupt the file
        if let Some(header) = response.headers().get(CONTENT_RANGE) {
            let header = header
                .to_str()
                .map_err(|e| TransferError::InvalidContentRange(e.to_string()))?;
            let range = ContentRange::parse(header)?;
            if range.first != Some(first) {
                return Err(TransferError::InvalidContentRange(format!(
                    "requested offset {first}, mirror answered '{header}'"
                )));
            }
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed())
    }
}

/// Parsed `Content-Range` header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte served, `None` for `bytes */total`
    pub first: Option<u64>,
    /// Last byte served (inclusive)
    pub last: Option<u64>,
    /// Complete length, `None` when the server reports `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes first-last/total`, `bytes */total` or `bytes first-last/*`
    pub fn parse(header: &str) -> std::result::Result<Self, TransferError> {
        let invalid = || TransferError::InvalidContentRange(header.to_string());

        let spec = header.trim().strip_prefix("bytes").ok_or_else(invalid)?.trim();
        let (range, total) = spec.split_once('/').ok_or_else(invalid)?;

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().map_err(|_| invalid())?),
        };

        let (first, last) = match range.trim() {
            "*" => (None, None),
            r => {
                let (a, b) = r.split_once('-').ok_or_else(invalid)?;
                let a = a.trim().parse::<u64>().map_err(|_| invalid())?;
                let b = b.trim().parse::<u64>().map_err(|_| invalid())?;
                if b < a {
                    return Err(invalid());
                }
                (Some(a), Some(b))
            }
        };

        Ok(Self { first, last, total })
    }
}
