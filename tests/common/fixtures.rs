//! Mock mirrors serving byte ranges of an in-memory body

use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path every mock mirror serves the file under
pub const FILE_PATH: &str = "/pub/file.bin";

/// Deterministic content with no short period, so misplaced ranges show up
pub fn generate_body(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// Answers `Range: bytes=a-b` with 206 and the matching slice
///
/// Without a Range header (or with `ignore_ranges`) the whole body is sent
/// with 200, like a server that does not support ranges.
pub struct RangeResponder {
    body: Vec<u8>,
    delay: Option<Duration>,
    ignore_ranges: bool,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            delay: None,
            ignore_ranges: false,
        }
    }

    /// Hold every response back for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Always answer 200 with the full body
    pub fn ignoring_ranges(mut self) -> Self {
        self.ignore_ranges = true;
        self
    }

    fn parse_range(&self, request: &Request) -> Option<(usize, usize)> {
        let header = request.headers.get("range")?.to_str().ok()?;
        let spec = header.strip_prefix("bytes=")?;
        let (first, last) = spec.split_once('-')?;
        let first: usize = first.trim().parse().ok()?;
        let last: usize = match last.trim() {
            "" => self.body.len().checked_sub(1)?,
            value => value.parse().ok()?,
        };
        let last = last.min(self.body.len().checked_sub(1)?);
        (first <= last).then_some((first, last))
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = if self.ignore_ranges {
            None
        } else {
            self.parse_range(request)
        };

        let template = match range {
            Some((first, last)) => ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {first}-{last}/{}", self.body.len()).as_str(),
                )
                .set_body_bytes(self.body[first..=last].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        };

        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

/// Start a mirror serving `responder` under [`FILE_PATH`]
pub async fn start_mirror(responder: RangeResponder) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

/// Start `count` healthy mirrors serving `body`
pub async fn start_mirrors(body: &[u8], count: usize) -> Vec<MockServer> {
    let mut servers = Vec::with_capacity(count);
    for _ in 0..count {
        servers.push(start_mirror(RangeResponder::new(body.to_vec())).await);
    }
    servers
}

/// URL of the file on `server`
pub fn mirror_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), FILE_PATH)
}

/// `Range` headers `server` received, in arrival order
pub async fn received_ranges(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| {
            request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}
