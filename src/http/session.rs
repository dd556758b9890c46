//! One accepted connection, from first byte to close.
//!
//! # Responsibilities
//! - Read until the head/body boundary, keeping any early body bytes
//! - Frame the body by `Content-Length`, discarding excess
//! - Dispatch `POST /play` to URL extraction and the playback sink
//! - Always answer (when possible) and always close
//!
//! # Design Decisions
//! - One request per connection: no keep-alive, no pipelining
//! - The sink is only called for requests answered with 200
//! - The generation's configuration is read at dispatch; a cleared slot means
//!   the server is shutting down and the answer is 500

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::schema::{LimitsConfig, ServerConfig};
use crate::extract::{PatternCache, UrlValidator};
use crate::http::request::{parse_head, ParseError, RequestHead};
use crate::http::response::Response;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::playback::PlaybackSink;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// The only endpoint.
pub const PLAY_PATH: &str = "/play";

/// Why a request could not be read.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid header encoding")]
    InvalidHeaderEncoding,

    #[error("missing content length")]
    MissingContentLength,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("content length exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("read timed out")]
    Timeout,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully framed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub head: RequestHead,
    pub body: Vec<u8>,
}

/// Handles exactly one connection.
pub struct Session {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    config: Arc<ArcSwapOption<ServerConfig>>,
    sink: Arc<dyn PlaybackSink>,
    patterns: Arc<PatternCache>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        config: Arc<ArcSwapOption<ServerConfig>>,
        sink: Arc<dyn PlaybackSink>,
        patterns: Arc<PatternCache>,
    ) -> Self {
        Self {
            id,
            peer: None,
            config,
            sink,
            patterns,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Drive the connection to completion and close it.
    pub async fn run<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = self.process(&mut stream).await;
        metrics::record_request(response.status().code());

        tracing::debug!(
            connection_id = %self.id,
            peer_addr = ?self.peer,
            status = response.status().code(),
            body = response.body(),
            "Sending response"
        );

        if let Err(e) = response.write_to(&mut stream).await {
            tracing::debug!(connection_id = %self.id, error = %e, "Failed to write response");
        }
        if let Err(e) = stream.shutdown().await {
            tracing::trace!(connection_id = %self.id, error = %e, "Shutdown after response failed");
        }
    }

    async fn process<S>(&self, stream: &mut S) -> Response
    where
        S: AsyncRead + Unpin,
    {
        let (limits, read_timeout) = match self.config.load_full() {
            Some(config) => (config.limits, config.read_timeout),
            None => return not_configured(),
        };

        match read_request(stream, &limits, read_timeout).await {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::error!(
                    connection_id = %self.id,
                    peer_addr = ?self.peer,
                    error = %e,
                    "Request handling error"
                );
                Response::bad_request(format!("Request error: {}", e))
            }
        }
    }

    /// Route a framed request and hand an accepted URL to the sink.
    pub fn dispatch(&self, request: Request) -> Response {
        let Request { head, body } = request;

        if !head.method().eq_ignore_ascii_case("POST") {
            return Response::method_not_allowed("Only POST supported.");
        }
        if head.path() != PLAY_PATH {
            return Response::not_found("Unknown endpoint.");
        }
        let Ok(body) = String::from_utf8(body) else {
            return Response::bad_request("Body must be UTF-8.");
        };
        let Some(config) = self.config.load_full() else {
            return not_configured();
        };

        let validator = UrlValidator::new(config.pattern.as_str()).with_cache(Arc::clone(&self.patterns));
        match validator.validate(&body) {
            Ok(url) => {
                tracing::info!(connection_id = %self.id, url = %url, "Accepted URL");
                metrics::record_playback();
                self.sink.handle(url);
                Response::ok("Playback starting.")
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %self.id,
                    pattern = validator.pattern(),
                    error = %e,
                    "Rejected request"
                );
                Response::bad_request(e.rejection_message())
            }
        }
    }
}

fn not_configured() -> Response {
    Response::internal_error("Server not configured.")
}

/// Read one request: head up to the boundary, then exactly `Content-Length`
/// body bytes. Bytes past the declared length are dropped.
pub async fn read_request<S>(
    stream: &mut S,
    limits: &LimitsConfig,
    read_timeout: Option<Duration>,
) -> Result<Request, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let boundary = loop {
        let scanned = buffer.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        let n = read_chunk(stream, &mut chunk, read_timeout).await?;
        if n == 0 {
            return Err(RequestError::ConnectionClosed);
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(offset) = find_terminator(&buffer[scanned..]) {
            break scanned + offset;
        }
        // The last bytes may still be the start of the terminator.
        let head_so_far = buffer.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        if head_so_far > limits.max_head_bytes {
            return Err(RequestError::HeadTooLarge(limits.max_head_bytes));
        }
    };
    if boundary > limits.max_head_bytes {
        return Err(RequestError::HeadTooLarge(limits.max_head_bytes));
    }

    let head_text = std::str::from_utf8(&buffer[..boundary]).map_err(|_| RequestError::InvalidHeaderEncoding)?;
    let head = parse_head(head_text)?;

    let content_length = head
        .header("Content-Length")
        .ok_or(RequestError::MissingContentLength)?
        .parse::<usize>()
        .map_err(|_| RequestError::InvalidContentLength)?;
    if content_length > limits.max_body_bytes {
        return Err(RequestError::BodyTooLarge(limits.max_body_bytes));
    }

    let mut body = buffer.split_off(boundary + HEAD_TERMINATOR.len());
    while body.len() < content_length {
        let n = read_chunk(stream, &mut chunk, read_timeout).await?;
        if n == 0 {
            return Err(RequestError::ConnectionClosed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Request { head, body })
}

async fn read_chunk<S>(stream: &mut S, chunk: &mut [u8], read_timeout: Option<Duration>) -> Result<usize, RequestError>
where
    S: AsyncRead + Unpin,
{
    match read_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.read(chunk))
            .await
            .map_err(|_| RequestError::Timeout)?
            .map_err(RequestError::from),
        None => Ok(stream.read(chunk).await?),
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}
