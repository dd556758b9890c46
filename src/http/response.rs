//! Response encoding.
//!
//! Every response is plain text and closes the connection.

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Status codes this server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A status and a plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    body: String,
}

impl Response {
    pub fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(Status::Ok, body)
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, body)
    }

    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(Status::NotFound, body)
    }

    pub fn method_not_allowed(body: impl Into<String>) -> Self {
        Self::new(Status::MethodNotAllowed, body)
    }

    pub fn internal_error(body: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, body)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Wire form: status line, headers, blank line, body.
    pub fn encode(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\n",
            self.status,
            self.body.len()
        );
        let mut bytes = Vec::with_capacity(head.len() + self.body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }

    /// Write the encoded response and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_status_line_and_headers() {
        let encoded = String::from_utf8(Response::ok("Playback starting.").encode()).unwrap();
        assert_eq!(
            encoded,
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 18\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Connection: close\r\n\
             \r\n\
             Playback starting."
        );
    }

    #[test]
    fn content_length_counts_bytes() {
        let encoded = Response::bad_request("Ungültig").encode();
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
    }

    #[test]
    fn status_reasons() {
        assert_eq!(Status::NotFound.to_string(), "404 Not Found");
        assert_eq!(Status::MethodNotAllowed.to_string(), "405 Method Not Allowed");
        assert_eq!(Status::InternalServerError.to_string(), "500 Internal Server Error");
        assert!(Status::Ok.is_success());
        assert!(!Status::BadRequest.is_success());
    }

    #[tokio::test]
    async fn writes_to_stream() {
        let mut out = Vec::new();
        Response::not_found("Unknown endpoint.").write_to(&mut out).await.unwrap();
        assert!(out.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
        assert!(out.ends_with(b"\r\n\r\nUnknown endpoint."));
    }
}
