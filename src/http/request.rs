//! Request head parsing.
//!
//! # Responsibilities
//! - Split the request line into method and path
//! - Collect headers into a case-insensitive map
//!
//! # Design Decisions
//! - Pure text → structure; sockets are handled by the session
//! - Header names are lowercased on insert and on lookup
//! - A repeated header overwrites the earlier value

use std::collections::HashMap;

use thiserror::Error;

/// Why a request head was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Request line is empty.")]
    EmptyRequestLine,

    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),
}

/// Method, path and headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl RequestHead {
    pub fn new(method: impl Into<String>, path: impl Into<String>, headers: HashMap<String, String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            method: method.into(),
            path: path.into(),
            headers,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Parse the text preceding the `\r\n\r\n` boundary.
pub fn parse_head(raw: &str) -> Result<RequestHead, ParseError> {
    let mut lines = raw.split("\r\n");

    let request_line = match lines.next() {
        Some(line) if !line.is_empty() => line,
        _ => return Err(ParseError::EmptyRequestLine),
    };

    let mut parts = request_line.split(' ').filter(|part| !part.is_empty());
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => return Err(ParseError::InvalidRequestLine(request_line.to_string())),
    };

    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(RequestHead::new(method, path, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_head() {
        let head = parse_head("POST /play HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10").unwrap();
        assert_eq!(head.method(), "POST");
        assert_eq!(head.path(), "/play");
        assert_eq!(head.header("host"), Some("localhost"));
        assert_eq!(head.header("Host"), Some("localhost"));
        assert_eq!(head.header("content-length"), Some("10"));
        assert_eq!(head.header("CONTENT-LENGTH"), Some("10"));
        assert_eq!(head.header("accept"), None);
    }

    #[test]
    fn tolerates_trailing_boundary() {
        let head = parse_head("POST /play HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        assert_eq!(head.header("host"), Some("localhost"));
    }

    #[test]
    fn rejects_missing_path() {
        assert_eq!(parse_head("POST"), Err(ParseError::InvalidRequestLine("POST".into())));
        assert_eq!(
            parse_head("POST\r\n\r\n"),
            Err(ParseError::InvalidRequestLine("POST".into()))
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse_head(""), Err(ParseError::EmptyRequestLine));
        assert_eq!(parse_head("\r\nHost: x"), Err(ParseError::EmptyRequestLine));
    }

    #[test]
    fn rejects_header_without_colon() {
        assert_eq!(
            parse_head("POST /play HTTP/1.1\r\nContent-Length 10"),
            Err(ParseError::MalformedHeader("Content-Length 10".into()))
        );
    }

    #[test]
    fn version_is_optional() {
        let head = parse_head("GET /play").unwrap();
        assert_eq!(head.method(), "GET");
        assert_eq!(head.path(), "/play");
    }

    #[test]
    fn splits_value_at_first_colon() {
        let head = parse_head("POST /play HTTP/1.1\r\nHost:  cam.local:8554  ").unwrap();
        assert_eq!(head.header("host"), Some("cam.local:8554"));
    }

    #[test]
    fn later_duplicate_wins() {
        let head = parse_head("POST /play HTTP/1.1\r\nX-Cam: one\r\nx-cam: two").unwrap();
        assert_eq!(head.header("X-Cam"), Some("two"));
    }

    #[test]
    fn constructor_lowercases_names() {
        let mut headers = HashMap::new();
        headers.insert("Content-Length".to_string(), "3".to_string());
        let head = RequestHead::new("POST", "/play", headers);
        assert_eq!(head.header("content-length"), Some("3"));
    }
}
