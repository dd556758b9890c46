//! Media URL extraction.
//!
//! # Responsibilities
//! - Compile the user-supplied pattern
//! - Find the first (leftmost) match in a request body
//! - Parse the matched text as a URL with a scheme
//!
//! # Design Decisions
//! - The whole match is used, never a capture group
//! - No implicit anchoring: the pattern decides
//! - Compilation errors are values, not panics

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::extract::cache::PatternCache;

/// Why a body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The pattern does not compile; carries the engine's message.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Nothing in the body matched.
    #[error("no match")]
    NoMatch,

    /// The matched text is not an absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ValidationError {
    /// Text returned to the HTTP client.
    pub fn rejection_message(&self) -> String {
        match self {
            ValidationError::InvalidPattern(message) => format!("Invalid regex: {}", message),
            ValidationError::NoMatch => "No URL match.".to_string(),
            ValidationError::InvalidUrl(_) => "Matched text is not a valid URL.".to_string(),
        }
    }
}

/// Extracts a media URL from free-form text.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    pattern: String,
    cache: Option<Arc<PatternCache>>,
}

impl UrlValidator {
    /// A validator that compiles `pattern` on every call.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            cache: None,
        }
    }

    /// Reuse successful compilations from `cache`.
    pub fn with_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Compile the pattern.
    pub fn compile(&self) -> Result<Regex, ValidationError> {
        let compiled = match &self.cache {
            Some(cache) => cache.get_or_compile(&self.pattern),
            None => Regex::new(&self.pattern),
        };
        compiled.map_err(|e| ValidationError::InvalidPattern(e.to_string()))
    }

    pub fn is_pattern_valid(&self) -> bool {
        self.compile().is_ok()
    }

    /// Extract and parse the first URL in `body`.
    pub fn validate(&self, body: &str) -> Result<Url, ValidationError> {
        let regex = self.compile()?;

        let matched = regex.find(body).ok_or(ValidationError::NoMatch)?.as_str();

        match Url::parse(matched) {
            Ok(url) if !url.scheme().is_empty() => Ok(url),
            _ => Err(ValidationError::InvalidUrl(matched.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM_PATTERN: &str = r"(https?|rtsp)://[\w.-]+/stream";

    #[test]
    fn accepts_when_regex_matches_valid_url() {
        let body = "https://example.com/stream";
        let url = UrlValidator::new(STREAM_PATTERN).validate(body).unwrap();
        assert_eq!(url.as_str(), body);
    }

    #[test]
    fn accepts_rtsp_url_when_pattern_includes_rtsp() {
        let body = "rtsp://example.com/stream";
        let url = UrlValidator::new(STREAM_PATTERN).validate(body).unwrap();
        assert_eq!(url.as_str(), body);
        assert_eq!(url.scheme(), "rtsp");
    }

    #[test]
    fn rejects_when_regex_does_not_match() {
        let result = UrlValidator::new(r"https?://[\w.-]+/stream").validate("rtsp://example.com/stream");
        assert_eq!(result, Err(ValidationError::NoMatch));
    }

    #[test]
    fn detects_invalid_pattern() {
        let validator = UrlValidator::new("(");
        assert!(!validator.is_pattern_valid());
        let result = validator.validate("https://example.com/video");
        assert!(matches!(result, Err(ValidationError::InvalidPattern(ref m)) if !m.is_empty()));
    }

    #[test]
    fn rejects_when_match_is_not_a_url() {
        let result = UrlValidator::new("foo").validate("foo");
        assert_eq!(result, Err(ValidationError::InvalidUrl("foo".into())));
    }

    #[test]
    fn uses_whole_match_inside_larger_body() {
        let body = r#"{"event":"ring","snapshot":"http://cam.local/stream","clip":"http://cam.local/stream2"}"#;
        let url = UrlValidator::new(r"https?://[\w.-]+/stream").validate(body).unwrap();
        assert_eq!(url.as_str(), "http://cam.local/stream");
    }

    #[test]
    fn does_not_anchor_pattern() {
        let url = UrlValidator::new(r"rtsp://\S+").validate("doorbell rtsp://10.0.0.2/live now").unwrap();
        assert_eq!(url.as_str(), "rtsp://10.0.0.2/live");
    }

    #[test]
    fn cached_validation_behaves_identically() {
        let cache = Arc::new(PatternCache::new());
        let validator = UrlValidator::new(STREAM_PATTERN).with_cache(Arc::clone(&cache));
        let body = "https://example.com/stream";

        assert_eq!(validator.validate(body), UrlValidator::new(STREAM_PATTERN).validate(body));
        assert_eq!(validator.validate(body).unwrap().as_str(), body);

        let broken = UrlValidator::new("(").with_cache(cache);
        assert_eq!(broken.validate(body), UrlValidator::new("(").validate(body));
    }

    #[test]
    fn rejection_messages_name_the_case() {
        assert!(ValidationError::InvalidPattern("x".into())
            .rejection_message()
            .starts_with("Invalid regex: "));
        assert_eq!(ValidationError::NoMatch.rejection_message(), "No URL match.");
        assert_eq!(
            ValidationError::InvalidUrl("foo".into()).rejection_message(),
            "Matched text is not a valid URL."
        );
    }
}
