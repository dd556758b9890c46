//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ServerConfig, TriggerConfig};
use crate::config::validation::{validate_config, ConfigValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ConfigValidationError>),
}

fn join_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document. Missing sections take their defaults.
pub fn parse_config(content: &str) -> Result<TriggerConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load a TOML file from disk.
pub fn load_config(path: &Path) -> Result<TriggerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Validate a loaded file into the configuration the server runs with.
pub fn resolve_config(config: &TriggerConfig) -> Result<ServerConfig, ConfigError> {
    validate_config(config).map_err(ConfigError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PortValue;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, PortValue::Number(9900));
        assert!(config.playback.command.is_none());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [server]
            bind_ip = "127.0.0.1"
            port = " 8080 "
            pattern = "rtsp://[\\w.-]+/live"

            [server.discovery]
            name = "Front door"
            txt = { path = "/play" }

            [limits]
            max_body_bytes = 4096

            [timeouts]
            read_secs = 10

            [playback]
            command = ["mpv", "--fs"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, PortValue::Text(" 8080 ".into()));
        let discovery = config.server.discovery.as_ref().unwrap();
        assert_eq!(discovery.name.as_deref(), Some("Front door"));
        assert_eq!(discovery.service_type, "_intercomblaster._tcp");
        assert_eq!(discovery.txt.len(), 1);
        assert_eq!(config.limits.max_body_bytes, 4096);
        assert_eq!(config.limits.max_head_bytes, 64 * 1024);

        let server = resolve_config(&config).unwrap();
        assert_eq!(server.port, 8080);
        assert_eq!(server.pattern, r"rtsp://[\w.-]+/live");
        assert_eq!(server.socket_addr().to_string(), "127.0.0.1:8080");
        assert!(server.discovery.is_some());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(parse_config("[server"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validation_errors_are_joined() {
        let config = parse_config("[server]\nport = 0\npattern = \"(\"").unwrap();
        let err = resolve_config(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed: server.port \"0\""));
        assert!(message.contains("server.pattern"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/play-trigger.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
