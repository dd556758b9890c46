//! Configuration validation.
//!
//! # Responsibilities
//! - Normalize free-form port text into a bounded port
//! - Check that the URL pattern compiles
//! - Validate value ranges (limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TriggerConfig → Result<ServerConfig, Vec<ConfigValidationError>>
//! - Runs before a config is handed to the server

use std::net::{IpAddr, SocketAddr};
use std::num::IntErrorKind;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{ServerConfig, TriggerConfig};
use crate::extract::{UrlValidator, ValidationError};

/// Why a port string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port must be a number between 1 and 65535")]
    NotANumber,

    #[error("port must be between 1 and 65535")]
    OutOfRange,
}

/// Parse a user-supplied port.
///
/// Surrounding whitespace is ignored. `0` and anything above `65535` are out
/// of range; everything that is not a non-negative integer is not a number.
pub fn normalize_port(text: &str) -> Result<u16, PortError> {
    let value = match text.trim().parse::<u64>() {
        Ok(value) => value,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => return Err(PortError::OutOfRange),
        Err(_) => return Err(PortError::NotANumber),
    };

    match u16::try_from(value) {
        Ok(0) | Err(_) => Err(PortError::OutOfRange),
        Ok(port) => Ok(port),
    }
}

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("server.port {value:?}: {source}")]
    Port { value: String, source: PortError },

    #[error("server.bind_ip {0:?} is not an IP address")]
    BindIp(String),

    #[error("server.pattern is not a valid regular expression: {0}")]
    Pattern(String),

    #[error("server.discovery.service_type must not be empty")]
    ServiceType,

    #[error("limits.{0} must be greater than zero")]
    Limit(&'static str),

    #[error("playback.command must name a program")]
    PlaybackCommand,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Validate a loaded configuration and produce the server configuration.
pub fn validate_config(config: &TriggerConfig) -> Result<ServerConfig, Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    let port = match normalize_port(&config.server.port.to_string()) {
        Ok(port) => Some(port),
        Err(source) => {
            errors.push(ConfigValidationError::Port {
                value: config.server.port.to_string(),
                source,
            });
            None
        }
    };

    let bind_ip = match config.server.bind_ip.trim().parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            errors.push(ConfigValidationError::BindIp(config.server.bind_ip.clone()));
            None
        }
    };

    if let Err(ValidationError::InvalidPattern(message)) =
        UrlValidator::new(&config.server.pattern).compile()
    {
        errors.push(ConfigValidationError::Pattern(message));
    }

    let discovery = config
        .server
        .discovery
        .as_ref()
        .filter(|discovery| discovery.enabled);
    if discovery.is_some_and(|d| d.service_type.trim().is_empty()) {
        errors.push(ConfigValidationError::ServiceType);
    }

    let limits = config.limits;
    if limits.max_head_bytes == 0 {
        errors.push(ConfigValidationError::Limit("max_head_bytes"));
    }
    if limits.max_body_bytes == 0 {
        errors.push(ConfigValidationError::Limit("max_body_bytes"));
    }
    if limits.max_connections == 0 {
        errors.push(ConfigValidationError::Limit("max_connections"));
    }

    if let Some(command) = &config.playback.command {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            errors.push(ConfigValidationError::PlaybackCommand);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ConfigValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    match (port, bind_ip) {
        (Some(port), Some(bind_ip)) if errors.is_empty() => {
            let mut server = ServerConfig::new(port, config.server.pattern.clone())
                .with_bind_ip(bind_ip)
                .with_limits(limits);
            if let Some(discovery) = discovery {
                server = server.with_discovery(discovery.clone());
            }
            if config.timeouts.read_secs > 0 {
                server = server.with_read_timeout(Duration::from_secs(config.timeouts.read_secs));
            }
            Ok(server)
        }
        _ => Err(errors),
    }
}
