//! Configuration schema definitions.
//!
//! `TriggerConfig` mirrors the TOML file one-to-one and derives Serde traits.
//! `ServerConfig` is the validated, immutable form handed to
//! [`TriggerServer::restart`](crate::http::TriggerServer::restart).

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9900;

/// Default media URL pattern.
pub const DEFAULT_PATTERN: &str = r"(https?|rtsp)://.+";

/// Default DNS-SD service type.
pub const DEFAULT_SERVICE_TYPE: &str = "_intercomblaster._tcp";

/// Root configuration as read from disk.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TriggerConfig {
    /// Listener, pattern and discovery settings.
    pub server: ServerSection,

    /// Per-request size limits.
    pub limits: LimitsConfig,

    /// Socket timeouts.
    pub timeouts: TimeoutConfig,

    /// What to do with an accepted URL.
    pub playback: PlaybackConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind (e.g., "0.0.0.0").
    pub bind_ip: String,

    /// Port, either as an integer or as free-form text.
    pub port: PortValue,

    /// Regular expression locating the media URL inside a request body.
    pub pattern: String,

    /// Optional DNS-SD advertisement.
    pub discovery: Option<DiscoveryConfig>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED.to_string(),
            port: PortValue::Number(i64::from(DEFAULT_PORT)),
            pattern: DEFAULT_PATTERN.to_string(),
            discovery: None,
        }
    }
}

/// A port as written by the user. Normalized by
/// [`normalize_port`](crate::config::validation::normalize_port).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{}", n),
            PortValue::Text(s) => f.write_str(s),
        }
    }
}

/// DNS-SD record published alongside the bound port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Set to false to keep the section but skip publication.
    pub enabled: bool,

    /// Instance name. Defaults to the machine hostname.
    pub name: Option<String>,

    /// Service type, e.g. `_intercomblaster._tcp`.
    pub service_type: String,

    /// Domain. Defaults to `local`.
    pub domain: Option<String>,

    /// TXT metadata as `key=value` string pairs, the form `mdns-sd`
    /// publishes. Raw binary TXT values cannot be expressed here.
    pub txt: BTreeMap<String, String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let mut txt = BTreeMap::new();
        txt.insert("path".to_string(), "/play".to_string());
        txt.insert("proto".to_string(), "http".to_string());
        Self {
            enabled: true,
            name: None,
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            domain: None,
            txt,
        }
    }
}

/// Request size limits and connection backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request head, boundary excluded.
    pub max_head_bytes: usize,

    /// Largest accepted `Content-Length`.
    pub max_body_bytes: usize,

    /// Maximum concurrent sessions before accept waits.
    pub max_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: 64 * 1024,
            max_body_bytes: 1024 * 1024,
            max_connections: 256,
        }
    }
}

/// Socket timeouts.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-read timeout in seconds; 0 disables it.
    pub read_secs: u64,
}

/// `[playback]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player invocation; the URL is appended as the last argument.
    /// When unset, accepted URLs are only logged.
    pub command: Option<Vec<String>>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9901".to_string(),
        }
    }
}

/// Values given on the command line. They win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub pattern: Option<String>,
    pub no_discovery: bool,
}

impl Overrides {
    /// Apply the overrides on top of a loaded file.
    pub fn apply(&self, config: &mut TriggerConfig) {
        if let Some(port) = self.port {
            config.server.port = PortValue::Number(i64::from(port));
        }
        if let Some(pattern) = &self.pattern {
            config.server.pattern = pattern.clone();
        }
        if self.no_discovery {
            config.server.discovery = None;
        }
    }
}

/// Validated configuration of one listener generation.
///
/// Immutable once built; a restart replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub pattern: String,
    pub discovery: Option<DiscoveryConfig>,
    pub limits: LimitsConfig,
    pub read_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Configuration listening on all interfaces with default limits.
    pub fn new(port: u16, pattern: impl Into<String>) -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            pattern: pattern.into(),
            discovery: None,
            limits: LimitsConfig::default(),
            read_timeout: None,
        }
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Socket address the listener binds.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}
