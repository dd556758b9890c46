//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command-line overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (port normalization, pattern compile, ranges)
//!     → ServerConfig (validated, immutable)
//!     → TriggerServer::restart
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ServerConfig sent to the main loop
//!     → TriggerServer::restart
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - An invalid reload keeps the running configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, resolve_config, ConfigError};
pub use schema::{
    DiscoveryConfig, LimitsConfig, Overrides, PortValue, ServerConfig, TriggerConfig,
};
pub use validation::{normalize_port, ConfigValidationError, PortError};
