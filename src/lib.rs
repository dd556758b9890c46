//! HTTP play trigger library.
//!
//! Listens on one TCP port for `POST /play`, finds a media URL in the body
//! with a configurable pattern and hands it to a playback sink.

pub mod config;
pub mod discovery;
pub mod extract;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod playback;

pub use config::schema::{ServerConfig, TriggerConfig};
pub use extract::{UrlValidator, ValidationError};
pub use http::{ServerStatus, TriggerServer};
pub use lifecycle::Shutdown;
pub use playback::PlaybackSink;
