//! Media URL extraction subsystem.
//!
//! # Data Flow
//! ```text
//! request body (UTF-8)
//!     → validator.rs (compile pattern, first match, URL parse)
//!     → cache.rs (reuse compiled patterns by exact string)
//!     → Url handed to the playback sink
//! ```

pub mod cache;
pub mod validator;

pub use cache::PatternCache;
pub use validator::{UrlValidator, ValidationError};
