//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → main loop stops the server → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
