//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (generation, session spawn)
//!     → session.rs (read head, frame body, dispatch)
//!     → request.rs (parse method, path, headers)
//!     → [extract validates the body]
//!     → response.rs (status line, headers, body)
//!     → Send to client, close
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod session;

pub use request::{parse_head, ParseError, RequestHead};
pub use response::{Response, Status};
pub use server::{ServerError, ServerState, ServerStatus, TriggerServer};
pub use session::{RequestError, Session, PLAY_PATH};
