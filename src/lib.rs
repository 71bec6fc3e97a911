//! Bidirectional remote-protocol session client.
//!
//! This library connects to a WebDriver-BiDi style remote end over a
//! WebSocket, sends JSON commands and correlates their responses.
//!
//! # Architecture
//!
//! The client follows a request/response model with unsolicited events:
//!
//! - **Local End (Rust)**: Sends `{id, method, params}` commands
//! - **Remote End**: Answers each command by `id`, emits `{method, params}` events
//!
//! Key design principles:
//!
//! - A [`Session`] owns at most one channel at a time
//! - A host name expands into several candidate addresses, raced in parallel
//! - Each command gets a fresh identifier from a counter that is never reset
//! - Oversized script sources and binary results are summarized in logs
//!
//! # Quick Start
//!
//! ```no_run
//! use bidi_session::{Command, Result, Session};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .endpoint("ws://127.0.0.1:9222/session")
//!         .build()?;
//!
//!     session.connect().await?;
//!
//!     let tree = session
//!         .send(Command::new("browsingContext.getTree", json!({})))
//!         .await?;
//!     println!("Contexts: {tree}");
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`Session`] lifecycle and configuration |
//! | [`diagnostics`] | Log-safe payload summaries |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types |
//! | [`transport`] | Resolution, connection race and correlation |

// ============================================================================
// Modules
// ============================================================================

/// Log-safe summaries of protocol payloads.
pub mod diagnostics;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket protocol message types.
///
/// Defines command/response/event structures.
pub mod protocol;

/// Session lifecycle.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// WebSocket transport layer.
///
/// Candidate resolution, the connection race and the correlating event loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{ConnectionState, Endpoint, Session, SessionBuilder};

// Protocol types
pub use protocol::{Command, Event, Request, Response, SessionEvent};

// Transport types
pub use transport::{ChannelOptions, Resolver, StaticResolver, SystemResolver};

// Error types
pub use error::{CandidateFailure, Error, Result};

// Identifier types
pub use identifiers::CommandId;
