//! Session lifecycle.
//!
//! This module provides the main entry point for talking to a remote end.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Connection lifecycle and command dispatch |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`Endpoint`] | Validated endpoint URL plus channel options |
//! | [`ConnectionState`] | Disconnected, connecting or connected |
//!
//! # Example
//!
//! ```no_run
//! use bidi_session::{Command, Result, Session};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::builder()
//!     .endpoint("ws://127.0.0.1:9222/session")
//!     .build()?;
//!
//! session.connect().await?;
//! session.send(Command::without_params("session.status")).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for session configuration.
pub mod builder;

/// Core session implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_EVENT_CAPACITY, SessionBuilder};
pub use core::{ConnectionState, Endpoint, Session};
