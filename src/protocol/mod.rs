//! WebSocket protocol message types.
//!
//! This module defines the message format for communication between
//! local end (Rust) and remote end.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Command with assigned id |
//! | `Response` | Remote → Local | Result or error for an id |
//! | `Event` | Remote → Local | Unsolicited notification (no id) |
//!
//! # Command Naming
//!
//! Commands follow `module.methodName` format:
//!
//! - `browsingContext.create`
//! - `script.callFunction`
//! - `session.subscribe`
//!
//! The crate carries method names and params opaquely.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event, inbound classification, observer notifications |
//! | `request` | Command, Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Event message types.
pub mod event;

/// Command, Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{Event, Inbound, SessionEvent};
pub use request::{Command, Request, Response, format_stacktrace};
