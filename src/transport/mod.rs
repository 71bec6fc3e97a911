//! WebSocket transport layer.
//!
//! This module turns an endpoint URL into one open, correlated channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Remote End     │
//! │                 │         WebSocket            │                 │
//! │  resolver       │                              │                 │
//! │  → racer        │◄────────────────────────────►│  automation     │
//! │  → Connection   │     ws:// or wss:// URL      │  endpoint       │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `resolve_candidates` - Expand the URL into candidate URLs
//! 2. `race` + `open_channel` - Open all candidates, keep the first to open
//! 3. `Connection` - Send commands, receive responses/events
//! 4. `Connection::close` - Close the channel, fail pending waiters
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Opening one WebSocket channel |
//! | `connection` | Event loop and response correlation |
//! | `options` | Channel configuration |
//! | `racer` | First-to-open race across candidates |
//! | `resolver` | Candidate URL expansion |

// ============================================================================
// Submodules
// ============================================================================

/// Opening one WebSocket channel.
pub mod channel;

/// WebSocket connection and event loop.
pub mod connection;

/// Channel configuration options.
pub mod options;

/// First-to-open race across candidates.
pub mod racer;

/// Candidate URL expansion.
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{WsChannel, open_channel};
pub use connection::{Connection, DEFAULT_COMMAND_TIMEOUT, EventHandler};
pub use options::{ChannelOptions, DEFAULT_CONNECT_TIMEOUT};
pub use racer::{Winner, race};
pub use resolver::{FamilyLookup, Resolver, StaticResolver, SystemResolver, resolve_candidates};
