//! Error types for the session client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use bidi_session::{Command, Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let tree = session
//!         .send(Command::new("browsingContext.getTree", serde_json::json!({})))
//!         .await?;
//!     println!("{tree}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::AllCandidatesFailed`], [`Error::ConnectionClosed`] |
//! | Session | [`Error::NotConnected`] |
//! | Command | [`Error::Remote`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// CandidateFailure
// ============================================================================

/// Why a single connection candidate failed to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// The candidate URL that was attempted.
    pub url: String,
    /// Description of the failure.
    pub cause: String,
}

impl CandidateFailure {
    /// Creates a candidate failure record.
    #[inline]
    pub fn new(url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cause: cause.into(),
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the endpoint or channel options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// A single channel attempt failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// A single channel attempt did not open within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Every connection candidate failed before any opened.
    #[error("{}", describe_failures(.failures))]
    AllCandidatesFailed {
        /// Per-candidate causes, in completion order.
        failures: Vec<CandidateFailure>,
    },

    /// The channel closed while a command was waiting for its response.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A command was issued without an active channel.
    #[error("Session is not connected: no active channel")]
    NotConnected,

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// The remote end answered a command with an error record.
    #[error(
        "Command \"{method}\" (id {id}) failed with error: {kind} - {message}{}",
        stack_suffix(.stacktrace)
    )]
    Remote {
        /// Method of the failed command.
        method: String,
        /// Identifier of the failed command.
        id: CommandId,
        /// Remote error kind (e.g. `no such frame`).
        kind: String,
        /// Remote error message.
        message: String,
        /// Reformatted remote stack trace, if one was sent.
        stacktrace: Option<String>,
    },

    /// No response arrived within the command deadline.
    #[error("Command \"{method}\" (id {id}) with params {params} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Method of the timed-out command.
        method: String,
        /// Identifier of the timed-out command.
        id: CommandId,
        /// Parameters the command was sent with.
        params: Value,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or unexpected response shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Display Helpers
// ============================================================================

fn describe_failures(failures: &[CandidateFailure]) -> String {
    if failures.is_empty() {
        return "Connection failed: no candidates to connect to".to_string();
    }

    let mut out = format!(
        "Could not connect to any of {} candidate(s):",
        failures.len()
    );
    for failure in failures {
        let _ = write!(out, "\n  - {}: {}", failure.url, failure.cause);
    }
    out
}

fn stack_suffix(stacktrace: &Option<String>) -> String {
    match stacktrace {
        Some(stack) if !stack.is_empty() => format!("\n{stack}"),
        _ => String::new(),
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an aggregated candidate failure error.
    #[inline]
    pub fn all_candidates_failed(failures: Vec<CandidateFailure>) -> Self {
        Self::AllCandidatesFailed { failures }
    }

    /// Creates a remote command error.
    #[inline]
    pub fn remote(
        method: impl Into<String>,
        id: CommandId,
        kind: impl Into<String>,
        message: impl Into<String>,
        stacktrace: Option<String>,
    ) -> Self {
        Self::Remote {
            method: method.into(),
            id,
            kind: kind.into(),
            message: message.into(),
            stacktrace,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(
        method: impl Into<String>,
        id: CommandId,
        params: Value,
        timeout_ms: u64,
    ) -> Self {
        Self::RequestTimeout {
            method: method.into(),
            id,
            params,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::AllCandidatesFailed { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the remote end rejected the command.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. Retrying is left to the caller.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::AllCandidatesFailed { .. }
                | Self::RequestTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    use serde_json::json;

    fn id(raw: u64) -> CommandId {
        CommandId::new(raw).expect("non-zero id")
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing endpoint");
        assert_eq!(err.to_string(), "Configuration error: missing endpoint");
    }

    #[test]
    fn test_aggregated_failures_list_every_candidate() {
        let err = Error::all_candidates_failed(vec![
            CandidateFailure::new("ws://example.test:9222/session", "dns error"),
            CandidateFailure::new("ws://10.0.0.1:9222/session", "connection refused"),
        ]);

        let text = err.to_string();
        assert!(text.contains("2 candidate(s)"));
        assert!(text.contains("ws://example.test:9222/session: dns error"));
        assert!(text.contains("ws://10.0.0.1:9222/session: connection refused"));
    }

    #[test]
    fn test_empty_race_message() {
        let err = Error::all_candidates_failed(Vec::new());
        assert!(err.to_string().contains("no candidates"));
    }

    #[test]
    fn test_remote_error_embeds_kind_message_and_stack() {
        let err = Error::remote(
            "browsingContext.navigate",
            id(3),
            "unknown error",
            "navigation failed",
            Some("    at navigate (bidi.js:10:5)".to_string()),
        );

        let text = err.to_string();
        assert!(text.starts_with(
            "Command \"browsingContext.navigate\" (id 3) failed with error: unknown error - navigation failed"
        ));
        assert!(text.ends_with("\n    at navigate (bidi.js:10:5)"));
        assert!(err.is_remote());
    }

    #[test]
    fn test_remote_error_without_stack() {
        let err = Error::remote("session.status", id(1), "invalid argument", "bad", None);
        assert!(!err.to_string().contains('\n'));
    }

    #[test]
    fn test_request_timeout_names_command() {
        let err = Error::request_timeout(
            "browsingContext.create",
            id(9),
            json!({ "type": "tab" }),
            60_000,
        );

        let text = err.to_string();
        assert!(text.contains("browsingContext.create"));
        assert!(text.contains("id 9"));
        assert!(text.contains(r#"{"type":"tab"}"#));
        assert!(text.contains("60000ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
        assert!(!Error::protocol("test").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
