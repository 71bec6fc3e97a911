//! Command, Request and Response message types.
//!
//! Defines the message format for command requests and correlated
//! responses between the local end (Rust) and the remote end.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Command
// ============================================================================

/// An outbound command: a method name and its parameter payload.
///
/// The crate does not interpret either field. Method names conventionally
/// follow the `module.methodName` format (`browsingContext.create`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    /// Method name in `module.methodName` format.
    pub method: String,

    /// Parameter object.
    pub params: Value,
}

impl Command {
    /// Creates a command with the given method and params.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Creates a command with an empty parameter object.
    #[inline]
    #[must_use]
    pub fn without_params(method: impl Into<String>) -> Self {
        Self::new(method, Value::Object(Map::new()))
    }
}

// ============================================================================
// Request
// ============================================================================

/// A command with its assigned identifier, as written to the channel.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "method": "module.methodName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Identifier for request/response correlation.
    pub id: CommandId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Creates a request for the given command.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, command: Command) -> Self {
        Self { id, command }
    }

    /// Returns the method name.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.command.method
    }

    /// Returns the parameter payload.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.command.params
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the remote end, correlated by `id`.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 1, "type": "success", "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// {
///   "id": 1,
///   "type": "error",
///   "error": "no such frame",
///   "message": "...",
///   "stacktrace": "..."
/// }
/// ```
///
/// A response is an error if it carries an `error` field or its `type`
/// is `"error"`. The `type` field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Response type marker (`success` or `error`), if sent.
    #[serde(rename = "type", default)]
    pub response_type: Option<String>,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error kind (if error).
    #[serde(default)]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default)]
    pub message: Option<String>,

    /// Remote stack trace (if error).
    #[serde(default)]
    pub stacktrace: Option<String>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.response_type.as_deref() == Some("error")
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Extracts the result value, composing a remote error if the response
    /// was an error.
    ///
    /// # Arguments
    ///
    /// * `method` - Method of the command this response answers
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response was an error.
    pub fn into_result(self, method: &str) -> Result<Value> {
        if !self.is_error() {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        let kind = self.error.unwrap_or_else(|| "unknown error".to_string());
        let message = self.message.unwrap_or_else(|| kind.clone());
        let stacktrace = self
            .stacktrace
            .as_deref()
            .map(format_stacktrace)
            .filter(|stack| !stack.is_empty());

        Err(Error::remote(method, self.id, kind, message, stacktrace))
    }
}

// ============================================================================
// Stack Trace Formatting
// ============================================================================

/// Reformats a remote stack trace into indented `at` frames.
///
/// Remote ends send traces either as `fn@file:line:col` lines or as
/// already-prefixed `at ...` lines; both come out as `    at <frame>`.
#[must_use]
pub fn format_stacktrace(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let frame = line.strip_prefix("at ").unwrap_or(line);
            format!("    at {frame}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
