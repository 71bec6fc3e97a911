//! Log-safe summaries of protocol payloads.
//!
//! Script sources and binary-as-text results can run to megabytes. These
//! helpers build the string placed in a log field and never touch the
//! payload that goes over the wire or to a waiter.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::protocol::Request;

// ============================================================================
// Constants
// ============================================================================

/// Strings at or below this many characters are never treated as binary.
const BINARY_SUMMARY_THRESHOLD: usize = 64;

/// Name of a `function` declaration, including async and generator forms.
static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(").expect("invalid function name pattern")
});

/// Standard base64 alphabet with optional padding and line breaks.
static BASE64_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+/\r\n]+={0,2}$").expect("invalid base64 pattern")
});

// ============================================================================
// Commands
// ============================================================================

/// Returns the log representation of an outbound command's params.
///
/// `script.callFunction` declarations become `<Function[N bytes] name>` and
/// `script.addPreloadScript` declarations become `<PreloadScript[N bytes]>`.
/// Everything else is serialized as-is.
#[must_use]
pub fn summarize_command(request: &Request) -> String {
    let params = request.params();

    let replacement = match (request.method(), declaration(params)) {
        ("script.callFunction", Some(source)) => Some(format!(
            "<Function[{} bytes] {}>",
            source.len(),
            function_name(source).unwrap_or("anonymous")
        )),
        ("script.addPreloadScript", Some(source)) => {
            Some(format!("<PreloadScript[{} bytes]>", source.len()))
        }
        _ => None,
    };

    match replacement {
        Some(summary) => {
            let mut redacted = params.clone();
            redacted["functionDeclaration"] = Value::String(summary);
            redacted.to_string()
        }
        None => params.to_string(),
    }
}

fn declaration(params: &Value) -> Option<&str> {
    params.get("functionDeclaration").and_then(Value::as_str)
}

fn function_name(source: &str) -> Option<&str> {
    FUNCTION_NAME
        .captures(source)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}

// ============================================================================
// Inbound Messages
// ============================================================================

/// Returns the log representation of an inbound record.
///
/// A `result.data` string that looks like base64 and is longer than 64
/// characters is replaced with `<Binary[N chars]>`.
#[must_use]
pub fn summarize_message(message: &Value) -> String {
    let data_len = message
        .get("result")
        .and_then(|result| result.get("data"))
        .and_then(Value::as_str)
        .filter(|data| looks_binary(data))
        .map(str::len);

    match data_len {
        Some(len) => {
            let mut redacted = message.clone();
            redacted["result"]["data"] = Value::String(format!("<Binary[{len} chars]>"));
            redacted.to_string()
        }
        None => message.to_string(),
    }
}

fn looks_binary(text: &str) -> bool {
    text.len() > BINARY_SUMMARY_THRESHOLD && BASE64_TEXT.is_match(text)
}

// ============================================================================
// Tests
// ============================================================================
