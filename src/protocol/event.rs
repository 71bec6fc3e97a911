//! Event message types.
//!
//! Events are unsolicited records sent by the remote end. They carry no
//! `id` and bypass response correlation entirely.
//!
//! # Inbound Classification
//!
//! | Shape | Classified as |
//! |-------|---------------|
//! | object with non-null `id` | [`Inbound::Response`] |
//! | object with a valid `id` but an invalid body | [`Inbound::InvalidResponse`] |
//! | object without `id` | [`Inbound::Event`], whatever else it holds |
//! | anything else | malformed, discarded by the caller |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_str, from_value};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::{Request, Response};

// ============================================================================
// Event
// ============================================================================

/// An event notification from remote end to local end.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "method": "module.eventName",
///   "params": { ... }
/// }
/// ```
///
/// Any id-less record is an event, including error records the remote end
/// could not tie to a command. `raw` keeps the record exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name in `module.eventName` format. Empty unless the record
    /// has a string `method`.
    pub method: String,

    /// Event-specific data, or null.
    pub params: Value,

    /// The full record.
    pub raw: Value,
}

impl Event {
    /// Wraps an id-less record.
    #[must_use]
    pub fn from_record(raw: Value) -> Self {
        let method = raw
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = raw.get("params").cloned().unwrap_or(Value::Null);

        Self {
            method,
            params,
            raw,
        }
    }

    /// Returns `true` for an error record without a command id.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.raw.get("error").is_some()
            || self.raw.get("type").and_then(Value::as_str) == Some("error")
    }

    /// Returns the module name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "log.entryAdded".into(), .. };
    /// assert_eq!(event.module(), "log");
    /// ```
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// A parsed inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Correlated response to a command.
    Response(Response),
    /// Unsolicited protocol event.
    Event(Event),
    /// A record with a valid command id whose body is not a valid response.
    InvalidResponse {
        /// Command the record claims to answer.
        id: CommandId,
        /// Why the body was rejected.
        reason: String,
    },
}

impl Inbound {
    /// Parses raw inbound text.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not valid JSON or the record is malformed
    /// - [`Error::Protocol`] if the record is not a JSON object
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_value(from_str(text)?)
    }

    /// Classifies an already-parsed JSON record.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the `id` is not a valid command id
    /// - [`Error::Protocol`] if the record is not a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::protocol("inbound message is not a JSON object"));
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => return Ok(Self::Event(Event::from_record(value))),
            Some(id) => from_value::<CommandId>(id.clone()),
        };

        match (from_value::<Response>(value), id) {
            (Ok(response), _) => Ok(Self::Response(response)),
            (Err(e), Ok(id)) => Ok(Self::InvalidResponse {
                id,
                reason: e.to_string(),
            }),
            (Err(_), Err(e)) => Err(e.into()),
        }
    }
}

// ============================================================================
// SessionEvent
// ============================================================================

/// Notification delivered to session observers.
///
/// Every command written to the channel, every correlated result and every
/// protocol event is published, in the order the session handled them.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A command was handed to the channel.
    CommandSent(Request),
    /// A response arrived for a command, matched or not.
    ResultReceived(Response),
    /// An unsolicited protocol event arrived.
    Event(Event),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_event_module_and_name() {
        let event = Event::from_record(json!({
            "method": "browsingContext.contextCreated",
            "params": {},
        }));
        assert_eq!(event.module(), "browsingContext");
        assert_eq!(event.event_name(), "contextCreated");
    }

    #[test]
    fn test_event_without_method() {
        let event = Event::from_record(json!({}));
        assert_eq!(event.module(), "");
        assert_eq!(event.event_name(), "");
    }

    #[test]
    fn test_record_with_id_is_response() {
        let inbound = Inbound::parse(r#"{"id": 5, "type": "success", "result": {}}"#).expect("parse");
        assert!(matches!(inbound, Inbound::Response(r) if r.id.get() == 5));
    }

    #[test]
    fn test_record_without_id_is_event() {
        let inbound = Inbound::parse(
            r#"{"type": "event", "method": "log.entryAdded", "params": {"text": "hi"}}"#,
        )
        .expect("parse");

        match inbound {
            Inbound::Event(event) => {
                assert_eq!(event.method, "log.entryAdded");
                assert_eq!(event.params, json!({ "text": "hi" }));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_null_id_is_event() {
        let inbound = Inbound::parse(r#"{"id": null, "method": "x.y"}"#).expect("parse");
        assert!(matches!(inbound, Inbound::Event(_)));
    }

    #[test]
    fn test_malformed_inputs_are_errors() {
        assert!(matches!(Inbound::parse("not json"), Err(Error::Json(_))));
        assert!(matches!(Inbound::parse("[1, 2]"), Err(Error::Protocol { .. })));
        assert!(matches!(Inbound::parse(r#"{"id": "abc"}"#), Err(Error::Json(_))));
    }

    #[test]
    fn test_idless_error_record_is_kept_whole() {
        let record = json!({
            "type": "error",
            "id": null,
            "error": "invalid argument",
            "message": "bad command",
        });

        match Inbound::from_value(record.clone()).expect("classify") {
            Inbound::Event(event) => {
                assert!(event.is_error());
                assert_eq!(event.method, "");
                assert_eq!(event.raw, record);
                assert_eq!(event.raw["message"], "bad command");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_non_string_method_is_still_an_event() {
        let inbound = Inbound::parse(r#"{"method": 5, "params": {"a": 1}}"#).expect("parse");

        match inbound {
            Inbound::Event(event) => {
                assert_eq!(event.method, "");
                assert_eq!(event.params, json!({ "a": 1 }));
                assert_eq!(event.raw["method"], 5);
                assert!(!event.is_error());
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_id_with_invalid_body_keeps_id() {
        let inbound =
            Inbound::parse(r#"{"id": 1, "type": "error", "error": {"code": 7}, "message": "bad"}"#)
                .expect("parse");

        match inbound {
            Inbound::InvalidResponse { id, reason } => {
                assert_eq!(id.get(), 1);
                assert!(!reason.is_empty());
            }
            other => panic!("expected invalid response, got {other:?}"),
        }
    }
}
