//! Inbound frame classification.
//!
//! Every text frame from the driver is decoded into one [`InboundFrame`]
//! before anything else looks at it:
//!
//! | Field presence | Variant |
//! |----------------|---------|
//! | integer `id` | [`InboundFrame::CommandResponse`] |
//! | string `method`, no `id` | [`InboundFrame::Event`] |
//! | anything else | [`InboundFrame::Unrecognized`] |
//!
//! Classification never fails; malformed input becomes `Unrecognized`.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, from_str};

use crate::identifiers::CommandId;

use super::{Event, Response};

// ============================================================================
// InboundFrame
// ============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Response to a command, correlated by ID.
    CommandResponse(Response),

    /// Unsolicited event.
    Event(Event),

    /// Frame that is neither; logged and dropped by the connection.
    Unrecognized {
        /// Why the frame was not recognized.
        reason: String,
    },
}

impl InboundFrame {
    /// Classifies a raw text frame.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let value = match from_str::<Value>(text) {
            Ok(value) => value,
            Err(e) => return Self::unrecognized(format!("invalid JSON: {e}")),
        };

        let Value::Object(mut obj) = value else {
            return Self::unrecognized("frame is not a JSON object");
        };

        match obj.remove("id") {
            None | Some(Value::Null) => {}
            Some(id) => {
                let Some(id) = id.as_u64() else {
                    return Self::unrecognized(format!("non-integer id: {id}"));
                };
                return Self::CommandResponse(Response {
                    id: CommandId::new(id),
                    result: obj.remove("result"),
                    error: obj.remove("error").filter(|e| !e.is_null()),
                });
            }
        }

        match obj.remove("method") {
            Some(Value::String(method)) => {
                let params = match obj.remove("params") {
                    None | Some(Value::Null) => Value::Object(Map::new()),
                    Some(params) => params,
                };
                Self::Event(Event { method, params })
            }
            Some(other) => Self::unrecognized(format!("non-string method: {other}")),
            None => Self::unrecognized("frame has neither id nor method"),
        }
    }

    fn unrecognized(reason: impl Into<String>) -> Self {
        Self::Unrecognized {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
