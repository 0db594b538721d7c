//! Command and Response message types.
//!
//! Defines the wire format for commands sent to the driver and the
//! responses correlated back to them by ID.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Constants
// ============================================================================

/// Code used when the remote error omits one, or is a bare string.
pub const UNKNOWN_ERROR_CODE: i64 = -1;

/// Message used when a remote error object has no `message`.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

// ============================================================================
// Command
// ============================================================================

/// A command from local end to the driver.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "browsingContext.navigate",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Correlation identifier.
    pub id: CommandId,

    /// Method name in `module.methodName` format.
    pub method: String,

    /// Method parameters. Always an object on the wire.
    pub params: Value,
}

impl Command {
    /// Creates a new command.
    ///
    /// `Value::Null` params are sent as `{}`.
    #[must_use]
    pub fn new(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the driver, already matched to a command ID.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error (either shape):
/// ```json
/// { "id": 7, "error": { "code": 3, "message": "bad" } }
/// { "id": 7, "error": "bad" }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result payload, if any.
    pub result: Option<Value>,

    /// Error payload, if any. A JSON `null` error is stored as `None`.
    pub error: Option<Value>,
}

impl Response {
    /// Returns `true` if this response carries an error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Resolves the response into the caller-facing result.
    ///
    /// # Result convention
    ///
    /// - object result: returned as-is
    /// - absent or `null` result: `{}`
    /// - scalar or array result: wrapped as `{"value": <result>}`
    ///
    /// The wrapping is a client-side convenience, not part of the protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the response carries an error.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            let (code, message) = parse_error(&error);
            return Err(Error::protocol(code, message));
        }

        Ok(match self.result {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value,
            Some(scalar) => json!({ "value": scalar }),
        })
    }
}

/// Extracts `(code, message)` from either error shape.
fn parse_error(error: &Value) -> (i64, String) {
    match error {
        Value::Object(obj) => {
            let code = obj
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or(UNKNOWN_ERROR_CODE);
            let message = match obj.get("message") {
                None | Some(Value::Null) => UNKNOWN_ERROR_MESSAGE.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            (code, message)
        }
        Value::String(s) => (UNKNOWN_ERROR_CODE, s.clone()),
        other => (UNKNOWN_ERROR_CODE, other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
