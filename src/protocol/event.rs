//! Event message types.
//!
//! Events are unsolicited notifications from the driver. They carry a
//! `method` but no `id`.
//!
//! # Format
//!
//! ```json
//! {
//!   "method": "browsingContext.load",
//!   "params": { ... }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data. `{}` when the frame had no params.
    pub params: Value,
}

impl Event {
    /// Returns the module name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "browsingContext.load".into(), .. };
    /// assert_eq!(event.module(), "browsingContext");
    /// ```
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "browsingContext.load".into(), .. };
    /// assert_eq!(event.event_name(), "load");
    /// ```
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_event_method_parts() {
        let event = Event {
            method: "log.entryAdded".into(),
            params: json!({}),
        };
        assert_eq!(event.module(), "log");
        assert_eq!(event.event_name(), "entryAdded");
    }

    #[test]
    fn test_event_without_module_separator() {
        let event = Event {
            method: "ping".into(),
            params: json!({}),
        };
        assert_eq!(event.module(), "ping");
        assert_eq!(event.event_name(), "");
    }
}
