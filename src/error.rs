//! Error types for the Vibium client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vibium_client::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     let tree = connection.send("browsingContext.getTree", json!({})).await?;
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
//! | Process | [`Error::BinaryNotFound`], [`Error::ProcessLaunchFailed`], [`Error::ProcessExited`], [`Error::StartupTimeout`], [`Error::InstallFailed`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Command | [`Error::Protocol`], [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

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
    /// Returned when launch or connect options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Driver binary could not be located.
    #[error("Clicker binary not found: {message}")]
    BinaryNotFound {
        /// Where the locator looked and how to fix it.
        message: String,
    },

    /// Failed to spawn the driver process.
    #[error("Failed to launch clicker: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Driver process exited before announcing its port.
    ///
    /// `code` is `-1` when the process was terminated by a signal.
    #[error("Clicker exited with code {code} before startup completed")]
    ProcessExited {
        /// Exit code of the process.
        code: i32,
    },

    /// No listening announcement within the startup deadline.
    ///
    /// The process has already been killed when this is returned.
    #[error("Timed out after {timeout_ms}ms waiting for clicker to start")]
    StartupTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The driver's runtime dependency could not be installed.
    #[error("Browser installation failed: {message}")]
    InstallFailed {
        /// Description of the installation failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the handshake fails or does not complete in time.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed while the command was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Structured error returned by the remote end.
    #[error("Protocol error ({code}): {message}")]
    Protocol {
        /// Remote error code (`-1` when not supplied).
        code: i64,
        /// Remote error message.
        message: String,
    },

    /// Command timeout.
    ///
    /// No response arrived for the command within its deadline.
    #[error("Command {method} (id={command_id}) timed out after {timeout_ms}ms")]
    Timeout {
        /// Method of the timed-out command.
        method: String,
        /// The command ID that timed out.
        command_id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
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

    /// Creates a binary not found error.
    #[inline]
    pub fn binary_not_found(message: impl Into<String>) -> Self {
        Self::BinaryNotFound {
            message: message.into(),
        }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a process exited error.
    #[inline]
    pub fn process_exited(code: i32) -> Self {
        Self::ProcessExited { code }
    }

    /// Creates a startup timeout error.
    #[inline]
    pub fn startup_timeout(timeout_ms: u64) -> Self {
        Self::StartupTimeout { timeout_ms }
    }

    /// Creates an installation failed error.
    #[inline]
    pub fn install_failed(message: impl Into<String>) -> Self {
        Self::InstallFailed {
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

    /// Creates a remote protocol error.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn timeout(method: impl Into<String>, command_id: CommandId, timeout_ms: u64) -> Self {
        Self::Timeout {
            method: method.into(),
            command_id,
            timeout_ms,
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
        matches!(self, Self::Timeout { .. } | Self::StartupTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came from launching the driver process.
    #[inline]
    #[must_use]
    pub fn is_process_error(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound { .. }
                | Self::ProcessLaunchFailed { .. }
                | Self::ProcessExited { .. }
                | Self::StartupTimeout { .. }
                | Self::InstallFailed { .. }
        )
    }

    /// Returns the remote error code for [`Error::Protocol`].
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::protocol(3, "bad");
        assert_eq!(err.to_string(), "Protocol error (3): bad");
        assert_eq!(err.code(), Some(3));
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("session.status", CommandId::new(7), 50);
        assert_eq!(
            err.to_string(),
            "Command session.status (id=7) timed out after 50ms"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("x", CommandId::new(1), 10);
        let startup_err = Error::startup_timeout(10_000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(startup_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_process_error() {
        assert!(Error::process_exited(1).is_process_error());
        assert!(Error::binary_not_found("nowhere").is_process_error());
        assert!(!Error::ConnectionClosed.is_process_error());
        assert_eq!(Error::ConnectionClosed.code(), None);
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
}
