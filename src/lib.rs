//! Vibium client - Rust client for the clicker browser driver.
//!
//! This library launches the `clicker` driver, speaks its WebSocket
//! protocol, and makes sure no driver or browser process outlives the
//! program that started it.
//!
//! # Architecture
//!
//! The client follows a client-server model:
//!
//! - **Local End (Rust)**: Sends commands, receives events via WebSocket
//! - **Remote End (clicker)**: Drives Chrome over BiDi, emits events
//!
//! Key design principles:
//!
//! - Each [`Connection`] owns one event loop task that does all socket I/O
//! - Commands are correlated by ID, never by arrival order
//! - Every pending command resolves exactly once (result, error, timeout, or close)
//! - Every started [`SupervisedProcess`] is tracked by a [`ProcessRegistry`]
//!   and stopped at program exit if the caller forgets
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use vibium_client::{Browser, LaunchOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Start clicker and connect to it
//!     let browser = Browser::launch(&LaunchOptions::headless()).await?;
//!
//!     // Listen for events
//!     browser.on("browsingContext.load", |event| {
//!         println!("loaded: {}", event.params);
//!     });
//!
//!     // Send commands
//!     let tree = browser.send("browsingContext.getTree", json!({})).await?;
//!     println!("contexts: {tree}");
//!
//!     browser.quit().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | [`Browser`] session (process + connection) |
//! | [`blocking`] | Synchronous wrappers |
//! | [`driver`] | Process supervisor, registry, and launch options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire frame types |
//! | [`transport`] | WebSocket connection and event loop |

// ============================================================================
// Modules
// ============================================================================

/// Synchronous wrappers over the async API.
pub mod blocking;

/// Browser session.
///
/// - [`Browser`] - Launched or attached driver session
pub mod browser;

/// Driver process management.
///
/// Use [`Supervisor::builder()`] to inject a registry, locator, or installer.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire frame types.
///
/// Outbound commands and the classified inbound frame.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection, pending command table, and event subscriptions.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::Browser;

// Driver types
pub use driver::{
    BinaryLocator, DefaultLocator, DriverInstaller, Installer, LaunchOptions, ManagedProcess,
    NoopInstaller, ProcessRegistry, SupervisedProcess, Supervisor, SupervisorBuilder,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, ProcessKey, SubscriptionId};

// Protocol types
pub use protocol::{Event, InboundFrame};

// Transport types
pub use transport::{ConnectOptions, Connection, ConnectionState, EventHandler};
