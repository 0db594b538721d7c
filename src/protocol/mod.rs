//! WebSocket protocol message types.
//!
//! This module defines the message format for communication between the
//! local end (Rust) and the clicker driver.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Command` | Local → Driver | Command request |
//! | `Response` | Driver → Local | Command result or error |
//! | `Event` | Driver → Local | Browser notification |
//!
//! # Command Naming
//!
//! Commands follow `module.methodName` format:
//!
//! - `browsingContext.navigate`
//! - `script.callFunction`
//! - `session.subscribe`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event type |
//! | `frame` | Inbound frame classification |
//! | `request` | Command and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Event message types.
pub mod event;

/// Inbound frame classification.
pub mod frame;

/// Command and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::Event;
pub use frame::InboundFrame;
pub use request::{Command, Response};
