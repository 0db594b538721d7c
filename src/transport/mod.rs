//! WebSocket transport layer.
//!
//! This module handles communication between the local end (Rust) and the
//! clicker driver via WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  Connection (Rust)   │        WebSocket        │  clicker serve  │
//! │                      │◄───────────────────────►│                 │
//! │  PendingTable        │     localhost:PORT      │  BiDi endpoint  │
//! │  Subscriptions       │                         │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::connect` - WebSocket handshake with deadline
//! 2. `Connection::send_command` - Correlated request/response by ID
//! 3. `Connection::on` / `off` - Event subscriptions
//! 4. `Connection::close` - Fail pending commands, stop the event loop
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `pending` | Pending command table and timers |
//! | `subscriptions` | Event subscription table |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Pending command table.
mod pending;

/// Event subscription table.
mod subscriptions;

/// In-process driver peer for tests.
#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectOptions, Connection, ConnectionState};
pub use subscriptions::EventHandler;
