//! Type-safe identifiers for protocol and process entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Scope | Source |
//! |------|-------|--------|
//! | [`CommandId`] | Per connection | [`CommandIdGenerator`], starts at 1 |
//! | [`SubscriptionId`] | Process-wide | [`SubscriptionId::next`] |
//! | [`ProcessKey`] | Process-wide | [`ProcessKey::next`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Global Counters
// ============================================================================

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PROCESS_KEY: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// CommandId
// ============================================================================

/// Identifier correlating a command with its response.
///
/// Serialized as a bare JSON integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw command ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandIdGenerator
// ============================================================================

/// Monotonic command ID source owned by one connection.
///
/// The first ID handed out is 1. IDs are never reused for the lifetime of
/// the generator, so an outstanding ID can never collide with a new one.
#[derive(Debug, Default)]
pub struct CommandIdGenerator {
    last: AtomicU64,
}

impl CommandIdGenerator {
    /// Creates a generator whose first ID is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next ID. Safe to call from any number of tasks.
    #[inline]
    pub fn next_id(&self) -> CommandId {
        CommandId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle returned by `Connection::on`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates a new process-unique subscription ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// ProcessKey
// ============================================================================

/// Registry key for a supervised process.
///
/// OS PIDs can be recycled, so the registry keys on this instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessKey(u64);

impl ProcessKey {
    /// Allocates a new process-unique key.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PROCESS_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
