//! Pending command table.
//!
//! Each outstanding command owns a oneshot result channel and an armed
//! timer task. Removing the map entry is the single point of resolution:
//! whoever removes it (response, timer, or teardown) completes the caller,
//! so every command resolves exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Types
// ============================================================================

/// Result channel handed back to the caller of `send_command`.
pub(crate) type ResultSender = oneshot::Sender<Result<Value>>;

/// A sent command awaiting resolution.
struct PendingCommand {
    /// Method name, kept for timeout errors and logs.
    method: String,
    /// Caller's result channel.
    tx: ResultSender,
    /// Timer task; `None` only during the instant between insert and arm.
    timer: Option<AbortHandle>,
}

impl PendingCommand {
    /// Cancels the timer and completes the caller.
    fn complete(self, result: Result<Value>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // Receiver gone means the caller stopped waiting; nothing to do.
        let _ = self.tx.send(result);
    }
}

// ============================================================================
// PendingTable
// ============================================================================

/// Concurrent map of command IDs to pending commands.
///
/// Sharded, so unrelated commands do not contend on a single lock.
#[derive(Default)]
pub(crate) struct PendingTable {
    map: DashMap<CommandId, PendingCommand, FxBuildHasher>,
}

impl PendingTable {
    /// Creates an empty table.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a command and arms its timeout.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: CommandId,
        method: &str,
        tx: ResultSender,
        timeout: Duration,
    ) {
        self.map.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                tx,
                timer: None,
            },
        );

        let table = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(id, timeout);
        });

        // A response may already have resolved the entry.
        match self.map.get_mut(&id) {
            Some(mut entry) => entry.timer = Some(timer.abort_handle()),
            None => timer.abort(),
        }
    }

    /// Resolves a command with its response.
    ///
    /// Returns `false` if the ID is unknown (already resolved, timed out,
    /// or never sent).
    pub(crate) fn resolve(&self, id: CommandId, result: Result<Value>) -> bool {
        match self.map.remove(&id) {
            Some((_, pending)) => {
                debug!(%id, method = %pending.method, ok = result.is_ok(), "Command resolved");
                pending.complete(result);
                true
            }
            None => false,
        }
    }

    /// Drops a command without completing its caller.
    ///
    /// Returns `false` if it was already resolved.
    pub(crate) fn cancel(&self, id: CommandId) -> bool {
        match self.map.remove(&id) {
            Some((_, pending)) => {
                if let Some(timer) = pending.timer {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Fails every outstanding command with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of commands failed.
    pub(crate) fn fail_all(&self) -> usize {
        let ids: Vec<CommandId> = self.map.iter().map(|entry| *entry.key()).collect();
        let mut count = 0;

        for id in ids {
            if let Some((_, pending)) = self.map.remove(&id) {
                pending.complete(Err(Error::ConnectionClosed));
                count += 1;
            }
        }

        if count > 0 {
            debug!(count, "Failed pending commands on teardown");
        }
        count
    }

    /// Returns the number of outstanding commands.
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Timer callback.
    fn expire(&self, id: CommandId, timeout: Duration) {
        if let Some((_, pending)) = self.map.remove(&id) {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(%id, method = %pending.method, timeout_ms, "Command timed out");
            let err = Error::timeout(pending.method.clone(), id, timeout_ms);
            // Own timer; nothing to abort.
            let _ = pending.tx.send(Err(err));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_completes_once() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        let id = CommandId::new(1);

        table.register(id, "a.b", tx, Duration::from_secs(5));
        assert_eq!(table.len(), 1);

        assert!(table.resolve(id, Ok(json!({ "ok": true }))));
        assert!(!table.resolve(id, Ok(json!({}))));
        assert_eq!(table.len(), 0);

        let value = rx.await.expect("sender dropped").expect("error result");
        assert_eq!(value, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_timer_expires_entry() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        let id = CommandId::new(3);

        table.register(id, "slow.call", tx, Duration::from_millis(20));

        let err = rx.await.expect("sender dropped").unwrap_err();
        assert!(matches!(err, Error::Timeout { command_id, .. } if command_id == id));
        assert_eq!(table.len(), 0);

        // Late response is an id miss.
        assert!(!table.resolve(id, Ok(json!({}))));
    }

    #[tokio::test]
    async fn test_resolved_command_never_times_out() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        let id = CommandId::new(4);

        table.register(id, "fast.call", tx, Duration::from_millis(20));
        table.resolve(id, Ok(json!({ "n": 1 })));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let value = rx.await.expect("sender dropped").expect("error result");
        assert_eq!(value, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn test_cancel_removes_entry() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        let id = CommandId::new(5);

        table.register(id, "gone.call", tx, Duration::from_secs(5));
        assert!(table.cancel(id));
        assert!(!table.cancel(id));
        assert_eq!(table.len(), 0);
        assert!(!table.resolve(id, Ok(json!({}))));

        // Sender dropped without a result.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = PendingTable::new();
        let mut receivers = Vec::new();
        for n in 1..=3 {
            let (tx, rx) = oneshot::channel();
            table.register(CommandId::new(n), "x.y", tx, Duration::from_secs(5));
            receivers.push(rx);
        }

        assert_eq!(table.fail_all(), 3);
        assert_eq!(table.len(), 0);

        for rx in receivers {
            let err = rx.await.expect("sender dropped").unwrap_err();
            assert!(matches!(err, Error::ConnectionClosed));
        }
    }
}
