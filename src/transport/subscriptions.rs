//! Event subscription table.
//!
//! Maps event method names to ordered handler lists. Dispatch works on a
//! snapshot of the list, so handlers can subscribe or unsubscribe from
//! inside a handler without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::{error, trace};

use crate::identifiers::SubscriptionId;
use crate::protocol::Event;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called once per matching event, on a blocking-pool thread. A panic in
/// one handler is caught and logged; it does not affect other handlers or
/// the connection.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

// ============================================================================
// Subscriptions
// ============================================================================

/// Concurrent event-name → handlers table.
#[derive(Default)]
pub(crate) struct Subscriptions {
    map: DashMap<String, Vec<(SubscriptionId, EventHandler)>, FxBuildHasher>,
    /// Set on teardown; queued handler calls check it before running.
    closed: Arc<AtomicBool>,
}

impl Subscriptions {
    /// Adds a handler for `event`.
    pub(crate) fn add(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.map
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one handler. Returns `false` if it was not subscribed.
    pub(crate) fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let removed = match self.map.get_mut(event) {
            Some(mut handlers) => {
                let before = handlers.len();
                handlers.retain(|(sub, _)| *sub != id);
                handlers.len() != before
            }
            None => false,
        };
        self.map.remove_if(event, |_, handlers| handlers.is_empty());
        removed
    }

    /// Removes every handler for `event`. Returns how many were removed.
    pub(crate) fn remove_all(&self, event: &str) -> usize {
        self.map
            .remove(event)
            .map_or(0, |(_, handlers)| handlers.len())
    }

    /// Returns the number of handlers for `event`.
    pub(crate) fn count(&self, event: &str) -> usize {
        self.map.get(event).map_or(0, |handlers| handlers.len())
    }

    /// Snapshot of the current handlers for `event`.
    pub(crate) fn handlers(&self, event: &str) -> Vec<EventHandler> {
        self.map.get(event).map_or_else(Vec::new, |handlers| {
            handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        })
    }

    /// Stops all further dispatch, including calls already queued.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Invokes every handler for the event, each on its own blocking task.
    ///
    /// No ordering is guaranteed between handlers.
    pub(crate) fn dispatch(&self, event: Event) {
        if self.closed.load(Ordering::Acquire) {
            trace!(method = %event.method, "Dropping event after close");
            return;
        }

        let handlers = self.handlers(&event.method);
        if handlers.is_empty() {
            trace!(method = %event.method, "No handlers for event");
            return;
        }

        trace!(method = %event.method, count = handlers.len(), "Dispatching event");
        for handler in handlers {
            let event = event.clone();
            let closed = Arc::clone(&self.closed);
            tokio::task::spawn_blocking(move || invoke(&handler, event, &closed));
        }
    }
}

/// Runs one handler, logging instead of propagating a panic.
fn invoke(handler: &EventHandler, event: Event, closed: &AtomicBool) {
    if closed.load(Ordering::Acquire) {
        trace!(method = %event.method, "Skipping handler queued before close");
        return;
    }

    let method = event.method.clone();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
        error!(%method, panic = %panic_message(&*panic), "Event handler panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    fn event(method: &str) -> Event {
        Event {
            method: method.into(),
            params: json!({ "k": 1 }),
        }
    }

    #[test]
    fn test_add_remove() {
        let subs = Subscriptions::default();
        let a = subs.add("log.entryAdded", Arc::new(|_: Event| {}));
        let b = subs.add("log.entryAdded", Arc::new(|_: Event| {}));
        assert_eq!(subs.count("log.entryAdded"), 2);

        assert!(subs.remove("log.entryAdded", a));
        assert!(!subs.remove("log.entryAdded", a));
        assert_eq!(subs.count("log.entryAdded"), 1);

        assert!(subs.remove("log.entryAdded", b));
        assert_eq!(subs.count("log.entryAdded"), 0);
        assert!(!subs.remove("other.event", b));
    }

    #[test]
    fn test_remove_all() {
        let subs = Subscriptions::default();
        subs.add("a.b", Arc::new(|_: Event| {}));
        subs.add("a.b", Arc::new(|_: Event| {}));
        assert_eq!(subs.remove_all("a.b"), 2);
        assert_eq!(subs.remove_all("a.b"), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let subs = Subscriptions::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        subs.add("a.b", Arc::new(|_: Event| panic!("handler failure")));
        let tx2 = tx.clone();
        subs.add(
            "a.b",
            Arc::new(move |event: Event| {
                let _ = tx2.send(event.params);
            }),
        );

        subs.dispatch(event("a.b"));
        subs.dispatch(event("a.b"));

        for _ in 0..2 {
            let params = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("handler did not run")
                .expect("channel closed");
            assert_eq!(params, json!({ "k": 1 }));
        }
    }

    #[tokio::test]
    async fn test_no_dispatch_after_close() {
        let subs = Subscriptions::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        subs.add(
            "a.b",
            Arc::new(move |event: Event| {
                let _ = tx.send(event.method);
            }),
        );

        subs.close();
        subs.dispatch(event("a.b"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(subs.count("a.b"), 1);
    }

    #[test]
    fn test_queued_call_skipped_once_closed() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: EventHandler = Arc::new(move |_: Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        invoke(&handler, event("a.b"), &AtomicBool::new(false));
        invoke(&handler, event("a.b"), &AtomicBool::new(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_only_matching_event() {
        let subs = Subscriptions::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        subs.add(
            "a.b",
            Arc::new(move |event: Event| {
                let _ = tx.send(event.method);
            }),
        );

        subs.dispatch(event("c.d"));
        subs.dispatch(event("a.b"));

        let method = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("handler did not run")
            .expect("channel closed");
        assert_eq!(method, "a.b");
        assert!(rx.try_recv().is_err());
    }
}
