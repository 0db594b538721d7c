//! Handle to a running clicker process.
//!
//! Teardown order on [`SupervisedProcess::stop`]:
//!
//! 1. Unregister from the [`ProcessRegistry`]
//! 2. Force-kill every descendant (the browser and its helpers)
//! 3. Terminate the driver
//! 4. Wait up to the grace period, then force-kill
//!
//! Steps 2-4 run at most once no matter how many callers race on `stop`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ProcessKey;

use super::kill_tree;
use super::registry::{ManagedProcess, ProcessRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Poll interval while waiting for the driver to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the OS to reap the driver after a forced kill.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// ProcessInner
// ============================================================================

/// Shared state; the registry holds the same `Arc`.
pub(crate) struct ProcessInner {
    key: ProcessKey,
    pid: u32,
    port: u16,
    child: Mutex<Child>,
    stopped: AtomicBool,
    /// `true` once teardown has run. Held for the whole teardown.
    torn_down: Mutex<bool>,
    grace_period: Duration,
    registry: Weak<ProcessRegistry>,
    teardowns: AtomicUsize,
}

impl ProcessInner {
    fn try_wait(&self) -> io::Result<Option<std::process::ExitStatus>> {
        self.child.lock().try_wait()
    }

    /// Polls for exit until `limit` passes.
    fn wait_for_exit(&self, limit: Duration) -> Result<bool> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = self.try_wait()? {
                debug!(pid = self.pid, ?status, "Clicker exited");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl ManagedProcess for ProcessInner {
    fn key(&self) -> ProcessKey {
        self.key
    }

    fn is_alive(&self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    fn shutdown(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Release);

        let mut torn_down = self.torn_down.lock();
        if *torn_down {
            return Ok(());
        }
        *torn_down = true;
        self.teardowns.fetch_add(1, Ordering::Relaxed);

        if !self.is_alive() {
            debug!(pid = self.pid, "Clicker already exited");
            return Ok(());
        }

        let killed = kill_tree::kill_descendants(self.pid);
        debug!(pid = self.pid, killed, "Descendants killed");

        if !kill_tree::terminate(self.pid) {
            debug!(pid = self.pid, "Terminate signal not delivered");
        }

        if self.wait_for_exit(self.grace_period)? {
            info!(pid = self.pid, port = self.port, "Clicker stopped");
            return Ok(());
        }

        warn!(
            pid = self.pid,
            grace_ms = self.grace_period.as_millis() as u64,
            "Clicker ignored terminate, killing"
        );
        self.child.lock().start_kill()?;
        if !self.wait_for_exit(REAP_TIMEOUT)? {
            warn!(pid = self.pid, "Clicker not reaped after kill");
        }
        Ok(())
    }
}

// ============================================================================
// SupervisedProcess
// ============================================================================

/// A running clicker process.
///
/// Cloning yields another handle to the same process.
#[derive(Clone)]
pub struct SupervisedProcess {
    inner: Arc<ProcessInner>,
}

impl fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("key", &self.inner.key)
            .field("pid", &self.inner.pid)
            .field("port", &self.inner.port)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl SupervisedProcess {
    /// Wraps a child that has announced its port and registers it.
    pub(crate) fn register(
        child: Child,
        pid: u32,
        port: u16,
        grace_period: Duration,
        registry: &Arc<ProcessRegistry>,
    ) -> Self {
        let inner = Arc::new(ProcessInner {
            key: ProcessKey::next(),
            pid,
            port,
            child: Mutex::new(child),
            stopped: AtomicBool::new(false),
            torn_down: Mutex::new(false),
            grace_period,
            registry: Arc::downgrade(registry),
            teardowns: AtomicUsize::new(0),
        });
        registry.register(Arc::clone(&inner) as Arc<dyn ManagedProcess>);
        Self { inner }
    }

    /// Registry key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> ProcessKey {
        self.inner.key
    }

    /// OS process ID.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Port the driver announced.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// WebSocket endpoint of the driver.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://localhost:{}", self.inner.port)
    }

    /// Live OS status, checked on every call.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Returns `true` once `stop` has been called.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stops the driver and everything it spawned.
    ///
    /// Idempotent and safe to call concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to kill the process.
    pub async fn stop(&self) -> Result<()> {
        self.unregister();
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.shutdown())
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }

    /// Blocking variant of [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to kill the process.
    pub fn stop_blocking(&self) -> Result<()> {
        self.unregister();
        self.inner.shutdown()
    }

    fn unregister(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.unregister(self.inner.key);
        }
    }

    #[cfg(test)]
    pub(crate) fn teardown_count(&self) -> usize {
        self.inner.teardowns.load(Ordering::Relaxed)
    }
}
