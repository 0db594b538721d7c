//! Process-wide cleanup net for supervised driver processes.
//!
//! Every started process is registered here. On normal program exit a
//! single `atexit` callback stops whatever is still registered, so a caller
//! that forgets `stop()` leaves no orphaned driver behind.
//!
//! # Contract
//!
//! - The hook is installed at most once per program, on the first
//!   [`ProcessRegistry::register`] of any registry.
//! - `stop()` on a process unregisters it before tearing it down, so a
//!   concurrent [`ProcessRegistry::stop_all`] never stops it twice.
//! - [`ProcessRegistry::stop_all`] drains the set under the lock and
//!   tears entries down outside it, so registration from other threads
//!   never blocks on a teardown.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Once, Weak};
use std::thread;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::dispatcher::{self, Dispatch};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::identifiers::ProcessKey;

// ============================================================================
// ManagedProcess
// ============================================================================

/// A process the registry can tear down.
pub trait ManagedProcess: Send + Sync {
    /// Registry key.
    fn key(&self) -> ProcessKey;

    /// Live OS status.
    fn is_alive(&self) -> bool;

    /// Blocking teardown. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to terminate the process.
    fn shutdown(&self) -> Result<()>;
}

// ============================================================================
// Exit Hook
// ============================================================================

static GLOBAL: LazyLock<Arc<ProcessRegistry>> = LazyLock::new(|| Arc::new(ProcessRegistry::new()));

static EXIT_HOOK: Once = Once::new();

/// Registries that have ever had a process registered.
static HOOKED: Mutex<Vec<Weak<ProcessRegistry>>> = parking_lot::const_mutex(Vec::new());

fn install_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // SAFETY: `run_exit_hook` is a plain `extern "C" fn` with no
        // arguments and does not unwind across the FFI boundary.
        let rc = unsafe { libc::atexit(run_exit_hook) };
        if rc == 0 {
            debug!("Process exit hook installed");
        } else {
            warn!(rc, "Failed to install process exit hook");
        }
    });
}

/// Thread-locals of the exiting thread are already destroyed when `atexit`
/// handlers run, and subscribers may write through them. Teardown runs on
/// a fresh thread; if none can be started it runs here with logging off.
extern "C" fn run_exit_hook() {
    let on_worker = panic::catch_unwind(|| {
        thread::Builder::new()
            .name("vibium-exit".into())
            .spawn(stop_hooked_registries)
            .ok()
            .map(thread::JoinHandle::join)
    });

    let clean = match on_worker {
        Ok(Some(joined)) => joined.unwrap_or(false),
        _ => panic::catch_unwind(|| {
            dispatcher::with_default(&Dispatch::none(), stop_hooked_registries)
        })
        .unwrap_or(false),
    };
    if !clean {
        eprintln!("vibium: panic while stopping driver processes at exit");
    }
}

/// Stops every live hooked registry. Returns `false` if any teardown panicked.
fn stop_hooked_registries() -> bool {
    let registries: Vec<Arc<ProcessRegistry>> =
        HOOKED.lock().iter().filter_map(Weak::upgrade).collect();

    let mut clean = true;
    for registry in registries {
        if panic::catch_unwind(AssertUnwindSafe(|| registry.stop_all())).is_err() {
            clean = false;
        }
    }
    clean
}

// ============================================================================
// ProcessRegistry
// ============================================================================

/// Set of live supervised processes.
pub struct ProcessRegistry {
    processes: Mutex<FxHashMap<ProcessKey, Arc<dyn ManagedProcess>>>,
    hooked: AtomicBool,
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    /// Creates an empty registry.
    ///
    /// The exit hook covers it once a process is registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(FxHashMap::default()),
            hooked: AtomicBool::new(false),
        }
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Adds a process and installs the exit hook if needed.
    pub fn register(self: &Arc<Self>, process: Arc<dyn ManagedProcess>) {
        let key = process.key();
        self.processes.lock().insert(key, process);

        if !self.hooked.swap(true, Ordering::AcqRel) {
            HOOKED.lock().push(Arc::downgrade(self));
            install_exit_hook();
        }
        debug!(%key, "Process registered");
    }

    /// Removes a process. Returns `true` if it was registered.
    pub fn unregister(&self, key: ProcessKey) -> bool {
        let removed = self.processes.lock().remove(&key).is_some();
        if removed {
            debug!(%key, "Process unregistered");
        }
        removed
    }

    /// Stops every registered process and clears the set.
    ///
    /// Failures and panics are logged per entry; the rest still run.
    /// Returns the number of processes that were registered.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<Arc<dyn ManagedProcess>> =
            self.processes.lock().drain().map(|(_, p)| p).collect();

        if drained.is_empty() {
            return 0;
        }
        info!(count = drained.len(), "Stopping all registered processes");

        for process in &drained {
            let key = process.key();
            match panic::catch_unwind(AssertUnwindSafe(|| process.shutdown())) {
                Ok(Ok(())) => debug!(%key, "Process stopped"),
                Ok(Err(e)) => warn!(%key, error = %e, "Failed to stop process"),
                Err(_) => error!(%key, "Panic while stopping process"),
            }
        }
        drained.len()
    }

    /// Number of registered processes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.lock().is_empty()
    }

    /// Returns `true` if `key` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: ProcessKey) -> bool {
        self.processes.lock().contains_key(&key)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use crate::error::Error;

    struct FakeProcess {
        key: ProcessKey,
        alive: AtomicBool,
        shutdowns: AtomicUsize,
        fail: bool,
        panic: bool,
    }

    impl FakeProcess {
        fn new() -> Arc<Self> {
            Self::with(false, false)
        }

        fn with(fail: bool, panic: bool) -> Arc<Self> {
            Arc::new(Self {
                key: ProcessKey::next(),
                alive: AtomicBool::new(true),
                shutdowns: AtomicUsize::new(0),
                fail,
                panic,
            })
        }
    }

    impl ManagedProcess for FakeProcess {
        fn key(&self) -> ProcessKey {
            self.key
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
            if self.panic {
                panic!("shutdown exploded");
            }
            if self.fail {
                return Err(Error::config("refused"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = Arc::new(ProcessRegistry::new());
        let process = FakeProcess::new();

        registry.register(process.clone());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(process.key));

        assert!(registry.unregister(process.key));
        assert!(!registry.unregister(process.key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_all_continues_after_failure() {
        let registry = Arc::new(ProcessRegistry::new());
        let a = FakeProcess::with(true, false);
        let b = FakeProcess::new();
        registry.register(a.clone());
        registry.register(b.clone());

        assert_eq!(registry.stop_all(), 2);

        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_all_survives_panic() {
        let registry = Arc::new(ProcessRegistry::new());
        let a = FakeProcess::with(false, true);
        let b = FakeProcess::new();
        registry.register(a.clone());
        registry.register(b.clone());

        registry.stop_all();

        assert!(!b.is_alive());
        assert_eq!(b.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_process_is_not_stopped() {
        let registry = Arc::new(ProcessRegistry::new());
        let process = FakeProcess::new();
        registry.register(process.clone());
        registry.unregister(process.key);

        assert_eq!(registry.stop_all(), 0);
        assert_eq!(process.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_register_and_stop_all() {
        let registry = Arc::new(ProcessRegistry::new());
        let processes: Vec<_> = (0..64).map(|_| FakeProcess::new()).collect();

        let writers: Vec<_> = processes
            .chunks(16)
            .map(|chunk| {
                let registry = Arc::clone(&registry);
                let chunk = chunk.to_vec();
                thread::spawn(move || {
                    for p in chunk {
                        registry.register(p);
                    }
                })
            })
            .collect();
        let stopper = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.stop_all())
        };

        for writer in writers {
            writer.join().expect("writer");
        }
        stopper.join().expect("stopper");
        registry.stop_all();

        for p in &processes {
            assert_eq!(p.shutdowns.load(Ordering::SeqCst), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ProcessRegistry::global(), &ProcessRegistry::global()));
    }
}

#[cfg(all(test, unix))]
mod exit_hook_tests {
    use std::path::Path;
    use std::process::Command;
    use std::thread;
    use std::time::Duration;

    use tracing_subscriber::EnvFilter;

    use crate::driver::testing::{fake_driver, is_running, read_pid};
    use crate::driver::{LaunchOptions, NoopInstaller, Supervisor};

    /// Set in the re-executed test binary; names the scratch directory.
    const CHILD_DIR_ENV: &str = "VIBIUM_EXIT_HOOK_CHILD_DIR";

    const CHILD_TEST: &str = "driver::registry::exit_hook_tests::test_exit_hook_child_leaves_driver_running";

    fn wait_gone(pid: i32) -> bool {
        for _ in 0..100 {
            if !is_running(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    /// Runs inside the re-executed binary only: starts a driver with a
    /// logging subscriber installed and returns without stopping it.
    #[tokio::test]
    async fn test_exit_hook_child_leaves_driver_running() {
        let Ok(dir) = std::env::var(CHILD_DIR_ENV) else {
            return;
        };
        let dir = Path::new(&dir);

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .init();

        let binary = fake_driver(
            dir,
            &format!(
                "sleep 300 &\necho $! > '{}'\necho $$ > '{}'\necho 'listening on ws://localhost:9'\nexec sleep 300",
                dir.join("descendant").display(),
                dir.join("driver").display(),
            ),
        );
        let supervisor = Supervisor::builder().installer(NoopInstaller).build();
        let process = supervisor
            .start(&LaunchOptions::new().with_executable(binary))
            .await
            .expect("start");
        assert!(process.is_alive());
    }

    #[test]
    fn test_exit_hook_stops_forgotten_driver_with_logging_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exe = std::env::current_exe().expect("current exe");

        let status = Command::new(exe)
            .args([CHILD_TEST, "--exact", "--nocapture", "--test-threads=1"])
            .env(CHILD_DIR_ENV, dir.path())
            .status()
            .expect("re-run test binary");
        assert!(status.success());

        let driver = read_pid(&dir.path().join("driver"));
        let descendant = read_pid(&dir.path().join("descendant"));
        assert!(wait_gone(driver), "driver {driver} outlived its host");
        assert!(wait_gone(descendant), "descendant {descendant} outlived its host");
    }
}
