//! Browser dependency installation.
//!
//! The clicker driver needs a Chrome for Testing build. `clicker paths`
//! reports where it expects one; `clicker install` downloads it.

// ============================================================================
// Imports
// ============================================================================

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Limit for `clicker paths`.
const PATHS_TIMEOUT: Duration = Duration::from_secs(10);

/// Limit for `clicker install`.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Poll interval while waiting for a child process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Installer
// ============================================================================

/// Ensures the driver's runtime dependency exists.
///
/// Called synchronously, once per launch, before the driver is spawned.
/// Implementations must be idempotent.
pub trait Installer: Send + Sync {
    /// Installs the dependency if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallFailed`] if installation fails.
    fn ensure_installed(&self, binary: &Path) -> Result<()>;
}

// ============================================================================
// NoopInstaller
// ============================================================================

/// Installer for environments that manage the browser themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

impl Installer for NoopInstaller {
    fn ensure_installed(&self, _binary: &Path) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// DriverInstaller
// ============================================================================

/// Runs `clicker paths` and, when needed, `clicker install`.
///
/// Binaries verified once are not checked again in this process.
#[derive(Debug, Default)]
pub struct DriverInstaller {
    verified: Mutex<FxHashSet<PathBuf>>,
}

impl DriverInstaller {
    /// Creates an installer with an empty verification cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `binary` reports an existing browser.
    fn is_browser_installed(binary: &Path) -> bool {
        let child = Command::new(binary)
            .arg("paths")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!(error = %e, "Failed to run clicker paths");
                return false;
            }
        };

        match wait_with_deadline(&mut child, PATHS_TIMEOUT) {
            Ok(Some(_)) => {}
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
        }

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take()
            && stdout.read_to_string(&mut output).is_err()
        {
            return false;
        }

        browser_path_from_paths_output(&output).is_some_and(|path| path.is_file())
    }
}

impl Installer for DriverInstaller {
    fn ensure_installed(&self, binary: &Path) -> Result<()> {
        if self.verified.lock().contains(binary) {
            return Ok(());
        }

        if !Self::is_browser_installed(binary) {
            info!(binary = %binary.display(), "Downloading Chrome for Testing");

            let mut child = Command::new(binary)
                .arg("install")
                .stdin(Stdio::null())
                .spawn()
                .map_err(|e| Error::install_failed(format!("failed to run install: {e}")))?;

            let status = match wait_with_deadline(&mut child, INSTALL_TIMEOUT)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::install_failed("installation timed out"));
                }
            };

            if !status.success() {
                return Err(Error::install_failed(format!(
                    "install exited with code {}",
                    status.code().unwrap_or(-1)
                )));
            }
            info!("Chrome installed successfully");
        }

        self.verified.lock().insert(binary.to_path_buf());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the browser path from `clicker paths` output.
///
/// Looks for a line of the form `Chrome: <path>`.
fn browser_path_from_paths_output(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Chrome:"))
        .map(|path| PathBuf::from(path.trim()))
        .filter(|path| !path.as_os_str().is_empty())
}

/// Polls a child until it exits or the deadline passes.
///
/// Returns `Ok(None)` on timeout; the child is left running.
pub(crate) fn wait_with_deadline(child: &mut Child, limit: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), limit_ms = limit.as_millis() as u64, "Child did not exit in time");
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    use crate::driver::testing::fake_driver;

    #[test]
    fn test_parse_paths_output() {
        let output = "Clicker: /usr/local/bin/clicker\nChrome: /opt/chrome/chrome\n";
        assert_eq!(
            browser_path_from_paths_output(output),
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
        assert_eq!(browser_path_from_paths_output("Chrome:   \n"), None);
        assert_eq!(browser_path_from_paths_output("nothing here"), None);
    }

    #[test]
    fn test_noop_installer() {
        assert!(NoopInstaller.ensure_installed(Path::new("/nonexistent")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_browser_is_detected_and_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chrome = dir.path().join("chrome");
        std::fs::write(&chrome, b"").expect("write");
        let marker = dir.path().join("install-ran");
        let binary = fake_driver(
            dir.path(),
            &format!(
                "if [ \"$1\" = paths ]; then echo 'Chrome: {}'; else touch '{}'; fi",
                chrome.display(),
                marker.display()
            ),
        );

        let installer = DriverInstaller::new();
        installer.ensure_installed(&binary).expect("should succeed");
        installer.ensure_installed(&binary).expect("should succeed");
        assert!(!marker.exists(), "install must not run when browser exists");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_browser_runs_install() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("install-ran");
        let binary = fake_driver(
            dir.path(),
            &format!(
                "if [ \"$1\" = install ]; then touch '{}'; fi",
                marker.display()
            ),
        );

        DriverInstaller::new()
            .ensure_installed(&binary)
            .expect("should succeed");
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_install() {
        let dir = tempfile::tempdir().expect("tempdir");
        let binary = fake_driver(dir.path(), "if [ \"$1\" = install ]; then exit 3; fi");

        let err = DriverInstaller::new()
            .ensure_installed(&binary)
            .unwrap_err();
        assert!(matches!(err, Error::InstallFailed { ref message } if message.contains('3')));
    }
}
