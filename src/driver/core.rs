//! Clicker process supervisor.
//!
//! The [`Supervisor`] launches `clicker serve`, waits for the
//! `listening on ws://<host>:<port>` announcement on stdout, and hands
//! back a registered [`SupervisedProcess`].
//!
//! # Example
//!
//! ```no_run
//! use vibium_client::{LaunchOptions, Supervisor};
//!
//! # async fn example() -> vibium_client::Result<()> {
//! let supervisor = Supervisor::new();
//! let process = supervisor.start(&LaunchOptions::headless()).await?;
//!
//! println!("driver at {}", process.ws_url());
//! process.stop().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

use super::builder::SupervisorBuilder;
use super::installer::Installer;
use super::kill_tree;
use super::locator::BinaryLocator;
use super::options::LaunchOptions;
use super::process::SupervisedProcess;
use super::registry::ProcessRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Matches the driver's startup announcement; the port is the last group.
static ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)listening on ws://(\S+):(\d+)").expect("announcement regex is valid")
});

// ============================================================================
// Supervisor
// ============================================================================

/// Launches and registers clicker processes.
///
/// Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) registry: Arc<ProcessRegistry>,
    pub(crate) locator: Arc<dyn BinaryLocator>,
    pub(crate) installer: Arc<dyn Installer>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Supervisor - Public API
// ============================================================================

impl Supervisor {
    /// Creates a supervisor with the global registry and default collaborators.
    #[must_use]
    pub fn new() -> Self {
        SupervisorBuilder::new().build()
    }

    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Registry that started processes are added to.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Starts a clicker process and waits for it to announce its port.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::BinaryNotFound`] if no binary is given and none can be located
    /// - [`Error::InstallFailed`] if the browser dependency cannot be installed
    /// - [`Error::ProcessLaunchFailed`] if the process cannot be spawned
    /// - [`Error::ProcessExited`] if it exits before announcing a port
    /// - [`Error::StartupTimeout`] if no announcement arrives in time
    ///
    /// On every error after spawn the process has already been killed.
    pub async fn start(&self, options: &LaunchOptions) -> Result<SupervisedProcess> {
        options.validate()?;

        let binary = self.resolve_binary(options)?;
        self.ensure_installed(&binary).await?;

        let args = options.to_args();
        info!(binary = %binary.display(), ?args, "Starting clicker");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::process_launch_failed)?;

        let Some(pid) = child.id() else {
            let status = child.wait().await?;
            return Err(Error::process_exited(status.code().unwrap_or(-1)));
        };
        debug!(pid, "Clicker spawned");

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_output(stdout, "stdout", pid, Some(line_tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_output(stderr, "stderr", pid, None));
        }

        let announced = timeout(
            options.startup_timeout,
            wait_for_announcement(&mut child, &mut line_rx),
        )
        .await;

        let port = match announced {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => {
                kill_failed_launch(&mut child, pid).await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    pid,
                    timeout_ms = options.startup_timeout.as_millis() as u64,
                    "Clicker did not announce a port in time"
                );
                kill_failed_launch(&mut child, pid).await;
                return Err(Error::startup_timeout(
                    options.startup_timeout.as_millis() as u64
                ));
            }
        };
        drop(line_rx);

        info!(pid, port, "Clicker listening");
        Ok(SupervisedProcess::register(
            child,
            pid,
            port,
            options.stop_grace_period,
            &self.registry,
        ))
    }
}

// ============================================================================
// Supervisor - Internal
// ============================================================================

impl Supervisor {
    fn resolve_binary(&self, options: &LaunchOptions) -> Result<PathBuf> {
        match &options.executable_path {
            Some(path) => Ok(path.clone()),
            None => self.locator.locate(),
        }
    }

    async fn ensure_installed(&self, binary: &Path) -> Result<()> {
        let installer = Arc::clone(&self.installer);
        let binary = binary.to_path_buf();
        tokio::task::spawn_blocking(move || installer.ensure_installed(&binary))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }
}

// ============================================================================
// Startup Helpers
// ============================================================================

/// Extracts the port from a startup announcement line.
pub(crate) fn parse_announcement(line: &str) -> Option<u16> {
    ANNOUNCEMENT
        .captures(line)
        .and_then(|caps| caps.get(2))
        .and_then(|port| port.as_str().parse().ok())
}

/// Waits for a stdout line carrying the port, or for the process to exit.
async fn wait_for_announcement(
    child: &mut Child,
    lines: &mut mpsc::UnboundedReceiver<String>,
) -> Result<u16> {
    loop {
        tokio::select! {
            biased;

            line = lines.recv() => match line {
                Some(line) => {
                    if let Some(port) = parse_announcement(&line) {
                        return Ok(port);
                    }
                }
                None => {
                    let status = child.wait().await?;
                    return Err(Error::process_exited(status.code().unwrap_or(-1)));
                }
            },

            status = child.wait() => {
                let status = status?;
                // Lines already read before exit still count.
                while let Ok(line) = lines.try_recv() {
                    if let Some(port) = parse_announcement(&line) {
                        return Ok(port);
                    }
                }
                return Err(Error::process_exited(status.code().unwrap_or(-1)));
            }
        }
    }
}

/// Reads an output pipe to EOF so the driver never blocks on a full pipe.
///
/// Lines are forwarded while `lines` has a receiver; afterwards they are
/// only traced.
async fn drain_output<R>(
    reader: R,
    stream: &'static str,
    pid: u32,
    mut lines: Option<mpsc::UnboundedSender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                trace!(pid, stream, %line, "clicker");
                if lines.as_ref().is_some_and(|tx| tx.send(line).is_err()) {
                    lines = None;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(pid, stream, error = %e, "Clicker output read failed");
                break;
            }
        }
    }
    trace!(pid, stream, "Clicker output closed");
}

/// Kills a process that failed to start, along with anything it spawned.
async fn kill_failed_launch(child: &mut Child, pid: u32) {
    kill_tree::kill_descendants(pid);
    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "Kill after failed launch");
    }
    if let Err(e) = child.wait().await {
        debug!(pid, error = %e, "Wait after failed launch");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        assert_eq!(parse_announcement("Listening on ws://localhost:53211"), Some(53211));
        assert_eq!(parse_announcement("LISTENING ON WS://127.0.0.1:9515\r"), Some(9515));
        assert_eq!(
            parse_announcement("2025/01/01 clicker: listening on ws://[::1]:4000 ok"),
            Some(4000)
        );
        assert_eq!(parse_announcement("listening on http://localhost:80"), None);
        assert_eq!(parse_announcement("listening on ws://localhost:99999"), None);
        assert_eq!(parse_announcement("starting up"), None);
    }
}
