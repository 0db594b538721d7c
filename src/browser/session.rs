//! Browser session: a connection plus the driver process behind it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::driver::{LaunchOptions, SupervisedProcess, Supervisor};
use crate::error::Result;
use crate::identifiers::SubscriptionId;
use crate::protocol::Event;
use crate::transport::{ConnectOptions, Connection};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a browser session.
pub(crate) struct BrowserInner {
    /// Protocol connection to the driver.
    connection: Connection,
    /// Driver process, if this session launched one.
    process: Option<SupervisedProcess>,
    /// Set once `quit` has started.
    quit: AtomicBool,
}

// ============================================================================
// Browser
// ============================================================================

/// A connected browser session.
///
/// Sessions created with [`Browser::launch`] own their driver process and
/// stop it on [`Browser::quit`]. Sessions created with
/// [`Browser::connect`] only own the connection.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use vibium_client::{Browser, LaunchOptions};
///
/// # async fn example() -> vibium_client::Result<()> {
/// let browser = Browser::launch(&LaunchOptions::headless()).await?;
///
/// let tree = browser.send("browsingContext.getTree", json!({})).await?;
/// println!("{tree}");
///
/// browser.quit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Browser {
    /// Shared inner state.
    pub(crate) inner: Arc<BrowserInner>,
}

// ============================================================================
// Browser - Display
// ============================================================================

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("url", &self.inner.connection.url())
            .field("process", &self.inner.process)
            .field("quit", &self.inner.quit.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Browser - Constructors
// ============================================================================

impl Browser {
    /// Launches a driver with the default supervisor and connects to it.
    ///
    /// # Errors
    ///
    /// Any error from [`Supervisor::start`] or [`Connection::connect`].
    /// If connecting fails the driver is stopped first.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        Self::launch_with(&Supervisor::new(), options, ConnectOptions::default()).await
    }

    /// Launches a driver with an explicit supervisor and connect options.
    ///
    /// # Errors
    ///
    /// Same as [`Browser::launch`].
    pub async fn launch_with(
        supervisor: &Supervisor,
        options: &LaunchOptions,
        connect_options: ConnectOptions,
    ) -> Result<Self> {
        let process = supervisor.start(options).await?;
        let url = process.ws_url();

        let connection = match Connection::connect_with_options(&url, connect_options).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(pid = process.pid(), error = %e, "Connect failed, stopping clicker");
                if let Err(stop_err) = process.stop().await {
                    debug!(error = %stop_err, "Stop after failed connect");
                }
                return Err(e);
            }
        };

        info!(pid = process.pid(), url = %url, "Browser launched");
        Ok(Self::new(connection, Some(process)))
    }

    /// Attaches to an already running driver.
    ///
    /// # Errors
    ///
    /// Any error from [`Connection::connect`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_options(url, ConnectOptions::default()).await
    }

    /// Attaches to an already running driver with explicit options.
    ///
    /// # Errors
    ///
    /// Any error from [`Connection::connect_with_options`].
    pub async fn connect_with_options(url: &str, options: ConnectOptions) -> Result<Self> {
        let connection = Connection::connect_with_options(url, options).await?;
        Ok(Self::new(connection, None))
    }

    fn new(connection: Connection, process: Option<SupervisedProcess>) -> Self {
        Self {
            inner: Arc::new(BrowserInner {
                connection,
                process,
                quit: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Browser - Accessors
// ============================================================================

impl Browser {
    /// Returns the protocol connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns the driver process, if this session launched one.
    #[inline]
    #[must_use]
    pub fn process(&self) -> Option<&SupervisedProcess> {
        self.inner.process.as_ref()
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }
}

// ============================================================================
// Browser - Protocol
// ============================================================================

impl Browser {
    /// Sends a command with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_command`].
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.connection.send(method, params).await
    }

    /// Sends a command with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_command`].
    pub async fn send_command(
        &self,
        method: &str,
        params: Value,
        command_timeout: Duration,
    ) -> Result<Value> {
        self.inner
            .connection
            .send_command(method, params, command_timeout)
            .await
    }

    /// Subscribes to an event.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner.connection.on(event, handler)
    }

    /// Unsubscribes from an event.
    pub fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        self.inner.connection.off(event, subscription)
    }
}

// ============================================================================
// Browser - Lifecycle
// ============================================================================

impl Browser {
    /// Closes the connection and stops the driver process. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver process cannot be stopped.
    pub async fn quit(&self) -> Result<()> {
        if self.inner.quit.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(url = %self.inner.connection.url(), "Quitting browser");
        self.inner.connection.close().await;

        if let Some(process) = &self.inner.process {
            process.stop().await?;
        }
        info!("Browser quit");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
