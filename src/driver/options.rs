//! Clicker launch options.
//!
//! Provides a type-safe interface for configuring how the driver process
//! is started and stopped.
//!
//! # Example
//!
//! ```ignore
//! use vibium_client::LaunchOptions;
//!
//! let options = LaunchOptions::new()
//!     .with_headless()
//!     .with_port(9515);
//!
//! let args = options.to_args();
//! // ["serve", "--headless", "--port", "9515"]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for the listening announcement.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait between terminate and forced kill.
pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ============================================================================
// LaunchOptions
// ============================================================================

/// Driver process configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Run the browser without a GUI.
    pub headless: bool,

    /// Port for the driver to listen on. `None` lets the driver choose.
    pub port: Option<u16>,

    /// Driver binary. `None` uses the configured locator.
    pub executable_path: Option<PathBuf>,

    /// Deadline for the `listening on ws://...` announcement.
    pub startup_timeout: Duration,

    /// Wait between terminate and forced kill on stop.
    pub stop_grace_period: Duration,

    /// Additional custom command-line arguments, appended after `serve`.
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl LaunchOptions {
    /// Creates a new options instance with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headless: false,
            port: None,
            executable_path: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            extra_args: Vec::new(),
        }
    }

    /// Creates options configured for headless mode.
    #[inline]
    #[must_use]
    pub fn headless() -> Self {
        Self::new().with_headless()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl LaunchOptions {
    /// Enables headless mode.
    #[inline]
    #[must_use]
    pub fn with_headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Requests a specific listening port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Uses an explicit driver binary instead of the locator.
    #[inline]
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Sets the startup deadline.
    #[inline]
    #[must_use]
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Sets the stop grace period.
    #[inline]
    #[must_use]
    pub fn with_stop_grace_period(mut self, grace_period: Duration) -> Self {
        self.stop_grace_period = grace_period;
        self
    }

    /// Adds a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Adds multiple custom command-line arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl LaunchOptions {
    /// Converts options to driver command-line arguments.
    ///
    /// Always starts with the `serve` subcommand.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4 + self.extra_args.len());
        args.push("serve".to_string());

        if self.headless {
            args.push("--headless".to_string());
        }

        if let Some(port) = self.port {
            args.push("--port".to_string());
            args.push(port.to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(Error::config(
                "Port 0 is not allowed; omit the port to let the driver choose",
            ));
        }
        if self.startup_timeout.is_zero() {
            return Err(Error::config("Startup timeout must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
