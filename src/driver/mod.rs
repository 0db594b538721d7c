//! Clicker driver process management.
//!
//! This module launches the clicker driver, tracks it, and tears it down
//! together with everything it spawned.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Supervisor`] | Launches processes and waits for their port |
//! | [`SupervisorBuilder`] | Collaborator injection |
//! | [`SupervisedProcess`] | Handle to a running driver |
//! | [`ProcessRegistry`] | Exit-time cleanup net |
//! | [`LaunchOptions`] | Launch configuration |
//! | [`BinaryLocator`] / [`DefaultLocator`] | Binary discovery |
//! | [`Installer`] / [`DriverInstaller`] | Browser dependency installation |
//!
//! # Example
//!
//! ```no_run
//! use vibium_client::{LaunchOptions, Supervisor};
//!
//! # async fn example() -> vibium_client::Result<()> {
//! let process = Supervisor::new()
//!     .start(&LaunchOptions::headless())
//!     .await?;
//!
//! assert!(process.is_alive());
//! process.stop().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for supervisor configuration.
pub mod builder;

/// Core supervisor implementation.
pub mod core;

/// Browser dependency installation.
pub mod installer;

/// Process tree termination.
pub mod kill_tree;

/// Binary discovery.
pub mod locator;

/// Launch options.
pub mod options;

/// Supervised process handle.
pub mod process;

/// Process-wide registry and exit hook.
pub mod registry;

/// Fake driver scripts for tests.
#[cfg(all(test, unix))]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SupervisorBuilder;
pub use core::Supervisor;
pub use installer::{DriverInstaller, Installer, NoopInstaller};
pub use locator::{BinaryLocator, CLICKER_PATH_ENV, DefaultLocator};
pub use options::LaunchOptions;
pub use process::SupervisedProcess;
pub use registry::{ManagedProcess, ProcessRegistry};
