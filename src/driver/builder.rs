//! Builder pattern for supervisor configuration.
//!
//! Provides a fluent API for injecting the collaborators a [`Supervisor`]
//! depends on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vibium_client::{DefaultLocator, NoopInstaller, ProcessRegistry, Supervisor};
//!
//! let supervisor = Supervisor::builder()
//!     .registry(Arc::new(ProcessRegistry::new()))
//!     .locator(DefaultLocator::new().with_cache_dir("/opt/vibium"))
//!     .installer(NoopInstaller)
//!     .build();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use super::core::Supervisor;
use super::installer::{DriverInstaller, Installer};
use super::locator::{BinaryLocator, DefaultLocator};
use super::registry::ProcessRegistry;

// ============================================================================
// SupervisorBuilder
// ============================================================================

/// Builder for configuring a [`Supervisor`] instance.
///
/// Use [`Supervisor::builder()`] to create a new builder. Anything left
/// unset falls back to the global registry, [`DefaultLocator`] and
/// [`DriverInstaller`].
#[derive(Default, Clone)]
pub struct SupervisorBuilder {
    /// Registry started processes are added to.
    registry: Option<Arc<ProcessRegistry>>,
    /// Binary discovery.
    locator: Option<Arc<dyn BinaryLocator>>,
    /// Browser dependency installer.
    installer: Option<Arc<dyn Installer>>,
}

impl fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("registry", &self.registry)
            .field("custom_locator", &self.locator.is_some())
            .field("custom_installer", &self.installer.is_some())
            .finish()
    }
}

// ============================================================================
// SupervisorBuilder Implementation
// ============================================================================

impl SupervisorBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry started processes are added to.
    #[inline]
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the binary locator.
    #[inline]
    #[must_use]
    pub fn locator(mut self, locator: impl BinaryLocator + 'static) -> Self {
        self.locator = Some(Arc::new(locator));
        self
    }

    /// Sets the installer.
    #[inline]
    #[must_use]
    pub fn installer(mut self, installer: impl Installer + 'static) -> Self {
        self.installer = Some(Arc::new(installer));
        self
    }

    /// Builds the supervisor.
    #[must_use]
    pub fn build(self) -> Supervisor {
        Supervisor {
            registry: self.registry.unwrap_or_else(ProcessRegistry::global),
            locator: self
                .locator
                .unwrap_or_else(|| Arc::new(DefaultLocator::new())),
            installer: self
                .installer
                .unwrap_or_else(|| Arc::new(DriverInstaller::new())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
