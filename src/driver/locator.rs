//! Clicker binary discovery.
//!
//! # Search Order
//!
//! 1. `VIBIUM_CLICKER_PATH` environment variable (must name a regular file)
//! 2. `clicker` (`clicker.exe` on Windows) on `PATH`
//! 3. The platform cache directory (`<cache>/vibium/clicker`)

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding binary discovery.
pub const CLICKER_PATH_ENV: &str = "VIBIUM_CLICKER_PATH";

/// Platform executable name.
#[cfg(windows)]
pub const CLICKER_EXECUTABLE: &str = "clicker.exe";

/// Platform executable name.
#[cfg(not(windows))]
pub const CLICKER_EXECUTABLE: &str = "clicker";

/// Cache subdirectory holding the binary.
const CACHE_SUBDIR: &str = "vibium";

// ============================================================================
// BinaryLocator
// ============================================================================

/// Resolves the driver binary when no explicit path is given.
pub trait BinaryLocator: Send + Sync {
    /// Returns the binary path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if no binary can be found.
    fn locate(&self) -> Result<PathBuf>;
}

// ============================================================================
// DefaultLocator
// ============================================================================

/// Environment, `PATH`, then cache directory.
#[derive(Debug, Clone)]
pub struct DefaultLocator {
    env_var: String,
    executable: String,
    cache_dir: Option<PathBuf>,
}

impl Default for DefaultLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultLocator {
    /// Creates a locator with the standard search order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            env_var: CLICKER_PATH_ENV.to_string(),
            executable: CLICKER_EXECUTABLE.to_string(),
            cache_dir: dirs::cache_dir().map(|dir| dir.join(CACHE_SUBDIR)),
        }
    }

    /// Overrides the environment variable name.
    #[inline]
    #[must_use]
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    /// Overrides the executable name searched on `PATH` and in the cache.
    #[inline]
    #[must_use]
    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.executable = name.into();
        self
    }

    /// Overrides the cache directory.
    #[inline]
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Returns the cache directory searched last.
    #[inline]
    #[must_use]
    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }

    fn not_found(&self) -> Error {
        let cache = self
            .cache_dir
            .as_ref()
            .map_or_else(|| "<no cache directory>".to_string(), |d| d.display().to_string());
        Error::binary_not_found(format!(
            "could not find {exe}. Install options:\n  \
             1. Set {env} to the binary path\n  \
             2. Add {exe} to your system PATH\n  \
             3. Place {exe} in: {cache}\n\
             Download from: https://github.com/VibiumDev/vibium/releases",
            exe = self.executable,
            env = self.env_var,
        ))
    }
}

impl BinaryLocator for DefaultLocator {
    fn locate(&self) -> Result<PathBuf> {
        debug!(executable = %self.executable, "Looking for clicker binary");

        if let Some(path) = env::var_os(&self.env_var).map(PathBuf::from)
            && path.is_file()
        {
            debug!(path = %path.display(), env = %self.env_var, "Found clicker via environment");
            return Ok(path);
        }

        if let Ok(path) = which::which(&self.executable) {
            debug!(path = %path.display(), "Found clicker in PATH");
            return Ok(path);
        }

        if let Some(path) = self.cache_dir.as_ref().map(|d| d.join(&self.executable))
            && path.is_file()
        {
            debug!(path = %path.display(), "Found clicker in cache");
            return Ok(path);
        }

        Err(self.not_found())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn isolated() -> DefaultLocator {
        DefaultLocator::new()
            .with_env_var("VIBIUM_TEST_UNSET_CLICKER_PATH")
            .with_executable("clicker-test-binary-that-does-not-exist")
    }

    #[test]
    fn test_default_names() {
        let locator = DefaultLocator::new();
        assert_eq!(locator.env_var, "VIBIUM_CLICKER_PATH");
        assert!(locator.executable.starts_with("clicker"));
    }

    #[test]
    fn test_found_in_cache_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locator = isolated().with_cache_dir(dir.path());
        let binary = dir.path().join("clicker-test-binary-that-does-not-exist");
        fs::write(&binary, b"").expect("write");

        assert_eq!(locator.locate().expect("should find binary"), binary);
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = isolated().with_cache_dir(dir.path()).locate().unwrap_err();

        assert!(matches!(err, Error::BinaryNotFound { .. }));
        let message = err.to_string();
        assert!(message.contains("VIBIUM_TEST_UNSET_CLICKER_PATH"));
        assert!(message.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_cache_directory_is_not_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("clicker-test-binary-that-does-not-exist")).expect("mkdir");
        let result = isolated().with_cache_dir(dir.path()).locate();
        assert!(result.is_err());
    }
}
