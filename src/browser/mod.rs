//! Browser sessions.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Browser`] | Connection to a driver, optionally owning its process |
//!
//! # Example
//!
//! ```no_run
//! use vibium_client::{Browser, LaunchOptions, Result};
//!
//! # async fn example() -> Result<()> {
//! let browser = Browser::launch(&LaunchOptions::headless()).await?;
//!
//! browser.on("log.entryAdded", |event| {
//!     println!("{}", event.params);
//! });
//!
//! browser.quit().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Launch/connect/quit session.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use session::Browser;
