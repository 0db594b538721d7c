//! Synchronous wrappers over the async API.
//!
//! Each wrapper owns (or shares) a small multi-threaded tokio runtime that
//! drives the event loop while the caller blocks. Errors are the same
//! [`Error`](crate::Error) values the async API returns.
//!
//! Do not call these from inside an async context; `block_on` panics there.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use vibium_client::LaunchOptions;
//! use vibium_client::blocking::Browser;
//!
//! # fn example() -> vibium_client::Result<()> {
//! let browser = Browser::launch(&LaunchOptions::headless())?;
//! let tree = browser.send("browsingContext.getTree", json!({}))?;
//! println!("{tree}");
//! browser.quit()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::driver::{LaunchOptions, SupervisedProcess, Supervisor};
use crate::error::Result;
use crate::identifiers::SubscriptionId;
use crate::protocol::Event;
use crate::transport::{ConnectOptions, ConnectionState};

// ============================================================================
// Runtime
// ============================================================================

/// Worker threads per blocking runtime.
const WORKER_THREADS: usize = 2;

fn runtime() -> Result<Arc<Runtime>> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name("vibium-blocking")
        .enable_all()
        .build()?;
    Ok(Arc::new(runtime))
}

// ============================================================================
// Connection
// ============================================================================

/// Blocking protocol connection.
#[derive(Clone)]
pub struct Connection {
    runtime: Arc<Runtime>,
    inner: crate::transport::Connection,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Connection").field(&self.inner).finish()
    }
}

impl Connection {
    /// Connects to a driver endpoint.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::connect`].
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with_options(url, ConnectOptions::default())
    }

    /// Connects with explicit options.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::connect_with_options`].
    pub fn connect_with_options(url: &str, options: ConnectOptions) -> Result<Self> {
        let runtime = runtime()?;
        let inner =
            runtime.block_on(crate::transport::Connection::connect_with_options(url, options))?;
        Ok(Self { runtime, inner })
    }

    /// Sends a command with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::send_command`].
    pub fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.runtime.block_on(self.inner.send(method, params))
    }

    /// Sends a command with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::send_command`].
    pub fn send_command(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.runtime
            .block_on(self.inner.send_command(method, params, timeout))
    }

    /// Subscribes to an event. Handlers run on the runtime's blocking pool.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner.on(event, handler)
    }

    /// Unsubscribes from an event.
    pub fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        self.inner.off(event, subscription)
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.runtime.block_on(self.inner.close());
    }

    /// Returns the async connection.
    #[inline]
    #[must_use]
    pub fn as_async(&self) -> &crate::transport::Connection {
        &self.inner
    }
}

// ============================================================================
// Browser
// ============================================================================

/// Blocking browser session.
#[derive(Clone)]
pub struct Browser {
    runtime: Arc<Runtime>,
    inner: crate::browser::Browser,
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Browser").field(&self.inner).finish()
    }
}

impl Browser {
    /// Launches a driver and connects to it.
    ///
    /// # Errors
    ///
    /// See [`crate::Browser::launch`].
    pub fn launch(options: &LaunchOptions) -> Result<Self> {
        Self::launch_with(&Supervisor::new(), options, ConnectOptions::default())
    }

    /// Launches with an explicit supervisor and connect options.
    ///
    /// # Errors
    ///
    /// See [`crate::Browser::launch`].
    pub fn launch_with(
        supervisor: &Supervisor,
        options: &LaunchOptions,
        connect_options: ConnectOptions,
    ) -> Result<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(crate::browser::Browser::launch_with(
            supervisor,
            options,
            connect_options,
        ))?;
        Ok(Self { runtime, inner })
    }

    /// Attaches to an already running driver.
    ///
    /// # Errors
    ///
    /// See [`crate::Browser::connect`].
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(crate::browser::Browser::connect(url))?;
        Ok(Self { runtime, inner })
    }

    /// Sends a command with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::send_command`].
    pub fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.runtime.block_on(self.inner.send(method, params))
    }

    /// Sends a command with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`crate::Connection::send_command`].
    pub fn send_command(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.runtime
            .block_on(self.inner.send_command(method, params, timeout))
    }

    /// Subscribes to an event.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner.on(event, handler)
    }

    /// Unsubscribes from an event.
    pub fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        self.inner.off(event, subscription)
    }

    /// Returns a blocking handle to the underlying connection.
    #[must_use]
    pub fn connection(&self) -> Connection {
        Connection {
            runtime: Arc::clone(&self.runtime),
            inner: self.inner.connection().clone(),
        }
    }

    /// Returns the driver process, if this session launched one.
    #[inline]
    #[must_use]
    pub fn process(&self) -> Option<&SupervisedProcess> {
        self.inner.process()
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Closes the connection and stops the driver. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`crate::Browser::quit`].
    pub fn quit(&self) -> Result<()> {
        self.runtime.block_on(self.inner.quit())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;
    use std::thread;

    use serde_json::json;

    use crate::error::Error;
    use crate::transport::mock::MockDriver;

    /// Runs a mock driver on its own runtime thread.
    fn spawn_peer<F, Fut>(script: F) -> (String, thread::JoinHandle<()>)
    where
        F: FnOnce(crate::transport::mock::MockPeer) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()>,
    {
        let (url_tx, url_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let driver = MockDriver::bind().await;
                url_tx.send(driver.ws_url()).expect("send url");
                let peer = driver.accept().await;
                script(peer).await;
            });
        });
        (url_rx.recv().expect("url"), handle)
    }

    #[test]
    fn test_blocking_round_trip() {
        let (url, peer) = spawn_peer(|mut peer| async move {
            let command = peer.recv_command().await;
            peer.respond(&command["id"], json!(42)).await;
            peer.wait_closed().await;
        });

        let connection = Connection::connect(&url).expect("connect");
        let result = connection.send("script.evaluate", json!({})).expect("send");
        assert_eq!(result, json!({ "value": 42 }));

        connection.close();
        assert!(!connection.is_connected());
        peer.join().expect("peer");
    }

    #[test]
    fn test_blocking_errors_are_unwrapped() {
        let (url, peer) = spawn_peer(|mut peer| async move {
            let command = peer.recv_command().await;
            peer.send_json(json!({ "id": command["id"], "error": { "code": 3, "message": "bad" } }))
                .await;
            peer.wait_closed().await;
        });

        let browser = Browser::connect(&url).expect("connect");
        let err = browser.send("foo", json!({})).unwrap_err();
        assert!(matches!(err, Error::Protocol { code: 3, ref message } if message == "bad"));

        browser.quit().expect("quit");
        browser.quit().expect("quit twice");
        peer.join().expect("peer");
    }

    #[test]
    fn test_blocking_timeout() {
        let (url, peer) = spawn_peer(|mut peer| async move {
            let _ = peer.recv_command().await;
            peer.wait_closed().await;
        });

        let browser = Browser::connect(&url).expect("connect");
        let err = browser
            .send_command("slow", json!({}), Duration::from_millis(50))
            .unwrap_err();
        assert!(err.is_timeout());

        browser.connection().close();
        peer.join().expect("peer");
    }

    #[test]
    fn test_blocking_connect_failure() {
        let err = Connection::connect("http://localhost:1").unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }
}
