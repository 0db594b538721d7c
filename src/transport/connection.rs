//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to the clicker driver,
//! including command/response correlation and event fan-out.
//!
//! # Event Loop
//!
//! The connection spawns one tokio task that handles:
//!
//! - Incoming frames (responses, events), classified by [`InboundFrame`]
//! - Outgoing commands queued by callers
//! - Teardown of pending commands when the socket ends
//!
//! Command timeouts run on separate timer tasks owned by the pending table,
//! and event handlers run on the blocking pool, so neither can stall reads.
//!
//! # States
//!
//! ```text
//! Connecting ──handshake──► Open ──close / remote close / error──► Closed
//! ```
//!
//! `Closed` is terminal. Reconnecting requires a new [`Connection`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, CommandIdGenerator, SubscriptionId};
use crate::protocol::{Command, Event, InboundFrame};

use super::pending::PendingTable;
use super::subscriptions::{EventHandler, Subscriptions};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close` waits for the event loop to finish.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Commands and events flow.
    Open,
    /// Terminal. No further dispatch or resolution.
    Closed,
}

// ============================================================================
// ConnectOptions
// ============================================================================

/// Connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Timeout used by [`Connection::send`].
    pub command_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the default command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Internal messages for the event loop.
enum Outbound {
    /// Write a serialized command.
    Command { id: CommandId, text: String },
    /// Send a close frame and stop.
    Close,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between handles and the event loop.
struct Shared {
    state: RwLock<ConnectionState>,
    pending: Arc<PendingTable>,
    subscriptions: Subscriptions,
}

impl Shared {
    fn is_open(&self) -> bool {
        *self.state.read() == ConnectionState::Open
    }

    /// Marks the connection closed and fails everything outstanding.
    ///
    /// Returns `false` if it was already closed.
    fn teardown(&self, reason: &str) -> bool {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
            self.subscriptions.close();
        }

        let failed = self.pending.fail_all();
        debug!(reason, failed, "Connection torn down");
        true
    }

    fn handle_frame(&self, text: &str) {
        // Frames read after teardown but before the loop exits are dropped.
        if !self.is_open() {
            trace!("Dropping frame received after close");
            return;
        }

        match InboundFrame::parse(text) {
            InboundFrame::CommandResponse(response) => {
                let id = response.id;
                if !self.pending.resolve(id, response.into_result()) {
                    debug!(%id, "Response for unknown or expired command");
                }
            }
            InboundFrame::Event(event) => self.subscriptions.dispatch(event),
            InboundFrame::Unrecognized { reason } => {
                warn!(%reason, "Dropping unrecognized frame");
            }
        }
    }
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    url: String,
    ids: CommandIdGenerator,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    command_timeout: Duration,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the clicker driver.
///
/// Handles command/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; clones share the
/// same socket. When the last clone is dropped the event loop stops and
/// outstanding commands fail with [`Error::ConnectionClosed`].
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use vibium_client::Connection;
///
/// # async fn example() -> vibium_client::Result<()> {
/// let connection = Connection::connect("ws://localhost:9515").await?;
/// let tree = connection.send("browsingContext.getTree", json!({})).await?;
/// println!("{tree}");
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Connects with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails or does not
    /// complete within 30s.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_options(url, ConnectOptions::default()).await
    }

    /// Connects with a custom handshake deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails or does not
    /// complete within `connect_timeout`.
    pub async fn connect_with_timeout(url: &str, connect_timeout: Duration) -> Result<Self> {
        let options = ConnectOptions::default().with_connect_timeout(connect_timeout);
        Self::connect_with_options(url, options).await
    }

    /// Connects with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the URL is not `ws://`/`wss://`, or
    /// the handshake fails or does not complete within the deadline.
    pub async fn connect_with_options(url: &str, options: ConnectOptions) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::connection(format!("Invalid endpoint {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::connection(format!(
                "Unsupported endpoint scheme {}: {url}",
                parsed.scheme()
            )));
        }

        let shared = Arc::new(Shared {
            state: RwLock::new(ConnectionState::Connecting),
            pending: PendingTable::new(),
            subscriptions: Subscriptions::default(),
        });

        debug!(url, "Connecting");
        let timeout_ms = options.connect_timeout.as_millis() as u64;
        let handshake = timeout(options.connect_timeout, tokio_tungstenite::connect_async(url));
        let ws_stream = match handshake.await {
            Ok(Ok((ws_stream, _))) => ws_stream,
            Ok(Err(e)) => {
                *shared.state.write() = ConnectionState::Closed;
                return Err(Error::connection(format!("Failed to connect to {url}: {e}")));
            }
            Err(_) => {
                *shared.state.write() = ConnectionState::Closed;
                return Err(Error::connection(format!(
                    "Timed out after {timeout_ms}ms connecting to {url}"
                )));
            }
        };

        *shared.state.write() = ConnectionState::Open;
        info!(url, "WebSocket connection established");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let event_loop = tokio::spawn(run_event_loop(
            ws_stream,
            outbound_rx,
            Arc::clone(&shared),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                ids: CommandIdGenerator::new(),
                outbound_tx,
                shared,
                event_loop: Mutex::new(Some(event_loop)),
                command_timeout: options.command_timeout,
            }),
        })
    }
}

// ============================================================================
// Connection - Commands
// ============================================================================

impl Connection {
    /// Sends a command with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_command`].
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_command(method, params, self.inner.command_timeout)
            .await
    }

    /// Sends a command and waits for its response.
    ///
    /// Object results are returned as-is, a missing result becomes `{}`,
    /// and a scalar result `x` becomes `{"value": x}`.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the driver answered with an error
    /// - [`Error::Timeout`] if no response arrived within `command_timeout`
    /// - [`Error::ConnectionClosed`] if the connection is or becomes closed
    pub async fn send_command(
        &self,
        method: &str,
        params: Value,
        command_timeout: Duration,
    ) -> Result<Value> {
        let shared = &self.inner.shared;
        if !shared.is_open() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.inner.ids.next_id();
        let text = to_string(&Command::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        shared.pending.register(id, method, tx, command_timeout);
        let _guard = PendingGuard {
            pending: &shared.pending,
            id,
        };

        // Teardown may have run between the state check and registration.
        if !shared.is_open() {
            shared.pending.resolve(id, Err(Error::ConnectionClosed));
        } else if self
            .inner
            .outbound_tx
            .send(Outbound::Command { id, text })
            .is_err()
        {
            shared.pending.resolve(id, Err(Error::ConnectionClosed));
        } else {
            debug!(%id, method, "Command queued");
        }

        rx.await.unwrap_or(Err(Error::ConnectionClosed))
    }
}

/// Drops the pending entry if the caller stops waiting.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: CommandId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.cancel(self.id) {
            debug!(id = %self.id, "Command abandoned by caller");
        }
    }
}

// ============================================================================
// Connection - Events
// ============================================================================

impl Connection {
    /// Subscribes a handler to an event method.
    ///
    /// Multiple handlers per event are allowed. Subscriptions survive
    /// `close`, but nothing is dispatched once the connection is closed.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let id = self.inner.shared.subscriptions.add(event, handler);
        debug!(event, %id, "Subscribed to event");
        id
    }

    /// Removes a handler. Returns `false` if it was not subscribed.
    pub fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        let removed = self.inner.shared.subscriptions.remove(event, subscription);
        if removed {
            debug!(event, %subscription, "Unsubscribed from event");
        }
        removed
    }

    /// Removes every handler for an event.
    pub fn off_all(&self, event: &str) -> usize {
        self.inner.shared.subscriptions.remove_all(event)
    }

    /// Returns the number of handlers subscribed to an event.
    #[inline]
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.shared.subscriptions.count(event)
    }
}

// ============================================================================
// Connection - State
// ============================================================================

impl Connection {
    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.read()
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.shared.is_open()
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.shared.pending.len()
    }

    /// Closes the connection.
    ///
    /// Outstanding commands fail with [`Error::ConnectionClosed`] and their
    /// timers are cancelled before this returns. Idempotent.
    pub async fn close(&self) {
        if self.inner.shared.teardown("closed by client") {
            info!(url = %self.inner.url, "Closing connection");
        }
        let _ = self.inner.outbound_tx.send(Outbound::Close);

        let event_loop = self.inner.event_loop.lock().take();
        if let Some(handle) = event_loop
            && timeout(CLOSE_TIMEOUT, handle).await.is_err()
        {
            warn!(url = %self.inner.url, "Event loop did not stop in time");
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O.
async fn run_event_loop(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(frame = %text.as_str(), "Received frame");
                        shared.handle_frame(text.as_str());
                    }

                    Some(Ok(Message::Close(_))) => break "closed by remote",

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break "transport error";
                    }

                    None => break "stream ended",

                    // Ignore Binary, Ping, Pong
                    Some(Ok(_)) => {}
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Command { id, text }) => {
                        if let Err(e) = send_frame(&mut ws_write, &text).await {
                            // Teardown fails this command with the rest.
                            error!(%id, error = %e, "Failed to write command");
                            break "write error";
                        }
                        trace!(%id, "Command sent");
                    }

                    Some(Outbound::Close) => {
                        let _ = ws_write.close().await;
                        break "closed by client";
                    }

                    None => {
                        let _ = ws_write.close().await;
                        break "all handles dropped";
                    }
                }
            }
        }
    };

    shared.teardown(reason);
    debug!(reason, "Event loop terminated");
}

async fn send_frame(ws_write: &mut WsSink, text: &str) -> Result<()> {
    ws_write.send(Message::Text(text.to_string().into())).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
