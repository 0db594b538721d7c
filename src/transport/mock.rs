//! In-process WebSocket peer standing in for the clicker driver in tests.
//!
//! # Connection Flow
//!
//! 1. `MockDriver::bind` - Bind to `127.0.0.1:0` (random port)
//! 2. Client connects to `MockDriver::ws_url`
//! 3. `MockDriver::accept` - Complete the WebSocket handshake
//! 4. `MockPeer` - Read commands, write responses and events

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, from_str, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// How long a test waits for the client to do something.
const PEER_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Tracing
// ============================================================================

/// Routes test logs through `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockDriver
// ============================================================================

/// A bound listener that has not yet accepted the client.
pub(crate) struct MockDriver {
    listener: TcpListener,
    port: u16,
}

impl MockDriver {
    /// Binds to a random localhost port.
    pub(crate) async fn bind() -> Self {
        init_tracing();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    /// Returns the bound port.
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL for this peer.
    pub(crate) fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accepts the client and completes the WebSocket upgrade.
    pub(crate) async fn accept(self) -> MockPeer {
        let (stream, _) = timeout(PEER_TIMEOUT, self.listener.accept())
            .await
            .expect("client did not connect")
            .expect("accept failed");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("WebSocket upgrade failed");
        MockPeer { ws }
    }

    /// Accepts the TCP connection but never answers the upgrade.
    pub(crate) async fn accept_silently(self) -> TcpStream {
        let (stream, _) = self.listener.accept().await.expect("accept failed");
        stream
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// The driver side of an established connection.
pub(crate) struct MockPeer {
    ws: WebSocketStream<TcpStream>,
}

impl MockPeer {
    /// Reads the next command frame sent by the client.
    pub(crate) async fn recv_command(&mut self) -> Value {
        loop {
            let message = timeout(PEER_TIMEOUT, self.ws.next())
                .await
                .expect("no command received")
                .expect("stream ended")
                .expect("read failed");
            if let Message::Text(text) = message {
                return from_str(text.as_str()).expect("command is not JSON");
            }
        }
    }

    /// Sends a raw text frame.
    pub(crate) async fn send_text(&mut self, text: &str) {
        // The client may already be gone; tests that care check elsewhere.
        let _ = self.ws.send(Message::Text(text.to_string().into())).await;
    }

    /// Sends a JSON frame.
    pub(crate) async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Responds to `id` with a success result.
    pub(crate) async fn respond(&mut self, id: &Value, result: Value) {
        self.send_json(json!({ "id": id, "result": result })).await;
    }

    /// Sends an event frame.
    pub(crate) async fn emit(&mut self, method: &str, params: Value) {
        self.send_json(json!({ "method": method, "params": params }))
            .await;
    }

    /// Waits until the client closes the socket.
    pub(crate) async fn wait_closed(&mut self) {
        loop {
            match timeout(PEER_TIMEOUT, self.ws.next()).await {
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) | Err(_) => return,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Closes the socket from the driver side.
    pub(crate) async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ws_url_format() {
        let driver = MockDriver::bind().await;
        let expected = format!("ws://127.0.0.1:{}", driver.port);
        assert_eq!(driver.ws_url(), expected);
    }
}
