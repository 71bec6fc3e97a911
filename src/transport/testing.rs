//! In-process remote peer for tests.
//!
//! Binds a WebSocket listener on `127.0.0.1:0` and hands accepted peers
//! back to the test, which scripts the remote end's replies.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// How long a test waits for the client side to show up.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Logging
// ============================================================================

/// Routes crate logs to the test output, filtered by `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockRemote
// ============================================================================

/// A bound listener standing in for the remote end.
pub(crate) struct MockRemote {
    listener: TcpListener,
    port: u16,
}

impl MockRemote {
    /// Binds to a random localhost port.
    pub(crate) async fn bind() -> Self {
        init_tracing();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind mock remote");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    /// Returns the port the listener is bound to.
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL, `ws://127.0.0.1:{port}/session`.
    pub(crate) fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/session", self.port)
    }

    /// Accepts one client and completes the WebSocket handshake.
    pub(crate) async fn accept(&self) -> MockPeer {
        let (stream, _) = timeout(ACCEPT_TIMEOUT, self.listener.accept())
            .await
            .expect("client did not connect")
            .expect("accept");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket upgrade");
        MockPeer { ws }
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// The remote side of one accepted channel.
pub(crate) struct MockPeer {
    ws: WebSocketStream<TcpStream>,
}

impl MockPeer {
    /// Reads the next text frame as JSON. `None` once the client closed.
    pub(crate) async fn recv(&mut self) -> Option<Value> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).expect("client sent JSON"));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    }

    /// Sends a JSON record.
    pub(crate) async fn send(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Sends raw text, valid JSON or not.
    pub(crate) async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("peer send");
    }

    /// Closes the channel from the remote side.
    pub(crate) async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
