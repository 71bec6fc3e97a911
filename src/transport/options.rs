//! Channel configuration options.
//!
//! Settings handed to the channel layer when opening a WebSocket. The
//! session core does not interpret them.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use bidi_session::ChannelOptions;
//!
//! let options = ChannelOptions::new()
//!     .with_header("Authorization", "Bearer abc")
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_proxy("proxy.internal:3128");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio_tungstenite::Connector;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for one channel to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ChannelOptions
// ============================================================================

/// Options for opening a channel to the remote end.
#[derive(Clone)]
pub struct ChannelOptions {
    /// Extra HTTP headers sent with the WebSocket upgrade request.
    pub headers: Vec<(String, String)>,

    /// Time allowed for TCP connect, proxy tunnel and handshake combined.
    pub connect_timeout: Duration,

    /// HTTP CONNECT proxy as `host:port`.
    pub proxy: Option<String>,

    /// TLS connector for `wss` endpoints. `None` uses rustls with the
    /// bundled webpki roots.
    pub connector: Option<Connector>,
}

impl fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("headers", &self.headers.len())
            .field("connect_timeout", &self.connect_timeout)
            .field("proxy", &self.proxy)
            .field("connector", &self.connector.is_some())
            .finish()
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            proxy: None,
            connector: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelOptions {
    /// Adds a header to the upgrade request.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-channel connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Routes channels through an HTTP CONNECT proxy at `host:port`.
    #[inline]
    #[must_use]
    pub fn with_proxy(mut self, address: impl Into<String>) -> Self {
        self.proxy = Some(address.into());
        self
    }

    /// Sets the TLS connector used for `wss` endpoints.
    #[inline]
    #[must_use]
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
