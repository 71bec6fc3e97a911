//! Opening a single WebSocket channel.
//!
//! # Steps
//!
//! 1. Build the upgrade request (URL plus configured headers)
//! 2. Open TCP, directly or through an HTTP CONNECT proxy
//! 3. Wrap in TLS for `wss` and perform the WebSocket handshake
//!
//! The whole sequence is bounded by the configured connect timeout.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as UpgradeRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls_with_config};
use tracing::debug;
use url::{Host, Url};

use crate::error::{Error, Result};

use super::ChannelOptions;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the proxy's CONNECT response head.
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

// ============================================================================
// Types
// ============================================================================

/// An open WebSocket channel to one remote peer.
pub type WsChannel = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Public API
// ============================================================================

/// Opens a channel to `url`.
///
/// # Errors
///
/// - [`Error::ConnectionTimeout`] if the channel does not open in time
/// - [`Error::Config`] if the URL or a header is invalid
/// - [`Error::Connection`] if TCP, the proxy, TLS or the handshake fails
pub async fn open_channel(url: &Url, options: &ChannelOptions) -> Result<WsChannel> {
    let limit = options.connect_timeout;

    timeout(limit, open(url, options))
        .await
        .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?
}

async fn open(url: &Url, options: &ChannelOptions) -> Result<WsChannel> {
    let request = upgrade_request(url, options)?;

    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::config(format!("No port for endpoint: {url}")))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(Error::config(format!("No host in endpoint: {url}"))),
    };

    let stream = match options.proxy.as_deref() {
        Some(proxy) => {
            let authority = format!("{}:{port}", url.host_str().unwrap_or(&host));
            tunnel(proxy, &authority).await?
        }
        None => TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| Error::connection(format!("TCP connect failed: {e}")))?,
    };
    stream.set_nodelay(true)?;

    let (channel, response) =
        client_async_tls_with_config(request, stream, None, options.connector.clone())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

    debug!(%url, status = %response.status(), "Channel open");

    Ok(channel)
}

// ============================================================================
// Upgrade Request
// ============================================================================

fn upgrade_request(url: &Url, options: &ChannelOptions) -> Result<UpgradeRequest> {
    let mut request = url.as_str().into_client_request()?;

    for (name, value) in &options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("Invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("Invalid value for header {name:?}: {e}")))?;
        request.headers_mut().append(header_name, header_value);
    }

    Ok(request)
}

// ============================================================================
// Proxy Tunnel
// ============================================================================

/// Opens a TCP tunnel to `authority` through an HTTP CONNECT proxy.
async fn tunnel(proxy: &str, authority: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(proxy)
        .await
        .map_err(|e| Error::connection(format!("Proxy {proxy} unreachable: {e}")))?;

    let connect = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(connect.as_bytes()).await?;

    let mut head = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::connection(format!(
                "Proxy {proxy} closed during CONNECT"
            )));
        }
        head.extend_from_slice(&chunk[..n]);
        if head.len() > MAX_PROXY_RESPONSE {
            return Err(Error::protocol("Proxy CONNECT response too large"));
        }
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(Error::connection(format!(
            "Proxy {proxy} refused CONNECT {authority}: {status_line}"
        )));
    }

    debug!(proxy, authority, "Proxy tunnel established");
    Ok(stream)
}

// ============================================================================
// Tests
// ============================================================================
