//! Session lifecycle and command dispatch.
//!
//! A [`Session`] owns at most one open channel to the remote end. It walks
//! the endpoint through resolution and the connection race, hands every
//! command a fresh identifier, and republishes traffic to observers.
//!
//! # Example
//!
//! ```no_run
//! use bidi_session::{Command, Session};
//! use serde_json::json;
//!
//! # async fn example() -> bidi_session::Result<()> {
//! let session = Session::builder()
//!     .endpoint("ws://127.0.0.1:9222/session")
//!     .build()?;
//!
//! session.connect().await?;
//! let tree = session
//!     .send(Command::new("browsingContext.getTree", json!({})))
//!     .await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::diagnostics::summarize_command;
use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, Request, SessionEvent};
use crate::transport::{
    ChannelOptions, Connection, Resolver, WsChannel, open_channel, race, resolve_candidates,
};

use super::builder::SessionBuilder;

// ============================================================================
// Constants
// ============================================================================

/// How long a discarded race loser gets to close cleanly.
const DISCARD_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No channel is open.
    Disconnected,
    /// A connect is in progress.
    Connecting,
    /// A channel is open (or test mode is active).
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A validated endpoint URL together with its channel options.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    options: ChannelOptions,
}

impl Endpoint {
    /// Parses and validates an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse, is not `ws` or
    /// `wss`, or has no host.
    pub fn new(url: &str, options: ChannelOptions) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::config(format!("Invalid endpoint URL '{url}': {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Endpoint must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }
        if url.host().is_none() {
            return Err(Error::config(format!("Endpoint URL '{url}' has no host")));
        }

        Ok(Self { url, options })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the channel options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the session.
pub(crate) struct SessionInner {
    /// Current endpoint, replaced by reconnect.
    endpoint: RwLock<Endpoint>,

    /// Resolver used to expand the endpoint host.
    resolver: Arc<dyn Resolver>,

    /// Deadline applied by `send`.
    command_timeout: Duration,

    /// Connect without opening a channel.
    test_mode: bool,

    /// Next command identifier. Never reset.
    next_id: AtomicU64,

    /// The active channel, if any.
    connection: RwLock<Option<Connection>>,

    /// Published connection state.
    state: watch::Sender<ConnectionState>,

    /// Observer notifications.
    events: broadcast::Sender<SessionEvent>,

    /// Serializes connect, close and reconnect.
    transition: AsyncMutex<()>,
}

// ============================================================================
// Session
// ============================================================================

/// Client session with a bidirectional remote end.
///
/// Cheap to clone; clones share the same channel and identifier counter.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint.read().url.as_str())
            .field("state", &self.state())
            .field("test_mode", &self.inner.test_mode)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Construction
// ============================================================================

impl Session {
    /// Creates a configuration builder for a session.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a disconnected session. Called by the builder.
    pub(crate) fn new(
        endpoint: Endpoint,
        resolver: Arc<dyn Resolver>,
        command_timeout: Duration,
        test_mode: bool,
        event_capacity: usize,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(event_capacity);

        Self {
            inner: Arc::new(SessionInner {
                endpoint: RwLock::new(endpoint),
                resolver,
                command_timeout,
                test_mode,
                next_id: AtomicU64::new(1),
                connection: RwLock::new(None),
                state,
                events,
                transition: AsyncMutex::new(()),
            }),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns a copy of the current endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint.read().clone()
    }

    /// Returns the default command deadline.
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }

    /// Returns `true` if the session was built in test mode.
    #[inline]
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.inner.test_mode
    }

    /// Returns the current connection state.
    ///
    /// A channel that the remote end closed reads as disconnected.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let state = *self.inner.state.borrow();
        if state == ConnectionState::Connected
            && !self.inner.test_mode
            && self.active_connection().is_none()
        {
            return ConnectionState::Disconnected;
        }
        state
    }

    /// Returns `true` if a channel is open, or test mode is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of commands awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.active_connection()
            .map_or(0, |connection| connection.pending_count())
    }

    /// Subscribes to commands, results and events.
    ///
    /// Only notifications published after this call are received. A
    /// subscriber that falls more than the configured capacity behind
    /// observes `RecvError::Lagged` and skips ahead.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Waits for an in-progress connect to finish.
    ///
    /// Returns `true` if the session ends up connected.
    pub async fn wait_for_connected(&self) -> bool {
        let mut state = self.inner.state.subscribe();
        let settled = state
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .is_ok();
        settled && self.is_connected()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Connects to the endpoint.
    ///
    /// Resolves the endpoint host into candidates and races them; the first
    /// channel to open becomes the session channel. Returns immediately if
    /// already connected. In test mode no channel is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllCandidatesFailed`] if no candidate opened. The
    /// session stays disconnected.
    pub async fn connect(&self) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        self.connect_locked().await
    }

    /// Closes the channel, failing every pending command.
    ///
    /// Never fails. Closing a disconnected session does nothing.
    pub async fn close(&self) {
        let _transition = self.inner.transition.lock().await;
        self.close_locked().await;
    }

    /// Closes the current channel and connects to a new endpoint.
    ///
    /// The identifier counter carries over, so identifiers issued after
    /// the reconnect never repeat earlier ones.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the new endpoint is invalid; the current
    ///   channel is left untouched
    /// - [`Error::AllCandidatesFailed`] if the new endpoint cannot be
    ///   reached; the session is left disconnected
    pub async fn reconnect(&self, url: &str, options: ChannelOptions) -> Result<()> {
        let endpoint = Endpoint::new(url, options)?;

        let _transition = self.inner.transition.lock().await;
        self.close_locked().await;

        info!(url = %endpoint.url, "Reconnecting session");
        *self.inner.endpoint.write() = endpoint;

        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<()> {
        if self.is_connected() {
            debug!("Session already connected");
            return Ok(());
        }

        if self.inner.test_mode {
            info!("Test mode: connected without a channel");
            self.inner.state.send_replace(ConnectionState::Connected);
            return Ok(());
        }

        // A channel the remote end already closed.
        let stale = self.inner.connection.write().take();
        if let Some(stale) = stale {
            stale.close().await;
        }

        let endpoint = self.endpoint();
        let mut connecting = ConnectingGuard::enter(&self.inner.state);

        let connection = self.open(&endpoint).await?;
        *self.inner.connection.write() = Some(connection);
        connecting.complete();

        Ok(())
    }

    async fn close_locked(&self) {
        let connection = self.inner.connection.write().take();
        let previous = self.inner.state.send_replace(ConnectionState::Disconnected);

        match connection {
            Some(connection) => {
                connection.close().await;
                info!("Session closed");
            }
            None if previous == ConnectionState::Disconnected => {
                debug!("Session already disconnected");
            }
            None => debug!("Session closed"),
        }
    }

    /// Resolves, races and wires up a new connection.
    async fn open(&self, endpoint: &Endpoint) -> Result<Connection> {
        let candidates = resolve_candidates(&endpoint.url, self.inner.resolver.as_ref()).await;
        debug!(
            url = %endpoint.url,
            candidates = candidates.len(),
            "Racing connection candidates"
        );

        let options = endpoint.options.clone();
        let winner = race(
            candidates,
            move |url| {
                let options = options.clone();
                async move { open_channel(&url, &options).await }
            },
            discard_channel,
        )
        .await
        .inspect_err(|e| warn!(url = %endpoint.url, error = %e, "Session connect failed"))?;

        info!(url = %winner.url, candidate = winner.index, "Session connected");

        let connection = Connection::new(winner.channel);
        let events = self.inner.events.clone();
        connection.set_event_handler(Box::new(move |event| {
            // No subscribers is fine.
            let _ = events.send(event);
        }));

        Ok(connection)
    }
}

// ============================================================================
// Session - Commands
// ============================================================================

impl Session {
    /// Sends a command and waits for its result with the default deadline.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no channel is open; nothing is sent
    /// - [`Error::Remote`] if the remote end answered with an error
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::ConnectionClosed`] if the channel closed first
    pub async fn send(&self, command: Command) -> Result<serde_json::Value> {
        self.send_with_timeout(command, self.inner.command_timeout)
            .await
    }

    /// Sends a command and waits for its result with a custom deadline.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        command: Command,
        limit: Duration,
    ) -> Result<serde_json::Value> {
        let connection = self.active_connection().ok_or(Error::NotConnected)?;
        let request = Request::new(self.allocate_id()?, command);
        self.announce(&request);

        let method = request.command.method.clone();
        let response = connection.send(request, limit).await?;
        response.into_result(&method)
    }

    /// Sends a command without waiting for its response.
    ///
    /// Returns the identifier the command was sent with. The response, if
    /// any, is still published to subscribers.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no channel is open; nothing is sent
    /// - [`Error::ConnectionClosed`] if the channel closed meanwhile
    pub fn send_async(&self, command: Command) -> Result<CommandId> {
        let connection = self.active_connection().ok_or(Error::NotConnected)?;
        let request = Request::new(self.allocate_id()?, command);
        self.announce(&request);

        connection.send_async(&request)?;
        Ok(request.id)
    }

    fn active_connection(&self) -> Option<Connection> {
        self.inner
            .connection
            .read()
            .as_ref()
            .filter(|connection| connection.is_open())
            .cloned()
    }

    fn allocate_id(&self) -> Result<CommandId> {
        let raw = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        CommandId::new(raw).ok_or_else(|| Error::protocol("Command identifier space exhausted"))
    }

    /// Logs the command and publishes it before it reaches the channel.
    fn announce(&self, request: &Request) {
        debug!(
            id = %request.id,
            method = request.method(),
            command = %summarize_command(request),
            "Sending command"
        );

        if self.inner.events.receiver_count() > 0 {
            let _ = self.inner.events.send(SessionEvent::CommandSent(request.clone()));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Publishes `Connecting` and falls back to `Disconnected` unless completed,
/// including when the connect future is dropped.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<ConnectionState>,
    completed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn enter(state: &'a watch::Sender<ConnectionState>) -> Self {
        state.send_replace(ConnectionState::Connecting);
        Self {
            state,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
        self.state.send_replace(ConnectionState::Connected);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Closes a channel that lost the connection race.
fn discard_channel(url: Url, mut channel: WsChannel) {
    tokio::spawn(async move {
        if timeout(DISCARD_CLOSE_TIMEOUT, channel.close(None))
            .await
            .is_err()
        {
            debug!(%url, "Losing channel did not close in time");
        }
    });
}

// ============================================================================
// Tests
// ============================================================================
