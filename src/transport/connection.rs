//! WebSocket connection and event loop.
//!
//! This module owns one open channel, including request/response
//! correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the remote end (responses, events)
//! - Outgoing serialized commands from the session
//! - Request/response correlation by [`CommandId`]
//! - Event handler callbacks
//!
//! # Waiter Discipline
//!
//! A waiter is inserted before its command is queued and removed exactly
//! once: by the matching response, by its own timeout, by a failed write,
//! or by shutdown. Whoever removes it settles it.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::diagnostics::summarize_message;
use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Inbound, Request, Response, SessionEvent};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// How long close waits for the event loop to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Map of command IDs to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<Response>>>;

/// Event handler callback type.
///
/// Called for each response and event received from the remote end.
pub type EventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a serialized command. `waiter` is set when a caller awaits it.
    Write {
        id: CommandId,
        json: String,
        waiter: bool,
    },
    /// Close the channel.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the remote end.
///
/// Handles request/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// Clones share the same channel.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
    /// Event loop task, taken by the first close.
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Connection {
    /// Creates a new connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));

        let task = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&event_handler),
        ));

        Self {
            command_tx,
            correlation,
            event_handler,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        let mut guard = self.event_handler.lock();
        *guard = Some(handler);
    }

    /// Clears the event handler.
    pub fn clear_event_handler(&self) {
        let mut guard = self.event_handler.lock();
        *guard = None;
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Queues a command for writing without waiting for its response.
    ///
    /// A response that arrives later is still published to the event
    /// handler but matches no waiter.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the request cannot be serialized
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    pub fn send_async(&self, request: &Request) -> Result<()> {
        let json = to_string(request)?;

        self.command_tx
            .send(ConnectionCommand::Write {
                id: request.id,
                json,
                waiter: false,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Sends a command and waits for its response.
    ///
    /// Resolves with the raw [`Response`]; interpreting an error response
    /// is left to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the request cannot be serialized
    /// - [`Error::ConnectionClosed`] if the channel closes first
    /// - [`Error::RequestTimeout`] if no response arrives within `limit`
    /// - [`Error::Connection`] if writing the command fails
    /// - [`Error::Protocol`] if `request.id` is already awaiting a response,
    ///   or the response carries its id but is otherwise invalid
    pub async fn send(&self, request: Request, limit: Duration) -> Result<Response> {
        let id = request.id;
        let json = to_string(&request)?;

        let (response_tx, mut response_rx) = oneshot::channel();
        match self.correlation.lock().entry(id) {
            Entry::Occupied(_) => {
                return Err(Error::protocol(format!(
                    "command {id} is already awaiting a response"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(response_tx);
            }
        }

        let queued = self.command_tx.send(ConnectionCommand::Write {
            id,
            json,
            waiter: true,
        });
        if queued.is_err() {
            self.correlation.lock().remove(&id);
            return Err(Error::ConnectionClosed);
        }

        match timeout(limit, &mut response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let removed = self.correlation.lock().remove(&id).is_some();
                if !removed {
                    // Settled at the deadline; the settler already sent.
                    return response_rx.await.unwrap_or(Err(Error::ConnectionClosed));
                }

                debug!(%id, method = request.method(), "Removed timed-out waiter");
                let Request { command, .. } = request;
                Err(Error::request_timeout(
                    command.method,
                    id,
                    command.params,
                    limit.as_millis() as u64,
                ))
            }
        }
    }

    /// Closes the channel and terminates the event loop.
    ///
    /// Pending waiters fail with [`Error::ConnectionClosed`] immediately.
    /// Never fails, even if the channel is already broken.
    pub async fn close(&self) {
        self.clear_event_handler();
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
        Self::fail_pending_requests(&self.correlation);

        let task = self.task.lock().take();
        if let Some(mut task) = task
            && timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err()
        {
            warn!("Event loop did not stop in time, aborting");
            task.abort();
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        event_handler: Arc<Mutex<Option<EventHandler>>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        debug!("Event loop started");

        loop {
            tokio::select! {
                // Incoming messages from the remote end
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &event_handler);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the session
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Write { id, json, waiter }) => {
                            Self::handle_write(id, json, waiter, &mut ws_write, &correlation).await;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Reject further sends before flushing, so nothing slips in after.
        command_rx.close();
        Self::fail_pending_requests(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the remote end.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        event_handler: &Arc<Mutex<Option<EventHandler>>>,
    ) {
        let value: Value = match from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Discarding unparseable message");
                return;
            }
        };

        debug!(message = %summarize_message(&value), "Message received");

        match Inbound::from_value(value) {
            Ok(Inbound::Event(event)) => {
                trace!(method = %event.method, "Event received");
                Self::emit(event_handler, || SessionEvent::Event(event));
            }

            Ok(Inbound::Response(response)) => {
                Self::emit(event_handler, || SessionEvent::ResultReceived(response.clone()));

                let tx = correlation.lock().remove(&response.id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => {
                        warn!(id = %response.id, "Response for unknown command");
                    }
                }
            }

            Ok(Inbound::InvalidResponse { id, reason }) => {
                warn!(%id, %reason, "Invalid response body");

                let tx = correlation.lock().remove(&id);
                if let Some(tx) = tx {
                    let _ = tx.send(Err(Error::protocol(format!(
                        "invalid response to command {id}: {reason}"
                    ))));
                }
            }

            Err(e) => {
                warn!(error = %e, "Discarding malformed message");
            }
        }
    }

    /// Passes an event to the handler, if one is attached.
    fn emit(
        event_handler: &Arc<Mutex<Option<EventHandler>>>,
        event: impl FnOnce() -> SessionEvent,
    ) {
        let handler = event_handler.lock();
        if let Some(ref handler) = *handler {
            handler(event());
        }
    }

    /// Writes a serialized command to the channel.
    async fn handle_write<S>(
        id: CommandId,
        json: String,
        waiter: bool,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            warn!(%id, error = %e, "Failed to write command");
            if waiter && let Some(tx) = correlation.lock().remove(&id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return;
        }

        trace!(%id, "Command written");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::{Command, Event};
    use crate::transport::testing::{MockPeer, MockRemote};
    use crate::transport::{ChannelOptions, open_channel};

    fn request(id: u64, method: &str) -> Request {
        Request::new(
            CommandId::new(id).expect("non-zero id"),
            Command::new(method, json!({ "n": id })),
        )
    }

    async fn connect() -> (Connection, MockPeer) {
        let remote = MockRemote::bind().await;
        let endpoint = url::Url::parse(&remote.ws_url()).expect("url");
        let options = ChannelOptions::new();
        let (channel, peer) = tokio::join!(
            open_channel(&endpoint, &options),
            remote.accept()
        );
        (Connection::new(channel.expect("channel")), peer)
    }

    async fn wait_for_pending(connection: &Connection, count: usize) {
        while connection.pending_count() != count {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 60);
        assert_eq!(SHUTDOWN_TIMEOUT.as_secs(), 5);
    }

    #[tokio::test]
    async fn test_send_resolves_with_matching_response() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            let record = peer.recv().await.expect("command");
            assert_eq!(
                record,
                json!({ "id": 1, "method": "browsingContext.create", "params": { "n": 1 } })
            );
            peer.send(json!({ "id": 1, "type": "success", "result": { "context": "abc" } }))
                .await;
            peer
        };

        let (response, _peer) = tokio::join!(
            connection.send(request(1, "browsingContext.create"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );

        let response = response.expect("response");
        assert_eq!(response.result, Some(json!({ "context": "abc" })));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_match_by_id() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            let first = peer.recv().await.expect("first");
            let second = peer.recv().await.expect("second");
            let mut ids = vec![first["id"].as_u64(), second["id"].as_u64()];
            ids.sort();
            assert_eq!(ids, vec![Some(1), Some(2)]);

            peer.send(json!({ "id": 2, "result": { "answer": "two" } })).await;
            peer.send(json!({ "id": 1, "result": { "answer": "one" } })).await;
            peer
        };

        let (one, two, _peer) = tokio::join!(
            connection.send(request(1, "a.one"), DEFAULT_COMMAND_TIMEOUT),
            connection.send(request(2, "a.two"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );

        assert_eq!(one.expect("one").result, Some(json!({ "answer": "one" })));
        assert_eq!(two.expect("two").result, Some(json!({ "answer": "two" })));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages_are_discarded() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            let record = peer.recv().await.expect("command");
            peer.send_text("this is not json").await;
            peer.send_text("[1, 2, 3]").await;
            peer.send_text(r#"{"id": "seven"}"#).await;
            peer.send(json!({ "id": 5, "result": { "stale": true } })).await;
            let id = record["id"].clone();
            peer.send(json!({ "id": id, "result": { "ok": true } })).await;
            peer
        };

        let (response, _peer) = tokio::join!(
            connection.send(request(1, "session.status"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );

        assert_eq!(response.expect("response").result, Some(json!({ "ok": true })));
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn test_events_and_results_reach_handler() {
        let (connection, mut peer) = connect().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection.set_event_handler(Box::new(move |event: SessionEvent| sink.lock().push(event)));

        let remote = async {
            peer.recv().await.expect("command");
            peer.send(json!({
                "type": "event",
                "method": "browsingContext.contextCreated",
                "params": { "context": "abc" }
            }))
            .await;
            peer.send(json!({ "id": 1, "result": {} })).await;
            peer
        };

        let (response, _peer) = tokio::join!(
            connection.send(request(1, "session.subscribe"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );
        response.expect("response");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            &seen[0],
            SessionEvent::Event(event) if event.method == "browsingContext.contextCreated"
        ));
        assert!(matches!(&seen[1], SessionEvent::ResultReceived(r) if r.id.get() == 1));
    }

    #[tokio::test]
    async fn test_timeout_removes_only_its_waiter() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            let slow = peer.recv().await.expect("slow");
            let fast = peer.recv().await.expect("fast");
            assert_eq!(slow["id"], 1);
            let id = fast["id"].clone();
            peer.send(json!({ "id": id, "result": { "fast": true } })).await;
            peer
        };

        let slow = connection.send(request(1, "script.evaluate"), Duration::from_millis(200));
        let fast = connection.send(request(2, "session.status"), DEFAULT_COMMAND_TIMEOUT);
        let (slow, fast, mut peer) = tokio::join!(slow, fast, remote);

        assert_eq!(fast.expect("fast").result, Some(json!({ "fast": true })));
        match slow.unwrap_err() {
            Error::RequestTimeout {
                method,
                id,
                params,
                timeout_ms,
            } => {
                assert_eq!(method, "script.evaluate");
                assert_eq!(id.get(), 1);
                assert_eq!(params, json!({ "n": 1 }));
                assert_eq!(timeout_ms, 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(connection.pending_count(), 0);

        // A late response for the timed-out id is dropped without effect.
        peer.send(json!({ "id": 1, "result": {} })).await;
        let (late_check, _) = tokio::join!(
            connection.send(request(3, "session.status"), DEFAULT_COMMAND_TIMEOUT),
            async {
                let record = peer.recv().await.expect("third");
                let id = record["id"].clone();
                peer.send(json!({ "id": id, "result": { "third": true } })).await;
            }
        );
        assert_eq!(late_check.expect("third").result, Some(json!({ "third": true })));
    }

    #[tokio::test]
    async fn test_send_async_writes_without_waiter() {
        let (connection, mut peer) = connect().await;

        connection
            .send_async(&request(7, "log.subscribe"))
            .expect("queued");
        assert_eq!(connection.pending_count(), 0);

        let record = peer.recv().await.expect("command");
        assert_eq!(record["id"], 7);
        assert_eq!(record["method"], "log.subscribe");
    }

    #[tokio::test]
    async fn test_close_fails_pending_waiters() {
        let (connection, mut peer) = connect().await;

        let waiting = tokio::spawn({
            let connection = connection.clone();
            async move {
                connection
                    .send(request(1, "browsingContext.navigate"), DEFAULT_COMMAND_TIMEOUT)
                    .await
            }
        });

        peer.recv().await.expect("command");
        wait_for_pending(&connection, 1).await;

        connection.close().await;

        let result = waiting.await.expect("task");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(connection.pending_count(), 0);
        assert!(!connection.is_open());

        // Closing twice is harmless, sending afterwards fails fast.
        connection.close().await;
        let after = connection
            .send(request(2, "session.status"), DEFAULT_COMMAND_TIMEOUT)
            .await;
        assert!(matches!(after, Err(Error::ConnectionClosed)));
        assert!(matches!(
            connection.send_async(&request(3, "session.status")),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_remote_close_fails_pending_waiters() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            peer.recv().await.expect("command");
            peer.close().await;
        };

        let (result, ()) = tokio::join!(
            connection.send(request(1, "session.end"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );

        assert!(matches!(result, Err(Error::ConnectionClosed)));
        while connection.is_open() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_invalid_response_body_fails_waiter_at_once() {
        let (connection, mut peer) = connect().await;

        let remote = async {
            peer.recv().await.expect("command");
            peer.send(json!({
                "id": 1,
                "type": "error",
                "error": { "code": 7 },
                "message": "bad",
            }))
            .await;
            peer
        };

        let (result, _peer) = tokio::join!(
            timeout(
                Duration::from_secs(5),
                connection.send(request(1, "a.b"), DEFAULT_COMMAND_TIMEOUT)
            ),
            remote
        );

        let result = result.expect("settled before the deadline");
        match result {
            Err(Error::Protocol { message }) => assert!(message.contains("command 1")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(connection.pending_count(), 0);
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn test_idless_records_reach_handler_whole() {
        let (connection, mut peer) = connect().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection.set_event_handler(Box::new(move |event: SessionEvent| sink.lock().push(event)));

        let error_record = json!({
            "type": "error",
            "id": null,
            "error": "invalid argument",
            "message": "bad command",
        });
        let odd_method = json!({ "method": 5, "params": {} });

        let remote = async {
            peer.recv().await.expect("command");
            peer.send(error_record.clone()).await;
            peer.send(odd_method.clone()).await;
            peer.send(json!({ "method": "x.y", "params": {} })).await;
            peer.send(json!({ "id": 1, "result": {} })).await;
            peer
        };

        let (response, _peer) = tokio::join!(
            connection.send(request(1, "session.status"), DEFAULT_COMMAND_TIMEOUT),
            remote
        );
        response.expect("response");

        let events: Vec<Event> = seen
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Event(event) => Some(event.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].raw, error_record);
        assert!(events[0].is_error());
        assert_eq!(events[1].raw, odd_method);
        assert_eq!(events[2].method, "x.y");
    }

    #[tokio::test]
    async fn test_duplicate_pending_id_is_rejected() {
        let (connection, mut peer) = connect().await;

        let first = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .send(request(1, "session.status"), DEFAULT_COMMAND_TIMEOUT)
                    .await
            })
        };
        wait_for_pending(&connection, 1).await;

        let duplicate = connection
            .send(request(1, "session.status"), DEFAULT_COMMAND_TIMEOUT)
            .await;
        assert!(matches!(duplicate, Err(Error::Protocol { .. })));
        assert_eq!(connection.pending_count(), 1);

        peer.recv().await.expect("first command");
        peer.send(json!({ "id": 1, "result": { "first": true } })).await;

        let first = first.await.expect("task").expect("first response");
        assert_eq!(first.result, Some(json!({ "first": true })));
    }
}
