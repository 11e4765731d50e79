use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use nanoframe_frame::{FrameConfig, FrameReader, FrameWriter, Message, Request};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{PeerError, Result};
use crate::pending::{Completion, Failure, Outcome, PendingTable};
use crate::router::{NotificationRouter, NotificationStream, NotifyHandler};
use crate::timeout::with_timeout;

/// Default per-subscriber notification buffer.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Streams are wired; the liveness handshake has not succeeded yet.
    Starting,
    /// Handshake succeeded.
    Ready,
    /// The engine went away or the connection was closed.
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Starting => "starting",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Line framing limits, applied to both directions.
    pub frame: FrameConfig,
    /// Buffer per [`subscribe`](Connection::subscribe) stream.
    pub subscriber_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl ConnectionConfig {
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.frame.max_line_length = max;
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }
}

struct Shared {
    table: Mutex<PendingTable>,
    router: NotificationRouter,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    state: watch::Sender<ConnectionState>,
    max_line_length: usize,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self, reason: &str) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
        if !changed {
            return;
        }

        let failed = self.table().fail_all(reason);
        self.router.close();
        tracing::debug!(reason, failed, "connection closed");
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Response(response) => {
                let id = response.id;
                let outcome = response.outcome.map_err(Failure::Rpc);
                match self.table().complete(id, outcome) {
                    Completion::Delivered => {}
                    Completion::Discarded => {
                        tracing::debug!(id, "response for abandoned request discarded");
                    }
                    Completion::Unmatched => {
                        tracing::debug!(id, "unmatched response dropped");
                    }
                }
            }
            Message::Notification(note) => self.router.dispatch(note),
            Message::Request(request) => {
                tracing::debug!(id = request.id, method = %request.method, "ignoring engine-initiated request");
            }
        }
    }
}

/// The live channel to one engine.
///
/// Cheap to clone; all clones share one pending table, one notification
/// router, and one pair of background tasks. Dropping the last clone closes
/// the engine's input stream.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.shared.table();
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("next_id", &table.next_id())
            .field("in_flight", &table.in_flight())
            .finish()
    }
}

impl Connection {
    /// Wire a connection over an engine's output (`reader`) and input
    /// (`writer`) streams.
    ///
    /// Spawns the read loop and the write loop; must be called from within a
    /// Tokio runtime.
    pub fn from_streams<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Starting);

        let shared = Arc::new(Shared {
            table: Mutex::new(PendingTable::new()),
            router: NotificationRouter::new(config.subscriber_capacity),
            outbound,
            state,
            max_line_length: config.frame.max_line_length,
        });

        let reader = FrameReader::with_config(reader, &config.frame);
        let writer = FrameWriter::with_config(writer, &config.frame);
        tokio::spawn(read_loop(
            reader,
            Arc::downgrade(&shared),
            shared.state.subscribe(),
        ));
        tokio::spawn(write_loop(
            writer,
            outbound_rx,
            Arc::downgrade(&shared),
            shared.state.subscribe(),
        ));

        Self { shared }
    }

    /// Issue a request. Returns immediately; await the returned
    /// [`PendingCall`] for the engine's response.
    ///
    /// Calls made after the connection closed resolve to
    /// [`PeerError::Closed`] without touching the wire.
    pub fn call(&self, method: impl Into<String>, params: Value) -> PendingCall {
        let method = method.into();
        let mut table = self.shared.table();
        let (id, rx) = table.issue(&method);

        if table.closed_reason().is_none() {
            match Message::from(Request::new(id, method.clone(), params)).encode() {
                Ok(line) if line.len() > self.shared.max_line_length => {
                    let reason = format!(
                        "request is {} bytes, max line length is {}",
                        line.len(),
                        self.shared.max_line_length
                    );
                    table.complete(id, Err(Failure::Encode(reason)));
                }
                Ok(line) => {
                    // Enqueued under the table lock: wire order matches id order.
                    if self.shared.outbound.send(line).is_err() {
                        table.complete(id, Err(Failure::Closed("writer stopped".into())));
                    } else {
                        tracing::trace!(id, method = %method, "request queued");
                    }
                }
                Err(err) => {
                    table.complete(id, Err(Failure::Encode(err.to_string())));
                }
            }
        }
        drop(table);

        PendingCall {
            id,
            rx,
            shared: Arc::clone(&self.shared),
            done: false,
        }
    }

    /// [`call`](Self::call) with a deadline. On timeout the request stays
    /// outstanding at the engine and its slot is marked abandoned.
    pub async fn call_with_timeout(
        &self,
        method: impl Into<String>,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        with_timeout(self.call(method, params), timeout, PeerError::Timeout(timeout)).await
    }

    /// Register the notification handler, replacing any previous one.
    pub fn on_notify<F>(&self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let handler: NotifyHandler = Arc::new(handler);
        if self.shared.router.set_handler(handler).is_some() {
            tracing::debug!("notification handler replaced");
        }
    }

    /// Remove the notification handler. Notifications are dropped until a
    /// new one is registered.
    pub fn clear_notify(&self) {
        self.shared.router.clear_handler();
    }

    /// Independent stream of notifications, alongside the handler.
    pub fn subscribe(&self) -> NotificationStream {
        self.shared.router.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Close the connection: reject every outstanding request with
    /// [`PeerError::Closed`], end notification streams, and shut down the
    /// engine's input stream. Idempotent.
    pub fn close(&self, reason: &str) {
        self.shared.close(reason);
    }

    /// Requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.shared.table().in_flight()
    }

    /// Requests whose caller stopped waiting before the response arrived.
    pub fn abandoned(&self) -> usize {
        self.shared.table().abandoned()
    }

    /// Forget every abandoned request.
    pub fn reap_abandoned(&self) -> usize {
        let reaped = self.shared.table().reap_abandoned();
        if reaped > 0 {
            tracing::debug!(reaped, "reaped abandoned requests");
        }
        reaped
    }

    pub(crate) fn mark_ready(&self) -> bool {
        self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Starting {
                *state = ConnectionState::Ready;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn closer(&self) -> ConnectionCloser {
        ConnectionCloser {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Closes a connection without keeping it alive.
#[derive(Clone)]
pub(crate) struct ConnectionCloser {
    shared: Weak<Shared>,
}

impl ConnectionCloser {
    pub(crate) fn close(&self, reason: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.close(reason);
        }
    }
}

/// An issued request awaiting its response.
///
/// Dropping it before completion marks the request abandoned; the engine is
/// not told.
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Outcome>,
    shared: Arc<Shared>,
    done: bool,
}

impl PendingCall {
    /// Correlation id assigned to this request.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("done", &self.done)
            .finish()
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome.map_err(PeerError::from),
            Poll::Ready(Err(_)) => Err(PeerError::Closed("response channel dropped".into())),
        };
        self.done = true;
        Poll::Ready(outcome)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.done && self.shared.table().abandon(self.id) {
            tracing::debug!(id = self.id, "request abandoned");
        }
    }
}

async fn read_loop<R>(
    mut reader: FrameReader<R>,
    shared: Weak<Shared>,
    mut state: watch::Receiver<ConnectionState>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        let next = tokio::select! {
            next = reader.read_message() => next,
            _ = state.wait_for(|s| *s == ConnectionState::Closed) => return,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break "engine closed its output".to_string(),
            Err(err) => break format!("read failed: {err}"),
        };

        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.dispatch(message);
    };

    tracing::debug!(reason = %reason, "read loop finished");
    if let Some(shared) = shared.upgrade() {
        shared.close(&reason);
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut lines: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Weak<Shared>,
    mut state: watch::Receiver<ConnectionState>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = state.wait_for(|s| *s == ConnectionState::Closed) => break,
        };
        let Some(line) = line else {
            break;
        };

        if let Err(err) = writer.send_line(&line).await {
            tracing::warn!(error = %err, "write to engine failed");
            if let Some(shared) = shared.upgrade() {
                shared.close(&format!("write failed: {err}"));
            }
            return;
        }
    }

    if let Err(err) = writer.shutdown().await {
        tracing::debug!(error = %err, "engine input already closed");
    }
}
