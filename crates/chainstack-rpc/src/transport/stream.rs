//! Multiplexer for persistent connections (WebSocket, IPC).
//!
//! One actor task owns the connection, the pending-request map and the
//! notification handlers. [`Multiplexer`] handles talk to it over an mpsc
//! channel and get completions back on oneshot channels.
//!
//! ```text
//!            connect ok                 read error / EOF
//! Connecting ──────────▶ Open ───────────────────────────▶ Errored | Closed
//!     ▲                                                          │
//!     └──────────────── reconnect interval elapsed ──────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, RpcError};
use crate::frame::FrameDecoder;
use crate::types::{id_key, is_notification, RequestPayload};

/// Outbound half of a connection; accepts serialized frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RpcError> + Send>>;
/// Inbound half of a connection; yields raw text as it arrives.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An established connection, split into halves.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections for a [`Multiplexer`]; called again on every reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection>;

    /// Endpoint description for logs and errors.
    fn endpoint(&self) -> String;
}

/// Lifecycle of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Closed cleanly, by the peer or by [`Multiplexer::close`].
    Closed,
    /// The last connect attempt or the open connection failed.
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Timing knobs for a [`Multiplexer`].
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Reconnect automatically after the connection drops.
    pub reconnect: bool,
    pub reconnect_interval: Duration,
    /// How long an incomplete inbound frame may stay buffered.
    pub chunk_timeout: Duration,
    /// Per-request deadline; `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_interval: Duration::from_millis(500),
            chunk_timeout: Duration::from_secs(15),
            request_timeout: None,
        }
    }
}

struct SendRequest {
    key: String,
    method: String,
    frame: String,
    reply: oneshot::Sender<Result<Value>>,
}

enum Command {
    Send(SendRequest),
    Forget(String),
    AddHandler(mpsc::UnboundedSender<Value>),
    Reset,
    Reconnect,
    Close,
}

struct Pending {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

/// Handle to a multiplexed streaming connection. Cheap to clone.
#[derive(Clone)]
pub struct Multiplexer {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    generation: Arc<AtomicU64>,
    request_timeout: Option<Duration>,
    endpoint: Arc<str>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("endpoint", &self.endpoint)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Multiplexer {
    /// Starts the connection actor. Must be called inside a tokio runtime.
    pub fn spawn(connector: impl Connector, options: StreamOptions) -> Self {
        let endpoint: Arc<str> = connector.endpoint().into();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let generation = Arc::new(AtomicU64::new(0));

        let actor = Actor {
            connector: Arc::new(connector),
            options,
            endpoint: Arc::clone(&endpoint),
            commands: commands_rx,
            state: state_tx,
            generation: Arc::clone(&generation),
            pending: HashMap::new(),
            handlers: Vec::new(),
            decoder: FrameDecoder::new(),
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state: state_rx,
            generation,
            request_timeout: options.request_timeout,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for state transitions. Quick successive transitions may
    /// coalesce; compare [`Multiplexer::generation`] to detect a new
    /// connection.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Number of connections opened so far. Bumped before the state turns
    /// `Open`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Writes `payload` and waits for the frame carrying its id.
    ///
    /// Batches complete with the whole response array.
    pub async fn send(&self, payload: &RequestPayload) -> Result<Value> {
        let Some(id) = payload.correlation_id() else {
            return Ok(Value::Array(Vec::new()));
        };
        let key = id_key(id);
        let frame = serde_json::to_string(payload)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command(Command::Send(SendRequest {
            key: key.clone(),
            method: payload.method().to_string(),
            frame,
            reply: reply_tx,
        }))?;

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply_rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    let _ = self.commands.send(Command::Forget(key));
                    return Err(RpcError::ConnectionTimeout(limit.as_millis() as u64));
                }
            },
            None => reply_rx.await,
        };
        reply.map_err(|_| self.connection_error())?
    }

    /// Registers a notification handler. The handler lives until the
    /// receiver is dropped or [`Multiplexer::reset`] is called.
    pub fn notifications(&self) -> Result<mpsc::UnboundedReceiver<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.command(Command::AddHandler(tx))?;
        Ok(rx)
    }

    /// Fails every pending request and drops all notification handlers.
    pub fn reset(&self) -> Result<()> {
        self.command(Command::Reset)
    }

    /// Drops the current connection, if any, and connects again.
    pub fn reconnect(&self) -> Result<()> {
        self.command(Command::Reconnect)
    }

    /// Closes the connection and stops the actor.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| self.connection_error())
    }

    fn connection_error(&self) -> RpcError {
        RpcError::InvalidConnection(self.endpoint.to_string())
    }
}

enum Next {
    Connect,
    Wait,
    Idle,
    Stop,
}

struct Actor {
    connector: Arc<dyn Connector>,
    options: StreamOptions,
    endpoint: Arc<str>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    generation: Arc<AtomicU64>,
    pending: HashMap<String, Pending>,
    handlers: Vec<mpsc::UnboundedSender<Value>>,
    decoder: FrameDecoder,
}

impl Actor {
    async fn run(mut self) {
        let mut next = Next::Connect;
        loop {
            next = match next {
                Next::Connect => self.connect().await,
                Next::Wait => self.wait_for_retry().await,
                Next::Idle => self.idle().await,
                Next::Stop => break,
            };
        }
        self.fail_pending();
        debug!(endpoint = %self.endpoint, "connection actor stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn after_failure(&self) -> Next {
        if self.options.reconnect {
            Next::Wait
        } else {
            Next::Idle
        }
    }

    /// Connecting phase: sends are queued until the attempt settles.
    async fn connect(&mut self) -> Next {
        self.set_state(ConnectionState::Connecting);
        debug!(endpoint = %self.endpoint, "connecting");

        let connector = Arc::clone(&self.connector);
        let attempt = connector.connect();
        tokio::pin!(attempt);
        let mut queued: Vec<SendRequest> = Vec::new();

        let result = loop {
            tokio::select! {
                result = &mut attempt => break result,
                command = self.commands.recv() => match command {
                    Some(Command::Send(request)) => queued.push(request),
                    Some(Command::Forget(key)) => queued.retain(|r| r.key != key),
                    Some(Command::AddHandler(handler)) => self.handlers.push(handler),
                    Some(Command::Reset) => {
                        self.handlers.clear();
                        let error = self.connection_error();
                        for request in queued.drain(..) {
                            let _ = request.reply.send(Err(error.clone()));
                        }
                    }
                    Some(Command::Reconnect) => {}
                    Some(Command::Close) | None => {
                        let error = self.connection_error();
                        for request in queued {
                            let _ = request.reply.send(Err(error.clone()));
                        }
                        self.set_state(ConnectionState::Closed);
                        return Next::Stop;
                    }
                },
            }
        };

        match result {
            Ok(connection) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(endpoint = %self.endpoint, generation, "connection open");
                self.set_state(ConnectionState::Open);
                self.serve(connection, queued).await
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "connect failed");
                for request in queued {
                    let _ = request.reply.send(Err(e.clone()));
                }
                self.set_state(ConnectionState::Errored);
                self.after_failure()
            }
        }
    }

    /// Open phase: writes requests, routes inbound frames.
    async fn serve(&mut self, mut connection: Connection, queued: Vec<SendRequest>) -> Next {
        for request in queued {
            if let Err(e) = self.write(&mut connection.sink, request).await {
                return self.dropped(ConnectionState::Errored, &e.to_string());
            }
        }

        let mut chunk_deadline: Option<Instant> = None;
        loop {
            let deadline = chunk_deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(request)) => {
                        if let Err(e) = self.write(&mut connection.sink, request).await {
                            return self.dropped(ConnectionState::Errored, &e.to_string());
                        }
                    }
                    Some(Command::Forget(key)) => {
                        if let Some(pending) = self.pending.remove(&key) {
                            debug!(id = %key, method = %pending.method, "request abandoned");
                        }
                    }
                    Some(Command::AddHandler(handler)) => self.handlers.push(handler),
                    Some(Command::Reset) => {
                        self.fail_pending();
                        self.handlers.clear();
                        self.decoder.clear();
                        chunk_deadline = None;
                    }
                    Some(Command::Reconnect) => {
                        info!(endpoint = %self.endpoint, "reconnect requested");
                        self.fail_pending();
                        self.decoder.clear();
                        return Next::Connect;
                    }
                    Some(Command::Close) | None => {
                        let _ = connection.sink.close().await;
                        self.fail_pending();
                        self.decoder.clear();
                        self.set_state(ConnectionState::Closed);
                        info!(endpoint = %self.endpoint, "connection closed");
                        return Next::Stop;
                    }
                },
                inbound = connection.stream.next() => match inbound {
                    Some(Ok(text)) => {
                        for frame in self.decoder.push(&text) {
                            self.route(frame);
                        }
                        chunk_deadline = match (self.decoder.has_partial(), chunk_deadline) {
                            (false, _) => None,
                            (true, None) => Some(Instant::now() + self.options.chunk_timeout),
                            (true, armed) => armed,
                        };
                    }
                    Some(Err(e)) => return self.dropped(ConnectionState::Errored, &e.to_string()),
                    None => return self.dropped(ConnectionState::Closed, "closed by peer"),
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(
                        endpoint = %self.endpoint,
                        timeout_ms = self.options.chunk_timeout.as_millis() as u64,
                        "incomplete frame timed out"
                    );
                    self.decoder.clear();
                    self.fail_pending();
                    chunk_deadline = None;
                }
            }
        }
    }

    /// Waits out the reconnect interval; sends fail fast meanwhile.
    async fn wait_for_retry(&mut self) -> Next {
        let sleep = tokio::time::sleep(self.options.reconnect_interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => {
                    debug!(endpoint = %self.endpoint, "reconnecting");
                    return Next::Connect;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => return Next::Connect,
                    Some(Command::Close) | None => {
                        self.set_state(ConnectionState::Closed);
                        return Next::Stop;
                    }
                    Some(other) => self.handle_disconnected(other),
                },
            }
        }
    }

    /// Disconnected without automatic reconnect; waits for an explicit
    /// reconnect or close.
    async fn idle(&mut self) -> Next {
        loop {
            match self.commands.recv().await {
                Some(Command::Reconnect) => return Next::Connect,
                Some(Command::Close) | None => {
                    self.set_state(ConnectionState::Closed);
                    return Next::Stop;
                }
                Some(other) => self.handle_disconnected(other),
            }
        }
    }

    fn handle_disconnected(&mut self, command: Command) {
        match command {
            Command::Send(request) => {
                let _ = request.reply.send(Err(self.connection_error()));
            }
            Command::AddHandler(handler) => self.handlers.push(handler),
            Command::Reset => self.handlers.clear(),
            Command::Forget(_) | Command::Reconnect | Command::Close => {}
        }
    }

    async fn write(&mut self, sink: &mut FrameSink, request: SendRequest) -> Result<()> {
        let SendRequest {
            key,
            method,
            frame,
            reply,
        } = request;
        if self.pending.contains_key(&key) {
            let _ = reply.send(Err(RpcError::DuplicateRequestId(key)));
            return Ok(());
        }
        debug!(id = %key, method = %method, "sending request");
        match sink.send(frame).await {
            Ok(()) => {
                self.pending.insert(key, Pending { method, reply });
                Ok(())
            }
            Err(e) => {
                let _ = reply.send(Err(self.connection_error()));
                Err(e)
            }
        }
    }

    fn route(&mut self, frame: Value) {
        if is_notification(&frame) {
            self.handlers.retain(|handler| handler.send(frame.clone()).is_ok());
            return;
        }

        let key = match &frame {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("id"))
                .map(id_key)
                .find(|key| self.pending.contains_key(key)),
            other => other.get("id").map(id_key),
        };

        match key.and_then(|key| self.pending.remove(&key)) {
            Some(pending) => {
                let _ = pending.reply.send(Ok(frame));
            }
            None => debug!(endpoint = %self.endpoint, "dropping unmatched frame"),
        }
    }

    fn dropped(&mut self, state: ConnectionState, reason: &str) -> Next {
        warn!(
            endpoint = %self.endpoint,
            reason,
            pending = self.pending.len(),
            "connection lost"
        );
        self.fail_pending();
        self.decoder.clear();
        self.set_state(state);
        self.after_failure()
    }

    fn fail_pending(&mut self) {
        let error = self.connection_error();
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(error.clone()));
        }
    }

    fn connection_error(&self) -> RpcError {
        RpcError::InvalidConnection(self.endpoint.to_string())
    }
}
