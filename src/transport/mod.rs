//! Transport layer.
//!
//! A transport is one bidirectional packet channel to the server with an
//! explicit lifecycle. Two kinds exist, selected at construction time:
//!
//! | Kind | Module | Channel |
//! |------|--------|---------|
//! | [`TransportKind::Polling`] | `polling` | HTTP long-poll GET + POST |
//! | [`TransportKind::WebSocket`] | `websocket` | one persistent WebSocket |
//!
//! # Lifecycle
//!
//! ```text
//!            open()            open packet / connect
//!   Closed ─────────► Opening ───────────────────────► Open
//!     ▲                  │                              │  ▲
//!     │     close()      │                      pause() │  │ resume()
//!     └──────────────────┴──────────────────────────────┤  │
//!                                                       ▼  │
//!                                                      Paused
//! ```
//!
//! # Execution Model
//!
//! Transports never block and never own a task. Every operation returns
//! the [`TransportEvent`]s it produced synchronously. Network I/O runs on
//! spawned tasks whose completions come back as [`TransportIo`] values
//! through an [`IoSink`]; the owner feeds them to
//! [`Transport::handle_io`] on its own worker.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `polling` | Long-polling transport |
//! | `websocket` | WebSocket transport |
//! | `uri` | Endpoint URI construction |

// ============================================================================
// Submodules
// ============================================================================

/// Long-polling transport.
pub mod polling;

/// Endpoint URI construction.
pub mod uri;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::result::Result as StdResult;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::client::{Frame, Headers, HttpClient, HttpResponse, WebSocketConnector};
use crate::error::{Error, Result};
use crate::identifiers::TransportId;
use crate::protocol::Packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Protocol revision sent as the `EIO` query parameter.
pub const PROTOCOL_VERSION: &str = "4";

// ============================================================================
// TransportKind
// ============================================================================

/// Transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP long-polling.
    Polling,
    /// WebSocket.
    WebSocket,
}

impl TransportKind {
    /// Returns the wire name (`polling` / `websocket`).
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "polling" => Ok(Self::Polling),
            "websocket" => Ok(Self::WebSocket),
            other => Err(Error::config(format!("unknown transport: {other}"))),
        }
    }
}

// ============================================================================
// ReadyState
// ============================================================================

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// Not opened yet, or closed.
    #[default]
    Closed,
    /// `open()` called, waiting for the server.
    Opening,
    /// Ready for `send`.
    Open,
    /// Quiesced for an upgrade.
    Paused,
}

impl ReadyState {
    /// Returns the state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Paused => "paused",
        }
    }
}

// ============================================================================
// TransportInfo
// ============================================================================

/// Snapshot identifying a transport instance in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportInfo {
    /// Instance identifier.
    pub id: TransportId,
    /// Implementation.
    pub kind: TransportKind,
}

// ============================================================================
// TransportOptions
// ============================================================================

/// Connection parameters shared by both transport kinds.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Server host name or IP literal.
    pub host: String,
    /// Port. `None` uses the scheme default.
    pub port: Option<u16>,
    /// Use `https` / `wss`.
    pub secure: bool,
    /// Endpoint path, with trailing slash.
    pub path: String,
    /// Query parameters sent with every request.
    pub query: BTreeMap<String, String>,
    /// Append a cache-busting token to every request.
    pub timestamp_requests: bool,
    /// Query parameter name of the cache-busting token.
    pub timestamp_param: String,
    /// Extra headers sent with every request.
    pub extra_headers: Headers,
    /// HTTP client for the polling transport.
    pub http_client: Arc<dyn HttpClient>,
    /// Connector for the websocket transport.
    pub ws_connector: Arc<dyn WebSocketConnector>,
}

// ============================================================================
// Events
// ============================================================================

/// Event produced by a transport operation.
#[derive(Debug)]
pub enum TransportEvent {
    /// Transport reached [`ReadyState::Open`].
    Open,
    /// Inbound packet (including the `open` handshake packet).
    Packet(Packet),
    /// Outstanding writes completed; the transport is writable again.
    Drain,
    /// `pause()` completed; no I/O is in flight.
    Paused,
    /// Transport reached [`ReadyState::Closed`].
    Close,
    /// Underlying client failure. Does not change the ready state.
    Error(Error),
    /// Response headers of a poll or of the WebSocket handshake.
    ResponseHeaders(Headers),
}

/// Completion of asynchronous transport I/O.
#[derive(Debug)]
pub enum TransportIo {
    /// A poll request finished.
    PollResponse(Result<HttpResponse>),
    /// A payload POST finished.
    PostResponse(Result<HttpResponse>),
    /// WebSocket connected.
    WsConnected {
        /// Outbound frame sender.
        sender: mpsc::UnboundedSender<Frame>,
        /// Handshake response headers.
        headers: Headers,
    },
    /// WebSocket connect failed.
    WsConnectFailed(Error),
    /// Inbound WebSocket frame or stream error.
    WsFrame(Result<Frame>),
    /// Frames handed to the connection; synthesized drain.
    Drained,
}

// ============================================================================
// IoSink
// ============================================================================

type Deliver = Arc<dyn Fn(TransportIo) -> StdResult<(), TransportIo> + Send + Sync>;

/// Delivers [`TransportIo`] completions back to the transport's owner.
#[derive(Clone)]
pub struct IoSink {
    post: Deliver,
    defer: Deliver,
}

impl IoSink {
    /// Creates a sink from a delivery function.
    ///
    /// The function hands the completion back once the owner is gone.
    /// Deferred completions use the same function until
    /// [`with_defer`](Self::with_defer) replaces it.
    pub fn new<F>(post: F) -> Self
    where
        F: Fn(TransportIo) -> StdResult<(), TransportIo> + Send + Sync + 'static,
    {
        let post: Deliver = Arc::new(post);
        Self {
            defer: post.clone(),
            post,
        }
    }

    /// Sets the function used by [`defer`](Self::defer).
    #[must_use]
    pub fn with_defer<F>(mut self, defer: F) -> Self
    where
        F: Fn(TransportIo) -> StdResult<(), TransportIo> + Send + Sync + 'static,
    {
        self.defer = Arc::new(defer);
        self
    }

    /// Creates a sink feeding an unbounded channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportIo>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(move |io| tx.send(io).map_err(|e| e.0)), rx)
    }

    /// Delivers `io`, handing it back if the owner is gone.
    #[inline]
    pub fn post(&self, io: TransportIo) -> StdResult<(), TransportIo> {
        (self.post)(io)
    }

    /// Delivers `io` from inside the owner's current task, to be handled
    /// after it completes.
    #[inline]
    pub fn defer(&self, io: TransportIo) -> StdResult<(), TransportIo> {
        (self.defer)(io)
    }
}

impl fmt::Debug for IoSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSink").finish_non_exhaustive()
    }
}

// ============================================================================
// TransportCore
// ============================================================================

/// State shared by both transport kinds.
#[derive(Debug)]
pub(crate) struct TransportCore {
    pub(crate) id: TransportId,
    pub(crate) kind: TransportKind,
    pub(crate) ready_state: ReadyState,
    pub(crate) writable: bool,
    pub(crate) options: TransportOptions,
    pub(crate) sink: IoSink,
}

impl TransportCore {
    fn new(
        id: TransportId,
        kind: TransportKind,
        mut options: TransportOptions,
        sink: IoSink,
    ) -> Self {
        options
            .query
            .insert("EIO".to_string(), PROTOCOL_VERSION.to_string());
        options
            .query
            .insert("transport".to_string(), kind.name().to_string());

        Self {
            id,
            kind,
            ready_state: ReadyState::Closed,
            writable: false,
            options,
            sink,
        }
    }

    /// Marks the transport open and writable.
    pub(crate) fn on_open(&mut self, events: &mut Vec<TransportEvent>) {
        debug!(transport = self.kind.name(), id = %self.id, "transport open");
        self.ready_state = ReadyState::Open;
        self.writable = true;
        events.push(TransportEvent::Open);
    }

    /// Marks the transport closed.
    pub(crate) fn on_close(&mut self, events: &mut Vec<TransportEvent>) {
        debug!(transport = self.kind.name(), id = %self.id, "transport closed");
        self.ready_state = ReadyState::Closed;
        events.push(TransportEvent::Close);
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.ready_state == ReadyState::Closed
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Kind-specific half of a transport.
trait Driver {
    fn core(&self) -> &TransportCore;
    fn core_mut(&mut self) -> &mut TransportCore;

    /// Starts connecting. Called in [`ReadyState::Opening`].
    fn do_open(&mut self, events: &mut Vec<TransportEvent>);

    /// Releases the connection. The caller marks the transport closed.
    fn do_close(&mut self, events: &mut Vec<TransportEvent>);

    /// Writes packets. Called in [`ReadyState::Open`].
    fn write(&mut self, packets: &[Packet]) -> Result<()>;

    fn pause(&mut self, events: &mut Vec<TransportEvent>);

    fn resume(&mut self, events: &mut Vec<TransportEvent>);

    fn handle_io(&mut self, io: TransportIo, events: &mut Vec<TransportEvent>);

    /// Drops the connection without protocol traffic.
    fn discard(&mut self) {}
}

// ============================================================================
// Transport
// ============================================================================

/// A transport of either kind.
#[derive(Debug)]
pub enum Transport {
    /// Long-polling transport.
    Polling(PollingTransport),
    /// WebSocket transport.
    WebSocket(WebSocketTransport),
}

impl Transport {
    /// Creates a closed transport of `kind` with a fresh identifier.
    #[must_use]
    pub fn new(kind: TransportKind, options: TransportOptions, sink: IoSink) -> Self {
        Self::with_id(TransportId::generate(), kind, options, sink)
    }

    /// Creates a closed transport of `kind` identified by `id`.
    ///
    /// Lets the owner build an [`IoSink`] tagged with the id up front.
    #[must_use]
    pub fn with_id(
        id: TransportId,
        kind: TransportKind,
        options: TransportOptions,
        sink: IoSink,
    ) -> Self {
        let core = TransportCore::new(id, kind, options, sink);
        match kind {
            TransportKind::Polling => Self::Polling(PollingTransport::new(core)),
            TransportKind::WebSocket => Self::WebSocket(WebSocketTransport::new(core)),
        }
    }

    fn driver(&self) -> &dyn Driver {
        match self {
            Self::Polling(t) => t,
            Self::WebSocket(t) => t,
        }
    }

    fn driver_mut(&mut self) -> &mut dyn Driver {
        match self {
            Self::Polling(t) => t,
            Self::WebSocket(t) => t,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the instance identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.driver().core().id
    }

    /// Returns the implementation kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.driver().core().kind
    }

    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns an identity snapshot for events.
    #[inline]
    #[must_use]
    pub fn info(&self) -> TransportInfo {
        TransportInfo {
            id: self.id(),
            kind: self.kind(),
        }
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.driver().core().ready_state
    }

    /// Returns `true` if a `send` would be handed off immediately.
    #[inline]
    #[must_use]
    pub fn writable(&self) -> bool {
        self.driver().core().writable
    }

    /// Returns the request query parameters.
    #[inline]
    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.driver().core().options.query
    }

    /// Attaches the session id to subsequent requests.
    pub fn set_sid(&mut self, sid: &str) {
        self.driver_mut()
            .core_mut()
            .options
            .query
            .insert("sid".to_string(), sid.to_string());
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts opening. No-op unless closed.
    pub fn open(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let driver = self.driver_mut();
        if driver.core().ready_state != ReadyState::Closed {
            return events;
        }

        debug!(transport = driver.core().kind.name(), id = %driver.core().id, "opening transport");
        driver.core_mut().ready_state = ReadyState::Opening;
        driver.do_open(&mut events);
        events
    }

    /// Closes the transport. No-op unless opening or open.
    pub fn close(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let driver = self.driver_mut();
        if !matches!(
            driver.core().ready_state,
            ReadyState::Opening | ReadyState::Open
        ) {
            return events;
        }

        driver.do_close(&mut events);
        driver.core_mut().on_close(&mut events);
        events
    }

    /// Drops the transport without protocol traffic and without events.
    ///
    /// Used for a transport that has been replaced by an upgrade.
    pub fn discard(&mut self) {
        let driver = self.driver_mut();
        debug!(transport = driver.core().kind.name(), id = %driver.core().id, "discarding transport");
        driver.discard();
        driver.core_mut().ready_state = ReadyState::Closed;
        driver.core_mut().writable = false;
    }

    /// Sends packets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportNotOpen`] unless the transport is open, and
    /// [`Error::Codec`] if a packet cannot be encoded.
    pub fn send(&mut self, packets: &[Packet]) -> Result<()> {
        let driver = self.driver_mut();
        let state = driver.core().ready_state;
        if state != ReadyState::Open {
            let name = driver.core().kind.name();
            error!(transport = name, state = state.as_str(), "send on transport that is not open");
            return Err(Error::transport_not_open(name, state.as_str()));
        }
        driver.write(packets)
    }

    /// Quiesces the transport. [`TransportEvent::Paused`] is produced once
    /// no I/O is in flight, either now or from a later `handle_io`.
    pub fn pause(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let driver = self.driver_mut();
        debug!(transport = driver.core().kind.name(), id = %driver.core().id, "pausing transport");
        driver.core_mut().ready_state = ReadyState::Paused;
        driver.pause(&mut events);
        events
    }

    /// Reopens a paused transport. No-op unless paused.
    pub fn resume(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let driver = self.driver_mut();
        if driver.core().ready_state != ReadyState::Paused {
            return events;
        }

        debug!(transport = driver.core().kind.name(), id = %driver.core().id, "resuming transport");
        driver.core_mut().ready_state = ReadyState::Open;
        driver.resume(&mut events);
        events
    }

    /// Processes an I/O completion.
    pub fn handle_io(&mut self, io: TransportIo) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        self.driver_mut().handle_io(io, &mut events);
        events
    }
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
