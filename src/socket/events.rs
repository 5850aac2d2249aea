//! Socket events, state and status snapshot.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::client::Headers;
use crate::error::Error;
use crate::identifiers::TransportId;
use crate::protocol::{HandshakeData, Packet, PacketData};
use crate::transport::TransportInfo;

// ============================================================================
// SocketState
// ============================================================================

/// Connection state of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketState {
    /// Created, `open()` not called yet.
    #[default]
    Idle,
    /// Waiting for the handshake.
    Opening,
    /// Handshake complete.
    Open,
    /// Close requested while an upgrade probe is pending.
    Closing,
    /// Terminal.
    Closed,
}

impl SocketState {
    /// Returns the state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    ForcedClose,
    /// The server closed the transport.
    TransportClose,
    /// The current transport failed.
    TransportError,
    /// No `ping` arrived within `pingInterval + pingTimeout`.
    PingTimeout,
    /// The handshake could not be parsed.
    ParseError,
}

impl CloseReason {
    /// Returns the reason text.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForcedClose => "forced close",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::ParseError => "parse error",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Event emitted by a socket.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A transport was created (current or probe), before it opens.
    Transport(TransportInfo),
    /// Handshake complete.
    Open(HandshakeData),
    /// Inbound message.
    Message(PacketData),
    /// Any inbound packet on the current transport.
    Packet(Packet),
    /// Outbound packet queued.
    PacketCreate(Packet),
    /// Server ping answered.
    Ping,
    /// Write buffer fully handed off and drained.
    Drain,
    /// Probe transport opened and probed.
    Upgrading(TransportInfo),
    /// Probe transport promoted to current.
    Upgrade(TransportInfo),
    /// Upgrade probe failed; the socket stays on its transport.
    UpgradeError(Arc<Error>),
    /// Response headers received by a transport.
    ResponseHeaders {
        /// Transport that received them.
        transport: TransportId,
        /// Header list.
        headers: Headers,
    },
    /// Error on the current transport or in the handshake.
    Error(Arc<Error>),
    /// Socket closed.
    Close(CloseReason),
}

impl SocketEvent {
    /// Returns the event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Open(_) => "open",
            Self::Message(_) => "message",
            Self::Packet(_) => "packet",
            Self::PacketCreate(_) => "packetCreate",
            Self::Ping => "ping",
            Self::Drain => "drain",
            Self::Upgrading(_) => "upgrading",
            Self::Upgrade(_) => "upgrade",
            Self::UpgradeError(_) => "upgradeError",
            Self::ResponseHeaders { .. } => "responseHeaders",
            Self::Error(_) => "error",
            Self::Close(_) => "close",
        }
    }
}

/// Callback receiving socket events on the worker.
pub type EventHandler = Box<dyn FnMut(&SocketEvent) + Send>;

// ============================================================================
// SocketStatus
// ============================================================================

/// Snapshot of a socket, published after every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketStatus {
    /// Connection state.
    pub state: SocketState,
    /// Session id once the handshake completed.
    pub sid: Option<String>,
    /// Current transport.
    pub transport: Option<TransportInfo>,
    /// An upgrade probe has been sent and is unresolved.
    pub upgrading: bool,
}

// ============================================================================
// Tests
// ============================================================================
