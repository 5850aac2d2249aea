//! Packet model.
//!
//! A [`Packet`] is one discrete protocol message: a [`PacketType`] and an
//! optional [`PacketData`] payload.
//!
//! # Type Codes
//!
//! | Type | Code | Purpose |
//! |------|------|---------|
//! | `open` | `0` | Handshake, carries [`HandshakeData`](super::HandshakeData) JSON |
//! | `close` | `1` | Graceful close request |
//! | `ping` | `2` | Server heartbeat, or `"probe"` during upgrade |
//! | `pong` | `3` | Reply to `ping` |
//! | `message` | `4` | Application data |
//! | `upgrade` | `5` | Commits a transport upgrade |
//! | `noop` | `6` | Terminates a pending poll during upgrade |
//! | `error` | - | Local decode failure, never sent |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Payload of `ping`/`pong` packets exchanged during an upgrade probe.
pub const PROBE: &str = "probe";

/// Diagnostic payload of the `error` packet produced by failed decoding.
pub const PARSER_ERROR: &str = "parser error";

// ============================================================================
// PacketType
// ============================================================================

/// Packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Handshake.
    Open,
    /// Graceful close.
    Close,
    /// Heartbeat request.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Application message.
    Message,
    /// Upgrade commit.
    Upgrade,
    /// No operation.
    Noop,
    /// Local decode failure sentinel.
    Error,
}

impl PacketType {
    /// Returns the wire type code, or `None` for [`PacketType::Error`].
    #[inline]
    #[must_use]
    pub const fn code(self) -> Option<u8> {
        match self {
            Self::Open => Some(0),
            Self::Close => Some(1),
            Self::Ping => Some(2),
            Self::Pong => Some(3),
            Self::Message => Some(4),
            Self::Upgrade => Some(5),
            Self::Noop => Some(6),
            Self::Error => None,
        }
    }

    /// Parses a wire type code.
    #[inline]
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Close),
            2 => Some(Self::Ping),
            3 => Some(Self::Pong),
            4 => Some(Self::Message),
            5 => Some(Self::Upgrade),
            6 => Some(Self::Noop),
            _ => None,
        }
    }

    /// Returns the lowercase protocol name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Message => "message",
            Self::Upgrade => "upgrade",
            Self::Noop => "noop",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PacketData
// ============================================================================

/// Packet payload: text or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketData {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl PacketData {
    /// Returns the text payload, if any.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the binary payload, if any.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(_) => None,
            Self::Binary(bytes) => Some(bytes),
        }
    }

    /// Returns `true` for binary payloads.
    #[inline]
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

impl From<String> for PacketData {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for PacketData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for PacketData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for PacketData {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

// ============================================================================
// Packet
// ============================================================================

/// One protocol message.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    packet_type: PacketType,
    data: Option<PacketData>,
}

impl Packet {
    /// Creates a packet.
    #[inline]
    #[must_use]
    pub fn new(packet_type: PacketType, data: Option<PacketData>) -> Self {
        Self { packet_type, data }
    }

    /// Creates a packet without payload.
    #[inline]
    #[must_use]
    pub fn empty(packet_type: PacketType) -> Self {
        Self::new(packet_type, None)
    }

    /// Creates a `message` packet.
    #[inline]
    #[must_use]
    pub fn message(data: impl Into<PacketData>) -> Self {
        Self::new(PacketType::Message, Some(data.into()))
    }

    /// Creates a `ping` packet carrying `"probe"`.
    #[inline]
    #[must_use]
    pub fn ping_probe() -> Self {
        Self::new(PacketType::Ping, Some(PacketData::from(PROBE)))
    }

    /// Creates the decode-failure sentinel.
    #[inline]
    #[must_use]
    pub fn parser_error() -> Self {
        Self::new(PacketType::Error, Some(PacketData::from(PARSER_ERROR)))
    }

    /// Returns the packet type.
    #[inline]
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub const fn data(&self) -> Option<&PacketData> {
        self.data.as_ref()
    }

    /// Consumes the packet, returning its payload.
    #[inline]
    #[must_use]
    pub fn into_data(self) -> Option<PacketData> {
        self.data
    }

    /// Returns the text payload, if any.
    #[inline]
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.data.as_ref().and_then(PacketData::as_text)
    }

    /// Returns `true` if this is `pong` carrying `"probe"`.
    #[inline]
    #[must_use]
    pub fn is_probe_pong(&self) -> bool {
        self.packet_type == PacketType::Pong && self.text() == Some(PROBE)
    }
}

// ============================================================================
// Tests
// ============================================================================
