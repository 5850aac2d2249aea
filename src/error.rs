//! Error types for the Engine.IO client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use engineio_client::{Result, Socket};
//!
//! fn example() -> Result<Socket> {
//!     Socket::builder().url("http://localhost:3000")?.build()
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Codec | [`Error::Codec`], [`Error::Handshake`] |
//! | Transport | [`Error::TransportNotOpen`], [`Error::Transport`], [`Error::HttpStatus`], [`Error::ChannelClosed`] |
//! | Protocol | [`Error::Server`], [`Error::Probe`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`], [`Error::Base64`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when socket options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Packet cannot be encoded for the requested channel.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the encoding failure.
        message: String,
    },

    /// Handshake payload of the `open` packet is malformed.
    #[error("Handshake error: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// `send` was called on a transport that is not open.
    ///
    /// This is a programming error in the caller.
    #[error("Transport {transport} not open (state: {state})")]
    TransportNotOpen {
        /// Transport name.
        transport: &'static str,
        /// Ready state at the time of the call.
        state: &'static str,
    },

    /// I/O failure reported by a transport.
    ///
    /// `context` names the failed operation, `source` is the underlying cause.
    #[error("{context}: {source}")]
    Transport {
        /// Operation that failed (e.g. "xhr poll error").
        context: &'static str,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// HTTP request completed with a non-success status.
    #[error("HTTP status {status}")]
    HttpStatus {
        /// Response status code.
        status: u16,
    },

    /// Internal channel closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Server sent an `error` packet, or a packet failed to decode.
    #[error("Server error: {message}")]
    Server {
        /// Packet payload or decoder diagnostic.
        message: String,
    },

    /// Upgrade probe failed.
    #[error("Probe error: {message}")]
    Probe {
        /// Why the probe failed.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 decode error.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a transport-not-open error.
    #[inline]
    pub fn transport_not_open(transport: &'static str, state: &'static str) -> Self {
        Self::TransportNotOpen { transport, state }
    }

    /// Wraps an underlying cause as a transport error.
    #[inline]
    pub fn transport(context: &'static str, source: Error) -> Self {
        Self::Transport {
            context,
            source: Box::new(source),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Creates a server error.
    #[inline]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Creates a probe error without an underlying cause.
    #[inline]
    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a probe error caused by `source`.
    #[inline]
    pub fn probe_caused_by(message: impl Into<String>, source: Error) -> Self {
        Self::Probe {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error came from a transport's I/O.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::HttpStatus { .. }
                | Self::ChannelClosed
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this error indicates caller misuse.
    #[inline]
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::TransportNotOpen { .. })
    }

    /// Returns `true` if a fresh connection attempt may succeed.
    ///
    /// This crate never reconnects on its own; callers use this to decide.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_recoverable(),
            Self::HttpStatus { status } => *status >= 500,
            Self::Probe { .. } | Self::ChannelClosed | Self::Io(_) | Self::Http(_) => true,
            Self::WebSocket(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as _;
    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::config("host must not be empty");
        assert_eq!(err.to_string(), "Configuration error: host must not be empty");
    }

    #[test]
    fn test_transport_error_display_and_source() {
        let err = Error::transport("xhr poll error", Error::http_status(503));
        assert_eq!(err.to_string(), "xhr poll error: HTTP status 503");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transport_not_open_display() {
        let err = Error::transport_not_open("polling", "closed");
        assert_eq!(err.to_string(), "Transport polling not open (state: closed)");
        assert!(err.is_misuse());
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::transport("websocket error", Error::ChannelClosed).is_transport_error());
        assert!(Error::http_status(404).is_transport_error());
        assert!(!Error::config("test").is_transport_error());
        assert!(!Error::probe("probe error").is_transport_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::transport("xhr poll error", Error::http_status(502)).is_recoverable());
        assert!(!Error::transport("xhr poll error", Error::http_status(400)).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
