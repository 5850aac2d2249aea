//! Injected network clients.
//!
//! Transports never touch sockets directly. They go through two traits:
//!
//! | Trait | Used by | Default |
//! |-------|---------|---------|
//! | [`HttpClient`] | polling transport | [`ReqwestHttpClient`] |
//! | [`WebSocketConnector`] | websocket transport | [`TungsteniteConnector`] |
//!
//! Implementations run their I/O on their own tasks. Results are handed
//! back to the socket's event loop by the transport.

// ============================================================================
// Submodules
// ============================================================================

/// [`reqwest`]-backed [`HttpClient`].
pub mod reqwest_client;

/// [`tokio_tungstenite`]-backed [`WebSocketConnector`].
pub mod tungstenite;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use reqwest_client::ReqwestHttpClient;
pub use tungstenite::TungsteniteConnector;

// ============================================================================
// Headers
// ============================================================================

/// Header list. Names are lowercase for responses; repeated names keep
/// every value in order.
pub type Headers = Vec<(String, String)>;

/// Returns every value of header `name` (case-insensitive).
#[must_use]
pub fn header_values<'a>(headers: &'a Headers, name: &str) -> Vec<&'a str> {
    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .collect()
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP method used by the polling transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Long-poll read.
    Get,
    /// Payload write.
    Post,
}

impl Method {
    /// Returns the method name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Headers,
    /// Text body (POST only).
    pub body: Option<String>,
}

/// One HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Text body.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Asynchronous HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Executes `request` and returns the complete response.
    ///
    /// Only transport-level failures are errors; non-2xx statuses are
    /// returned as responses.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// WebSocket
// ============================================================================

/// One WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Close frame. Outgoing: close the socket. Incoming: remote closed.
    Close,
}

/// An established WebSocket connection, as a pair of channels.
///
/// Dropping `sender` or sending [`Frame::Close`] closes the connection.
/// `receiver` yields inbound frames and ends when the connection is gone.
#[derive(Debug)]
pub struct WebSocketChannel {
    /// Outbound frames.
    pub sender: mpsc::UnboundedSender<Frame>,
    /// Inbound frames or stream errors.
    pub receiver: mpsc::UnboundedReceiver<Result<Frame>>,
    /// Handshake response headers.
    pub headers: Headers,
}

/// Opens WebSocket connections.
#[async_trait]
pub trait WebSocketConnector: Send + Sync + fmt::Debug {
    /// Connects to `url`, sending `headers` with the handshake request.
    async fn connect(&self, url: &str, headers: &Headers) -> Result<WebSocketChannel>;
}

// ============================================================================
// Tests
// ============================================================================
