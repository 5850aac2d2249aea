//! Builder pattern for socket configuration.
//!
//! # Example
//!
//! ```no_run
//! use engineio_client::{Socket, TransportKind};
//!
//! # async fn example() -> engineio_client::Result<()> {
//! let socket = Socket::builder()
//!     .url("https://chat.example.com/engine.io/?token=abc")?
//!     .transports([TransportKind::Polling, TransportKind::WebSocket])
//!     .build()?;
//! socket.open();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use url::Url;

use crate::client::{HttpClient, WebSocketConnector};
use crate::error::{Error, Result};
use crate::transport::TransportKind;

use super::handle::Socket;
use super::options::{SocketOptions, UpgradeMemory};

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`Socket`].
///
/// Use [`Socket::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SocketBuilder {
    options: SocketOptions,
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes host, port, security, path and query from a URL.
    ///
    /// Accepts `http`, `https`, `ws` and `wss`. A bare `/` path keeps the
    /// default endpoint path. Query pairs are merged into the query.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::Config`] for other schemes or a URL without host
    pub fn url(mut self, url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;

        self.options.secure = match parsed.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            other => return Err(Error::config(format!("unsupported URL scheme: {other}"))),
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config(format!("URL has no host: {url}")))?;
        self.options.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        self.options.port = parsed.port();

        if parsed.path() != "/" {
            self.options.path = parsed.path().to_string();
        }

        for (key, value) in parsed.query_pairs() {
            self.options.query.insert(key.into_owned(), value.into_owned());
        }

        Ok(self)
    }

    /// Sets the host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options = self.options.with_host(host);
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options = self.options.with_port(port);
        self
    }

    /// Enables or disables TLS.
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.options = self.options.with_secure(secure);
        self
    }

    /// Sets the endpoint path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options = self.options.with_path(path);
        self
    }

    /// Adds a query parameter.
    #[inline]
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.with_query(key, value);
        self
    }

    /// Sets the transport preference list.
    #[inline]
    #[must_use]
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.options = self.options.with_transports(transports);
        self
    }

    /// Enables or disables upgrade probing.
    #[inline]
    #[must_use]
    pub fn upgrade(mut self, upgrade: bool) -> Self {
        self.options = self.options.with_upgrade(upgrade);
        self
    }

    /// Enables or disables starting on a remembered websocket.
    #[inline]
    #[must_use]
    pub fn remember_upgrade(mut self, remember: bool) -> Self {
        self.options = self.options.with_remember_upgrade(remember);
        self
    }

    /// Adds a request header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.with_header(name, value);
        self
    }

    /// Enables or disables cache-busting tokens.
    #[inline]
    #[must_use]
    pub fn timestamp_requests(mut self, enabled: bool) -> Self {
        self.options = self.options.with_timestamp_requests(enabled);
        self
    }

    /// Sets the cache-busting query parameter name.
    #[inline]
    #[must_use]
    pub fn timestamp_param(mut self, param: impl Into<String>) -> Self {
        self.options = self.options.with_timestamp_param(param);
        self
    }

    /// Sets the HTTP client used for polling.
    #[inline]
    #[must_use]
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.options = self.options.with_http_client(client);
        self
    }

    /// Sets the websocket connector.
    #[inline]
    #[must_use]
    pub fn ws_connector(mut self, connector: Arc<dyn WebSocketConnector>) -> Self {
        self.options = self.options.with_ws_connector(connector);
        self
    }

    /// Sets the upgrade memory.
    #[inline]
    #[must_use]
    pub fn upgrade_memory(mut self, memory: UpgradeMemory) -> Self {
        self.options = self.options.with_upgrade_memory(memory);
        self
    }

    /// Returns the options collected so far.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    /// Builds the socket. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid or no runtime
    /// is running.
    pub fn build(self) -> Result<Socket> {
        Socket::new(self.options)
    }
}

// ============================================================================
// Tests
// ============================================================================
