//! Socket configuration.
//!
//! # Example
//!
//! ```ignore
//! use engineio_client::{SocketOptions, TransportKind};
//!
//! let options = SocketOptions::new()
//!     .with_host("chat.example.com")
//!     .with_secure(true)
//!     .with_transports([TransportKind::WebSocket])
//!     .with_query("token", "abc");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use crate::client::{
    Headers, HttpClient, ReqwestHttpClient, TungsteniteConnector, WebSocketConnector,
};
use crate::error::{Error, Result};
use crate::transport::{TransportKind, TransportOptions};

// ============================================================================
// Constants
// ============================================================================

/// Default endpoint path.
pub const DEFAULT_PATH: &str = "/engine.io/";

/// Default cache-busting query parameter.
pub const DEFAULT_TIMESTAMP_PARAM: &str = "t";

static GLOBAL_UPGRADE_MEMORY: LazyLock<UpgradeMemory> = LazyLock::new(UpgradeMemory::new);

// ============================================================================
// UpgradeMemory
// ============================================================================

/// Records whether a websocket connection has worked before.
///
/// With `remember_upgrade`, a socket whose memory is set starts on
/// websocket directly instead of polling first. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct UpgradeMemory(Arc<AtomicBool>);

impl UpgradeMemory {
    /// Creates an unset memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide memory.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_UPGRADE_MEMORY.clone()
    }

    /// Returns `true` if websocket is known to work.
    #[inline]
    #[must_use]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Updates the flag.
    #[inline]
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }
}

// ============================================================================
// SocketOptions
// ============================================================================

/// Socket configuration.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Server host name or IP literal.
    pub host: String,

    /// Port. `None` uses 80 / 443.
    pub port: Option<u16>,

    /// Use `https` / `wss`.
    pub secure: bool,

    /// Endpoint path.
    pub path: String,

    /// Query parameters sent with every request.
    pub query: BTreeMap<String, String>,

    /// Transports in order of preference.
    pub transports: Vec<TransportKind>,

    /// Probe upgrades announced by the server.
    pub upgrade: bool,

    /// Start on websocket if it worked before.
    pub remember_upgrade: bool,

    /// Headers sent with every request.
    pub extra_headers: Headers,

    /// Append a cache-busting token to every request.
    pub timestamp_requests: bool,

    /// Query parameter name of the cache-busting token.
    pub timestamp_param: String,

    /// HTTP client for polling.
    pub http_client: Arc<dyn HttpClient>,

    /// Connector for websocket.
    pub ws_connector: Arc<dyn WebSocketConnector>,

    /// Shared record of websocket success.
    pub upgrade_memory: UpgradeMemory,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            secure: false,
            path: DEFAULT_PATH.to_string(),
            query: BTreeMap::new(),
            transports: vec![TransportKind::Polling, TransportKind::WebSocket],
            upgrade: true,
            remember_upgrade: false,
            extra_headers: Vec::new(),
            timestamp_requests: false,
            timestamp_param: DEFAULT_TIMESTAMP_PARAM.to_string(),
            http_client: Arc::new(ReqwestHttpClient::new()),
            ws_connector: Arc::new(TungsteniteConnector::new()),
            upgrade_memory: UpgradeMemory::global(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SocketOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SocketOptions {
    /// Sets the host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables or disables TLS.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the endpoint path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Adds a query parameter.
    #[inline]
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the transport preference list.
    #[inline]
    #[must_use]
    pub fn with_transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.transports = transports.into_iter().collect();
        self
    }

    /// Enables or disables upgrade probing.
    #[inline]
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// Enables or disables starting on a remembered websocket.
    #[inline]
    #[must_use]
    pub fn with_remember_upgrade(mut self, remember: bool) -> Self {
        self.remember_upgrade = remember;
        self
    }

    /// Adds a request header.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Enables or disables cache-busting tokens.
    #[inline]
    #[must_use]
    pub fn with_timestamp_requests(mut self, enabled: bool) -> Self {
        self.timestamp_requests = enabled;
        self
    }

    /// Sets the cache-busting query parameter name.
    #[inline]
    #[must_use]
    pub fn with_timestamp_param(mut self, param: impl Into<String>) -> Self {
        self.timestamp_param = param.into();
        self
    }

    /// Sets the HTTP client.
    #[inline]
    #[must_use]
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = client;
        self
    }

    /// Sets the websocket connector.
    #[inline]
    #[must_use]
    pub fn with_ws_connector(mut self, connector: Arc<dyn WebSocketConnector>) -> Self {
        self.ws_connector = connector;
        self
    }

    /// Sets the upgrade memory.
    #[inline]
    #[must_use]
    pub fn with_upgrade_memory(mut self, memory: UpgradeMemory) -> Self {
        self.upgrade_memory = memory;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SocketOptions {
    /// Checks the options for values no connection can use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, an empty or duplicated
    /// transport list, or an empty timestamp parameter while timestamps are
    /// enabled.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }

        if self.transports.is_empty() {
            return Err(Error::config("at least one transport is required"));
        }

        for (index, kind) in self.transports.iter().enumerate() {
            if self.transports[..index].contains(kind) {
                return Err(Error::config(format!("transport {kind} listed twice")));
            }
        }

        if self.timestamp_requests && self.timestamp_param.is_empty() {
            return Err(Error::config("timestamp_param must not be empty"));
        }

        Ok(())
    }

    /// Returns the path with leading and trailing slashes.
    #[must_use]
    pub fn normalized_path(&self) -> String {
        let trimmed = self.path.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        }
    }

    /// Returns `true` if `kind` is configured.
    #[inline]
    #[must_use]
    pub fn allows(&self, kind: TransportKind) -> bool {
        self.transports.contains(&kind)
    }

    /// Derives per-transport options.
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            path: self.normalized_path(),
            query: self.query.clone(),
            timestamp_requests: self.timestamp_requests,
            timestamp_param: self.timestamp_param.clone(),
            extra_headers: self.extra_headers.clone(),
            http_client: self.http_client.clone(),
            ws_connector: self.ws_connector.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
