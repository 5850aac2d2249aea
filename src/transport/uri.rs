//! Endpoint URI construction.
//!
//! Format: `<scheme>://<host>[:<port>]<path>[?<query>]`
//!
//! - The port is omitted when it equals the scheme default
//! - IPv6 literal hosts are bracketed
//! - With `timestamp_requests`, a unique token is appended under
//!   `timestamp_param` on every call

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use super::TransportOptions;

// ============================================================================
// Constants
// ============================================================================

/// Alphabet of timestamp tokens.
const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

// ============================================================================
// Scheme
// ============================================================================

/// URI scheme family of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeFamily {
    /// `http` / `https`.
    Http,
    /// `ws` / `wss`.
    Ws,
}

impl SchemeFamily {
    fn scheme(self, secure: bool) -> &'static str {
        match (self, secure) {
            (Self::Http, false) => "http",
            (Self::Http, true) => "https",
            (Self::Ws, false) => "ws",
            (Self::Ws, true) => "wss",
        }
    }
}

// ============================================================================
// URI
// ============================================================================

/// Builds the endpoint URI for a transport.
#[must_use]
pub fn build_uri(family: SchemeFamily, options: &TransportOptions) -> String {
    let scheme = family.scheme(options.secure);
    let default_port = if options.secure { 443 } else { 80 };

    let port = match options.port {
        Some(port) if port != default_port => format!(":{port}"),
        _ => String::new(),
    };

    let host = if options.host.contains(':') {
        format!("[{}]", options.host)
    } else {
        options.host.clone()
    };

    let mut query = options.query.clone();
    if options.timestamp_requests {
        query.insert(options.timestamp_param.clone(), timestamp_token());
    }

    let encoded = encode_query(&query);
    if encoded.is_empty() {
        format!("{scheme}://{host}{port}{}", options.path)
    } else {
        format!("{scheme}://{host}{port}{}?{encoded}", options.path)
    }
}

/// Encodes `k=v` pairs joined by `&`, percent-encoding keys and values.
#[must_use]
pub fn encode_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// Timestamp Token
// ============================================================================

struct TokenState {
    previous: String,
    seed: u64,
}

static TOKEN_STATE: Mutex<TokenState> = parking_lot::const_mutex(TokenState {
    previous: String::new(),
    seed: 0,
});

fn encode_number(mut num: u64) -> String {
    let mut out = Vec::new();
    loop {
        out.push(ALPHABET[(num % 64) as usize]);
        num /= 64;
        if num == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Returns a cache-busting token unique within this process.
///
/// The current millisecond in a 64-character alphabet, suffixed with
/// `.<seed>` when called again within the same millisecond.
#[must_use]
pub fn timestamp_token() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let encoded = encode_number(now);

    let mut state = TOKEN_STATE.lock();
    if encoded != state.previous {
        state.seed = 0;
        state.previous.clone_from(&encoded);
        return encoded;
    }

    let token = format!("{encoded}.{}", encode_number(state.seed));
    state.seed += 1;
    token
}

// ============================================================================
// Tests
// ============================================================================
