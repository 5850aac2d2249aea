//! Handshake data carried by the `open` packet.
//!
//! # Format
//!
//! ```json
//! {
//!   "sid": "lv_VI97HAXpY6yYWAAAC",
//!   "upgrades": ["websocket"],
//!   "pingInterval": 25000,
//!   "pingTimeout": 20000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// HandshakeData
// ============================================================================

/// Session parameters announced by the server.
///
/// Produced once per connection attempt, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    /// Session ID.
    pub sid: String,

    /// Transport names the server accepts as upgrades.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Server ping interval in milliseconds.
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,

    /// Grace period after a missed ping, in milliseconds.
    #[serde(rename = "pingTimeout")]
    pub ping_timeout: u64,
}

impl HandshakeData {
    /// Parses the JSON payload of an `open` packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the payload is not valid handshake JSON.
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| Error::handshake(e.to_string()))
    }

    /// Returns the ping interval.
    #[inline]
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// Returns the ping timeout.
    #[inline]
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }

    /// Deadline for the next server ping.
    #[inline]
    #[must_use]
    pub fn heartbeat_deadline(&self) -> Duration {
        self.ping_interval() + self.ping_timeout()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let data = HandshakeData::parse(
            r#"{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000}"#,
        )
        .unwrap();

        assert_eq!(data.sid, "abc");
        assert_eq!(data.upgrades, vec!["websocket".to_string()]);
        assert_eq!(data.heartbeat_deadline(), Duration::from_millis(45000));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let data = HandshakeData::parse(
            r#"{"sid":"abc","upgrades":[],"pingInterval":1,"pingTimeout":2,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert!(data.upgrades.is_empty());
    }

    #[test]
    fn test_parse_invalid() {
        let err = HandshakeData::parse("not json").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));

        let err = HandshakeData::parse(r#"{"upgrades":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let data = HandshakeData {
            sid: "s".into(),
            upgrades: vec![],
            ping_interval: 10,
            ping_timeout: 20,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"pingInterval\":10"));
        assert!(json.contains("\"pingTimeout\":20"));
    }
}
