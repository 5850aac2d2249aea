//! Engine.IO wire protocol.
//!
//! This module defines packets, their text/binary encodings, payload
//! framing, and the handshake document.
//!
//! # Protocol Overview
//!
//! | Unit | Carried by | Framing |
//! |------|------------|---------|
//! | Packet | WebSocket frame | one packet per frame |
//! | Payload | HTTP body | packets joined by U+001E |
//! | Handshake | `open` packet | JSON text |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `packet` | Packet, type and payload model |
//! | `parser` | Packet and payload codec |
//! | `handshake` | Handshake JSON |

// ============================================================================
// Submodules
// ============================================================================

/// Handshake data carried by the `open` packet.
pub mod handshake;

/// Packet model.
pub mod packet;

/// Packet and payload codec.
pub mod parser;

// ============================================================================
// Re-exports
// ============================================================================

pub use handshake::HandshakeData;
pub use packet::{PARSER_ERROR, PROBE, Packet, PacketData, PacketType};
pub use parser::{
    Encoded, SEPARATOR, decode_encoded, decode_packet, decode_packet_binary, decode_payload,
    encode_packet, encode_packet_text, encode_payload,
};
