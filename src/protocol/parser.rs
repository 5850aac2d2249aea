//! Packet and payload codec.
//!
//! Stateless encode/decode of single packets and record-separator framed
//! batches ("payloads").
//!
//! # Encodings
//!
//! | Packet | Text channel | Binary-capable channel |
//! |--------|--------------|------------------------|
//! | no payload / text | `<code><text>` | `<code><text>` (text frame) |
//! | binary `message` | `b<base64>` | `<code byte><raw bytes>` (binary frame) |
//!
//! Payloads join text encodings with U+001E. Binary-capable channels skip
//! payload framing and send one frame per packet.

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

use super::packet::{Packet, PacketData, PacketType};

// ============================================================================
// Constants
// ============================================================================

/// Separator between packets in a text payload.
pub const SEPARATOR: char = '\u{1e}';

/// Leading marker of a base64-encoded binary message on text channels.
const BASE64_MARKER: char = 'b';

// ============================================================================
// Encoded
// ============================================================================

/// Wire form of one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// Text frame / text body fragment.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

// ============================================================================
// Packet Codec
// ============================================================================

/// Encodes a packet.
///
/// With `supports_binary`, binary payloads become a type byte followed by
/// the raw bytes. Otherwise they become `b<base64>`, which is only defined
/// for `message` packets.
///
/// # Errors
///
/// Returns [`Error::Codec`] for the `error` sentinel, or for a non-message
/// binary packet bound for a text channel.
pub fn encode_packet(packet: &Packet, supports_binary: bool) -> Result<Encoded> {
    let code = packet
        .packet_type()
        .code()
        .ok_or_else(|| Error::codec("error packets are never encoded"))?;

    match packet.data() {
        None => Ok(Encoded::Text(code.to_string())),
        Some(PacketData::Text(text)) => {
            let mut out = String::with_capacity(text.len() + 1);
            out.push(char::from(b'0' + code));
            out.push_str(text);
            Ok(Encoded::Text(out))
        }
        Some(PacketData::Binary(bytes)) if supports_binary => {
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(code);
            out.extend_from_slice(bytes);
            Ok(Encoded::Binary(out))
        }
        Some(PacketData::Binary(bytes)) => {
            if packet.packet_type() != PacketType::Message {
                return Err(Error::codec(format!(
                    "binary {} packet cannot be sent over a text channel",
                    packet.packet_type()
                )));
            }
            let mut out = String::with_capacity(bytes.len() * 4 / 3 + 4);
            out.push(BASE64_MARKER);
            STANDARD.encode_string(bytes, &mut out);
            Ok(Encoded::Text(out))
        }
    }
}

/// Encodes a packet for a text-only channel.
///
/// # Errors
///
/// See [`encode_packet`].
pub fn encode_packet_text(packet: &Packet) -> Result<String> {
    match encode_packet(packet, false)? {
        Encoded::Text(text) => Ok(text),
        Encoded::Binary(_) => Err(Error::codec("text encoding produced binary output")),
    }
}

/// Decodes a text packet.
///
/// Empty input, an unknown type code, or invalid base64 yield
/// [`Packet::parser_error`].
#[must_use]
pub fn decode_packet(data: &str) -> Packet {
    let mut chars = data.chars();
    let Some(first) = chars.next() else {
        return Packet::parser_error();
    };
    let rest = chars.as_str();

    if first == BASE64_MARKER {
        return match STANDARD.decode(rest) {
            Ok(bytes) => Packet::message(bytes),
            Err(_) => Packet::parser_error(),
        };
    }

    let packet_type = first
        .to_digit(10)
        .and_then(|digit| u8::try_from(digit).ok())
        .and_then(PacketType::from_code);

    match packet_type {
        Some(packet_type) if rest.is_empty() => Packet::empty(packet_type),
        Some(packet_type) => Packet::new(packet_type, Some(PacketData::from(rest))),
        None => Packet::parser_error(),
    }
}

/// Decodes a binary frame: type byte followed by the raw payload.
#[must_use]
pub fn decode_packet_binary(data: &[u8]) -> Packet {
    let Some((&code, rest)) = data.split_first() else {
        return Packet::parser_error();
    };

    match PacketType::from_code(code) {
        Some(packet_type) => Packet::new(packet_type, Some(PacketData::Binary(rest.to_vec()))),
        None => Packet::parser_error(),
    }
}

/// Decodes either wire form.
#[must_use]
pub fn decode_encoded(encoded: &Encoded) -> Packet {
    match encoded {
        Encoded::Text(text) => decode_packet(text),
        Encoded::Binary(bytes) => decode_packet_binary(bytes),
    }
}

// ============================================================================
// Payload Codec
// ============================================================================

/// Encodes a batch for a single text body.
///
/// An empty batch encodes as a bare `open` packet (`"0"`).
///
/// # Errors
///
/// See [`encode_packet`].
pub fn encode_payload(packets: &[Packet]) -> Result<String> {
    if packets.is_empty() {
        return Ok("0".to_string());
    }

    let mut out = String::new();
    for (index, packet) in packets.iter().enumerate() {
        if index > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&encode_packet_text(packet)?);
    }
    Ok(out)
}

/// Decodes a text payload, invoking `callback(packet, index, total)` per
/// segment in order.
///
/// `total` is the number of segments found. Returning
/// [`ControlFlow::Break`] stops processing the remaining segments.
/// Malformed segments are reported as `error` packets without stopping.
pub fn decode_payload<F>(data: &str, mut callback: F)
where
    F: FnMut(Packet, usize, usize) -> ControlFlow<()>,
{
    let mut segments: Vec<&str> = data.split(SEPARATOR).collect();
    while segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }

    let total = segments.len();
    for (index, segment) in segments.into_iter().enumerate() {
        if callback(decode_packet(segment), index, total).is_break() {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
