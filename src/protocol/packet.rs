//! Packets and their structural validation.
//!
//! A packet is what a sub-protocol hands to the session and what the
//! session hands back after reassembly:
//! ```text
//! ┌──────┬────────────┬──────────────┐
//! │ Type │ Body len   │ Body         │
//! │ 1 B  │ uint32 BE  │ Body len B   │
//! └──────┴────────────┴──────────────┘
//! ```
//!
//! Legacy sessions (protocol version 4 and below) seal one packet per block,
//! prefixed by the 2-byte sub-protocol id.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SessionError};

/// Packet header size: type byte + body length.
pub const PACKET_HEADER_SIZE: usize = 5;

/// Highest packet type code; the high bit is never set on the wire.
pub const MAX_PACKET_TYPE: u8 = 0x7f;

/// Size of the sub-protocol prefix in a legacy block.
pub const LEGACY_PREFIX_SIZE: usize = 2;

/// A complete packet, addressed to one sub-protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sub-protocol id.
    pub protocol_id: u16,
    /// Packet type code.
    pub packet_type: u8,
    /// Body bytes (zero-copy slice of the reassembled message).
    pub body: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(protocol_id: u16, packet_type: u8, body: Bytes) -> Self {
        Self {
            protocol_id,
            packet_type,
            body,
        }
    }

    /// Encode to the on-wire packet layout.
    pub fn encode(&self) -> Bytes {
        encode_packet(self.packet_type, &self.body)
    }

    /// Validate and split raw packet bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPacket`] if `check_packet` fails.
    pub fn decode(protocol_id: u16, raw: Bytes, max_packet_size: u32) -> Result<Self> {
        check_packet(&raw, max_packet_size)?;
        Ok(Self {
            protocol_id,
            packet_type: raw[0],
            body: raw.slice(PACKET_HEADER_SIZE..),
        })
    }
}

/// Build packet bytes from a type code and body.
///
/// # Example
///
/// ```
/// use rlpx_session::protocol::{check_packet, encode_packet, DEFAULT_MAX_PACKET_SIZE};
///
/// let bytes = encode_packet(0x10, b"status");
/// assert_eq!(bytes.len(), 5 + 6);
/// assert!(check_packet(&bytes, DEFAULT_MAX_PACKET_SIZE).is_ok());
/// ```
pub fn encode_packet(packet_type: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + body.len());
    buf.put_u8(packet_type);
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(body);
    buf.freeze()
}

/// Check that raw bytes form a valid packet for sending or receiving.
///
/// Rejects short input, type codes with the high bit set, a declared body
/// length that differs from the bytes present, and oversized packets.
pub fn check_packet(raw: &[u8], max_packet_size: u32) -> Result<()> {
    if raw.len() < PACKET_HEADER_SIZE {
        return Err(SessionError::InvalidPacket(format!(
            "{} bytes is shorter than the packet header",
            raw.len()
        )));
    }

    if raw.len() > max_packet_size as usize {
        return Err(SessionError::InvalidPacket(format!(
            "Packet size {} exceeds maximum {}",
            raw.len(),
            max_packet_size
        )));
    }

    if raw[0] > MAX_PACKET_TYPE {
        return Err(SessionError::InvalidPacket(format!(
            "Packet type {:#04x} out of range",
            raw[0]
        )));
    }

    let declared = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]) as usize;
    let remaining = raw.len() - PACKET_HEADER_SIZE;
    if declared != remaining {
        return Err(SessionError::InvalidPacket(format!(
            "Declared body length {} but {} bytes remain",
            declared, remaining
        )));
    }

    Ok(())
}

/// Build a legacy plain block: sub-protocol id followed by the packet.
pub fn encode_legacy_block(protocol_id: u16, packet: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LEGACY_PREFIX_SIZE + packet.len());
    buf.extend_from_slice(&protocol_id.to_be_bytes());
    buf.extend_from_slice(packet);
    buf
}

/// Split a legacy plain block into sub-protocol id and packet bytes.
pub fn decode_legacy_block(plain: Bytes) -> Result<(u16, Bytes)> {
    if plain.len() < LEGACY_PREFIX_SIZE {
        return Err(SessionError::Protocol(
            "Legacy block shorter than its protocol prefix".to_string(),
        ));
    }
    let protocol_id = u16::from_be_bytes([plain[0], plain[1]]);
    Ok((protocol_id, plain.slice(LEGACY_PREFIX_SIZE..)))
}
