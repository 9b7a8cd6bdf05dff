//! Control packets carried on sub-protocol id 0.
//!
//! Bodies are MsgPack maps; Ping and Pong carry an empty body.
//!
//! # Example
//!
//! ```
//! use rlpx_session::control::{ControlPacket, DisconnectReason};
//!
//! let (packet_type, body) = ControlPacket::disconnect(DisconnectReason::ClientQuit)
//!     .encode()
//!     .unwrap();
//! let decoded = ControlPacket::decode(packet_type, &body).unwrap();
//! assert_eq!(decoded.disconnect_reason(), Some(DisconnectReason::ClientQuit));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::DisconnectReason;
use crate::capability::CapabilityDescriptor;
use crate::codec::MsgPackCodec;
use crate::error::{Result, SessionError};
use crate::protocol::encode_packet;

/// Control packet type codes.
pub mod packet_type {
    /// Handshake greeting.
    pub const HELLO: u8 = 0x00;
    /// Disconnect with reason.
    pub const DISCONNECT: u8 = 0x01;
    /// Keepalive request.
    pub const PING: u8 = 0x02;
    /// Keepalive reply.
    pub const PONG: u8 = 0x03;
    /// All-peer hash broadcast.
    pub const ANNOUNCEMENT: u8 = 0x04;

    /// First code owned by capabilities; capability types are offset by this.
    pub const USER_PACKET: u8 = 0x10;
}

/// Greeting exchanged during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Base protocol version.
    pub protocol_version: u32,
    /// Free-form client identifier.
    pub client_version: String,
    /// Capabilities offered.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// TCP listen port, 0 if not listening.
    pub listen_port: u16,
    /// Node public key.
    #[serde(with = "serde_bytes")]
    pub node_id: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct DisconnectBody {
    reason: u8,
}

#[derive(Serialize, Deserialize)]
struct AnnouncementBody {
    #[serde(with = "serde_bytes")]
    hash: Vec<u8>,
}

/// A decoded control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    /// Handshake greeting.
    Hello(Hello),
    /// Peer is going away; raw reason code as sent.
    Disconnect(u8),
    /// Keepalive request.
    Ping,
    /// Keepalive reply.
    Pong,
    /// Hash over the sender's peer set.
    Announcement([u8; 32]),
}

impl ControlPacket {
    /// Disconnect packet for a known reason.
    pub fn disconnect(reason: DisconnectReason) -> Self {
        ControlPacket::Disconnect(reason.code())
    }

    /// Reason carried by a Disconnect packet, if known.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            ControlPacket::Disconnect(code) => DisconnectReason::from_code(*code),
            _ => None,
        }
    }

    /// Type code on the wire.
    pub fn packet_type(&self) -> u8 {
        match self {
            ControlPacket::Hello(_) => packet_type::HELLO,
            ControlPacket::Disconnect(_) => packet_type::DISCONNECT,
            ControlPacket::Ping => packet_type::PING,
            ControlPacket::Pong => packet_type::PONG,
            ControlPacket::Announcement(_) => packet_type::ANNOUNCEMENT,
        }
    }

    /// Encode to type code and body.
    pub fn encode(&self) -> Result<(u8, Vec<u8>)> {
        let body = match self {
            ControlPacket::Hello(hello) => MsgPackCodec::encode(hello)?,
            ControlPacket::Disconnect(code) => {
                MsgPackCodec::encode(&DisconnectBody { reason: *code })?
            }
            ControlPacket::Ping | ControlPacket::Pong => Vec::new(),
            ControlPacket::Announcement(hash) => MsgPackCodec::encode(&AnnouncementBody {
                hash: hash.to_vec(),
            })?,
        };
        Ok((self.packet_type(), body))
    }

    /// Encode to complete packet bytes.
    pub fn to_packet(&self) -> Result<Bytes> {
        let (packet_type, body) = self.encode()?;
        Ok(encode_packet(packet_type, &body))
    }

    /// Decode a control packet body.
    ///
    /// # Errors
    ///
    /// Unknown type codes and malformed bodies are protocol errors.
    pub fn decode(packet_type: u8, body: &[u8]) -> Result<Self> {
        match packet_type {
            packet_type::HELLO => Ok(ControlPacket::Hello(MsgPackCodec::decode(body)?)),
            packet_type::DISCONNECT => {
                let body: DisconnectBody = MsgPackCodec::decode(body)?;
                Ok(ControlPacket::Disconnect(body.reason))
            }
            packet_type::PING => Ok(ControlPacket::Ping),
            packet_type::PONG => Ok(ControlPacket::Pong),
            packet_type::ANNOUNCEMENT => {
                let body: AnnouncementBody = MsgPackCodec::decode(body)?;
                let hash: [u8; 32] = body.hash.as_slice().try_into().map_err(|_| {
                    SessionError::Protocol(format!(
                        "Announcement hash of {} bytes",
                        body.hash.len()
                    ))
                })?;
                Ok(ControlPacket::Announcement(hash))
            }
            other => Err(SessionError::Protocol(format!(
                "Unknown control packet type {:#04x}",
                other
            ))),
        }
    }
}
