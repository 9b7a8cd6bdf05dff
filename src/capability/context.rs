//! Context handed to capabilities while they interpret a packet.
//!
//! Provides methods for talking back to the peer:
//! - `send` / `send_bytes` - queue a raw reply
//! - `send_encoded` - queue a MsgPack-encoded reply
//! - `add_rating` - adjust the session's rating
//! - `disconnect` - end the session
//!
//! # Example
//!
//! ```ignore
//! fn interpret(&self, ctx: &CapabilityContext, packet_type: u8, body: &Bytes) -> bool {
//!     match packet_type {
//!         GET_STATUS => ctx.send_encoded(STATUS, &self.status()).is_ok(),
//!         STATUS => {
//!             ctx.add_rating(1);
//!             true
//!         }
//!         _ => false,
//!     }
//! }
//! ```

use bytes::Bytes;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::control::{packet_type::USER_PACKET, DisconnectReason};
use crate::error::{Result, SessionError};
use crate::session::{NodeId, Session};

/// Context passed to [`Capability::interpret`](super::Capability::interpret).
///
/// Packet types given to the send methods are relative to the capability;
/// the user packet offset is added here. All sends only queue, so they are
/// safe to call from inside `interpret`.
#[derive(Clone)]
pub struct CapabilityContext {
    protocol_id: u16,
    session: Session,
}

impl CapabilityContext {
    /// Create a context for `protocol_id` on `session`.
    pub fn new(protocol_id: u16, session: Session) -> Self {
        Self {
            protocol_id,
            session,
        }
    }

    /// Get the sub-protocol id.
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// Get the session.
    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get the remote node id.
    pub fn peer_id(&self) -> NodeId {
        self.session.id()
    }

    /// Queue a packet with a raw body.
    pub fn send(&self, packet_type: u8, body: &[u8]) -> Result<()> {
        self.session
            .seal_and_send(self.protocol_id, wire_type(packet_type)?, body)
    }

    /// Queue a packet with a pre-allocated body.
    pub fn send_bytes(&self, packet_type: u8, body: Bytes) -> Result<()> {
        self.send(packet_type, &body)
    }

    /// Queue a packet whose body is `value` encoded as MsgPack.
    pub fn send_encoded<T: Serialize>(&self, packet_type: u8, value: &T) -> Result<()> {
        let body = MsgPackCodec::encode(value)?;
        self.send(packet_type, &body)
    }

    /// Adjust the session rating.
    pub fn add_rating(&self, delta: i32) {
        self.session.add_rating(delta);
    }

    /// Record a note about the peer.
    pub fn add_note(&self, key: impl Into<String>, value: impl Into<String>) {
        self.session.add_note(key, value);
    }

    /// Disconnect the session.
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.session.disconnect(reason);
    }
}

fn wire_type(packet_type: u8) -> Result<u8> {
    packet_type.checked_add(USER_PACKET).ok_or_else(|| {
        SessionError::InvalidPacket(format!("packet type {packet_type} out of range"))
    })
}

impl std::fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("protocol_id", &self.protocol_id)
            .field("peer", &self.session.id())
            .finish()
    }
}
