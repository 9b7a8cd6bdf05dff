//! Disconnect reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a session ended. Codes follow devp2p numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisconnectReason {
    /// The remote side asked to disconnect.
    DisconnectRequested = 0x00,
    /// Transport failure (reset, EOF, write error).
    TcpError = 0x01,
    /// Malformed, oversized or unauthenticated traffic.
    BadProtocol = 0x02,
    /// Peer offers nothing we need.
    UselessPeer = 0x03,
    /// Peer table is full.
    TooManyPeers = 0x04,
    /// Already connected to this node.
    DuplicatePeer = 0x05,
    /// No common protocol version.
    IncompatibleProtocol = 0x06,
    /// Handshake carried an empty identity.
    NullIdentity = 0x07,
    /// Local client is shutting down.
    ClientQuit = 0x08,
    /// Identity differs from the one expected.
    UnexpectedIdentity = 0x09,
    /// Connected to ourselves.
    LocalIdentity = 0x0a,
    /// No traffic within the ping timeout.
    PingTimeout = 0x0b,
    /// Sub-protocol specific reason.
    UserReason = 0x10,
}

impl DisconnectReason {
    /// Wire code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a wire code back to a reason.
    pub fn from_code(code: u8) -> Option<Self> {
        use DisconnectReason::*;
        Some(match code {
            0x00 => DisconnectRequested,
            0x01 => TcpError,
            0x02 => BadProtocol,
            0x03 => UselessPeer,
            0x04 => TooManyPeers,
            0x05 => DuplicatePeer,
            0x06 => IncompatibleProtocol,
            0x07 => NullIdentity,
            0x08 => ClientQuit,
            0x09 => UnexpectedIdentity,
            0x0a => LocalIdentity,
            0x0b => PingTimeout,
            0x10 => UserReason,
            _ => return None,
        })
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        use DisconnectReason::*;
        match self {
            DisconnectRequested => "Disconnect was requested.",
            TcpError => "Low-level TCP communication error.",
            BadProtocol => "Data format error.",
            UselessPeer => "Peer had no use for this node.",
            TooManyPeers => "Peer had too many connections.",
            DuplicatePeer => "Peer was already connected.",
            IncompatibleProtocol => "Peer protocol versions are incompatible.",
            NullIdentity => "Null identity given.",
            ClientQuit => "Peer is exiting.",
            UnexpectedIdentity => "Unexpected identity given.",
            LocalIdentity => "Connected to ourselves.",
            PingTimeout => "Peer did not respond to ping in time.",
            UserReason => "Subprotocol reason.",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
