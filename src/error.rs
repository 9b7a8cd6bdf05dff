//! Error types for the session layer.

use thiserror::Error;

use crate::control::DisconnectReason;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration loading only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Invalid session configuration.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Protocol error (bad frame header, broken reassembly, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame codec rejected a sealed block (decryption or MAC failure).
    #[error("Frame authentication failed: {0}")]
    Auth(String),

    /// Packet failed structural validation.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// No framing or capability registered for the sub-protocol id.
    #[error("Unknown sub-protocol id: {0}")]
    UnknownProtocol(u16),

    /// Sub-protocol id is reserved for session control packets.
    #[error("Sub-protocol id {0} is reserved")]
    ReservedProtocolId(u16),

    /// Session is not active (not started, disconnecting or dropped).
    #[error("Session not connected")]
    NotConnected,

    /// Outbound queue is at its high-water mark.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl SessionError {
    /// Reason the session is dropped with when this error ends it.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            SessionError::Io(_) | SessionError::NotConnected => DisconnectReason::TcpError,
            SessionError::Config(_) => DisconnectReason::ClientQuit,
            _ => DisconnectReason::BadProtocol,
        }
    }
}

/// Result type alias using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
