//! Peer identity and per-session information.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use super::config::duration_ms;
use crate::capability::CapabilityDescriptor;
use crate::control::DisconnectReason;

/// Length of a node id in bytes (uncompressed secp256k1 key without prefix).
pub const NODE_ID_LEN: usize = 64;

/// Public key identifying a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice; `None` unless it is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First and last four bytes.
        write!(f, "NodeId(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "…")?;
        for b in &self.0[NODE_ID_LEN - 4..] {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Bookkeeping the host keeps about a peer across sessions.
#[derive(Debug, Clone, Default)]
pub struct PeerRecord {
    /// Why the last session with this peer ended.
    pub last_disconnect: Option<DisconnectReason>,
    /// When the last session with this peer started.
    pub last_connected: Option<Instant>,
    /// Long-term rating.
    pub rating: i32,
    /// Selection score.
    pub score: i32,
}

/// A known peer, shared between the host and its sessions.
#[derive(Debug)]
pub struct Peer {
    id: NodeId,
    endpoint: Option<SocketAddr>,
    record: Mutex<PeerRecord>,
}

impl Peer {
    /// Create a peer record.
    pub fn new(id: NodeId, endpoint: Option<SocketAddr>) -> Self {
        Self {
            id,
            endpoint,
            record: Mutex::new(PeerRecord::default()),
        }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Network endpoint, if known.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// Snapshot of the record.
    pub fn record(&self) -> PeerRecord {
        self.record.lock().clone()
    }

    /// Mutate the record in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut PeerRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    pub(crate) fn note_connected(&self) {
        self.record.lock().last_connected = Some(Instant::now());
    }

    /// Record how a session ended. A protocol violation halves rating and
    /// score.
    pub(crate) fn note_session_closed(&self, reason: DisconnectReason) {
        let mut record = self.record.lock();
        record.last_disconnect = Some(reason);
        if reason == DisconnectReason::BadProtocol {
            record.rating /= 2;
            record.score /= 2;
        }
    }
}

/// Information about one session, as shown to the host and in diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSessionInfo {
    /// Remote node id.
    pub id: NodeId,
    /// Remote client identifier from its Hello.
    pub client_version: String,
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Last measured ping round trip.
    #[serde(with = "duration_ms")]
    pub last_ping: Duration,
    /// Registered capabilities.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Base protocol version agreed in the handshake.
    pub protocol_version: u32,
    /// Session rating. Purely additive, never clamped.
    pub rating: i64,
    /// Free-form notes.
    pub notes: BTreeMap<String, String>,
}

impl PeerSessionInfo {
    /// Create info with empty client version and endpoint.
    pub fn new(id: NodeId, protocol_version: u32) -> Self {
        Self {
            id,
            client_version: String::new(),
            host: String::new(),
            port: 0,
            last_ping: Duration::ZERO,
            capabilities: Vec::new(),
            protocol_version,
            rating: 0,
            notes: BTreeMap::new(),
        }
    }

    /// Set the client version.
    pub fn with_client_version(mut self, client_version: impl Into<String>) -> Self {
        self.client_version = client_version.into();
        self
    }

    /// Set host and port from a socket address.
    pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.host = endpoint.ip().to_string();
        self.port = endpoint.port();
        self
    }
}
