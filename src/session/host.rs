//! The host seam: what a session needs from the node that owns it.

use std::any::Any;

use super::NodeId;
use crate::control::DisconnectReason;

/// Opaque handshake data a host may stash on a session.
///
/// Handed back through [`SessionHost::on_session_closed`] when the session
/// is dropped.
pub type AuthData = Box<dyn Any + Send + Sync>;

/// Owner of a set of sessions.
///
/// Callbacks run on the session's actor task and must not block.
pub trait SessionHost: Send + Sync + 'static {
    /// A session has been dropped. Called exactly once per session.
    fn on_session_closed(
        &self,
        peer: &NodeId,
        reason: DisconnectReason,
        auth_data: Option<AuthData>,
    );

    /// The peer announced a hash to all of its peers.
    fn on_announcement(&self, _peer: &NodeId, _hash: &[u8; 32]) {}

    /// Reputation store shared by the host's sessions.
    fn reputation(&self) -> &dyn ReputationManager {
        &NoReputation
    }
}

/// Remembers peers that misbehaved on a sub-protocol.
pub trait ReputationManager: Send + Sync {
    /// Mark the peer as rude on `sub_protocol`.
    fn note_rude(&self, peer: &NodeId, client_version: &str, sub_protocol: &str);

    /// Check whether the peer was marked rude on `sub_protocol`.
    fn is_rude(&self, peer: &NodeId, client_version: &str, sub_protocol: &str) -> bool;
}

/// Reputation manager that forgets everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReputation;

impl ReputationManager for NoReputation {
    fn note_rude(&self, _peer: &NodeId, _client_version: &str, _sub_protocol: &str) {}

    fn is_rude(&self, _peer: &NodeId, _client_version: &str, _sub_protocol: &str) -> bool {
        false
    }
}
