//! Session lifecycle states.

use std::fmt;

/// Where a session is in its lifecycle.
///
/// Transitions only move forward:
/// `Starting → Active → Disconnecting → Closed`, with `Starting` and
/// `Active` allowed to jump straight to `Closed` on a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Built, not started.
    Starting,
    /// Reading and writing.
    Active,
    /// Disconnect packet queued; waiting for the queue to flush.
    Disconnecting,
    /// Dropped. Terminal.
    Closed,
}

impl SessionState {
    /// Whether new outbound packets are accepted.
    pub fn accepts_sends(self) -> bool {
        self == SessionState::Active
    }

    /// Whether the session has begun shutting down.
    pub fn is_shutting_down(self) -> bool {
        self >= SessionState::Disconnecting
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
