//! Capabilities - sub-protocol handlers attached to a session.
//!
//! Provides:
//! - [`Capability`] - interprets the packets of one sub-protocol id
//! - [`CapabilityTable`] - maps descriptors to handlers
//! - [`CapabilityContext`] - lets a handler reply, rate the peer or disconnect
//!
//! # Example
//!
//! ```ignore
//! use rlpx_session::capability::{Capability, CapabilityContext, NamedCapability};
//!
//! struct Eth;
//!
//! impl Capability for Eth {
//!     fn protocol_id(&self) -> u16 { 0x10 }
//!
//!     fn interpret(&self, ctx: &CapabilityContext, packet_type: u8, body: &Bytes) -> bool {
//!         match packet_type {
//!             0 => ctx.send(1, body).is_ok(),
//!             _ => false,
//!         }
//!     }
//! }
//!
//! impl NamedCapability for Eth {
//!     const NAME: &'static str = "eth";
//!     const VERSION: u32 = 63;
//! }
//!
//! session.register_capability(Eth::descriptor(), Arc::new(Eth))?;
//! let eth: Option<Arc<Eth>> = capability_from_session(&session);
//! ```

mod context;
mod table;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::session::Session;

pub use context::CapabilityContext;
pub use table::CapabilityTable;

/// Name and version of a capability, e.g. `eth/63`.
///
/// Ordered by name, then version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Short protocol name.
    pub name: String,
    /// Protocol version.
    pub version: u32,
}

impl CapabilityDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Handler for one sub-protocol.
///
/// `interpret` runs on the session's actor task; it must not block. Replies
/// go out through the context, which only queues them.
pub trait Capability: Send + Sync + 'static {
    /// Sub-protocol id this capability's packets travel on. Never 0.
    fn protocol_id(&self) -> u16;

    /// Handle one inbound packet.
    ///
    /// `packet_type` is relative to the capability (the session strips the
    /// user packet offset). Returning `false` marks the packet invalid and
    /// drops the session with `BadProtocol`.
    fn interpret(&self, ctx: &CapabilityContext, packet_type: u8, body: &Bytes) -> bool;
}

/// A capability type with a fixed name and version.
pub trait NamedCapability: Capability + Sized {
    /// Short protocol name.
    const NAME: &'static str;
    /// Protocol version.
    const VERSION: u32;

    /// Descriptor for this type.
    fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor::new(Self::NAME, Self::VERSION)
    }
}

/// Look up `C` on a session under its own name and version.
///
/// Returns `None` if nothing is registered under that descriptor or the
/// registered handler is a different type.
pub fn capability_from_session<C: NamedCapability>(session: &Session) -> Option<Arc<C>> {
    capability_from_session_version::<C>(session, C::VERSION)
}

/// Look up `C` on a session under its name and an explicit version.
pub fn capability_from_session_version<C: NamedCapability>(
    session: &Session,
    version: u32,
) -> Option<Arc<C>> {
    session.capability::<C>(&CapabilityDescriptor::new(C::NAME, version))
}
