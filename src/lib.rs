//! # rlpx-session
//!
//! Per-peer session layer of an RLPx-style peer-to-peer node.
//!
//! A [`Session`] takes over a connection once the cryptographic handshake
//! has produced a frame coder. It multiplexes sub-protocols over the one
//! encrypted byte stream, serializes outbound writes while any task may
//! queue packets, dispatches inbound packets to registered
//! [`Capability`] handlers, and runs keepalive and teardown.
//!
//! ## Architecture
//!
//! - **Control plane** (protocol id 0): Hello, Disconnect, Ping, Pong and
//!   Announcement, handled by the session itself
//! - **Capabilities** (any other id): packets routed by protocol id, with
//!   types offset by [`USER_PACKET`](control::packet_type::USER_PACKET)
//! - **Framing** (protocol version above 4): packets cut into fixed-size
//!   frames and interleaved round-robin across protocol ids
//!
//! ## Example
//!
//! ```ignore
//! use rlpx_session::{PlainCoder, Session};
//!
//! let session = Session::builder(peer, host)
//!     .protocol_version(5)
//!     .capability(Eth::descriptor(), Arc::new(Eth::default()))
//!     .build(stream, PlainCoder)?;
//! session.start();
//!
//! session.seal_and_send(0x10, 0x10, &status)?;
//! session.closed().await;
//! ```

pub mod capability;
pub mod codec;
pub mod control;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod transport;

mod backpressure;
mod reader;
mod writer;

pub use capability::{
    capability_from_session, Capability, CapabilityContext, CapabilityDescriptor,
    NamedCapability,
};
pub use codec::{FrameCoder, PlainCoder};
pub use control::DisconnectReason;
pub use error::{Result, SessionError};
pub use session::{
    Peer, PeerSessionInfo, Session, SessionBuilder, SessionConfig, SessionHost, SessionState,
};
