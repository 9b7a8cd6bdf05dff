//! Codec module - body serialization and frame sealing.
//!
//! Two unrelated layers share this module:
//!
//! - [`MsgPackCodec`] - MessagePack bodies for control packets and for
//!   capabilities that want structured payloads (`rmp-serde`, struct-as-map)
//! - [`FrameCoder`] - the connection-scoped cipher/MAC applied to every plain
//!   block before it hits the transport. The real RLPx coder comes out of the
//!   handshake; [`PlainCoder`] is the identity implementation.
//!
//! # Example
//!
//! ```
//! use rlpx_session::codec::{FrameCoder, MsgPackCodec, PlainCoder};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let mut coder = PlainCoder::new();
//! let sealed = coder.encrypt(b"frame").unwrap();
//! assert_eq!(&coder.decrypt(&sealed).unwrap()[..], b"frame");
//! ```

mod coder;
mod msgpack;

pub use coder::{FrameCoder, PlainCoder};
pub use msgpack::MsgPackCodec;
