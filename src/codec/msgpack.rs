//! MsgPack codec using `rmp-serde`.
//!
//! Bodies are always written with `to_vec_named` so structs travel as maps.
//! Control packets added fields over time and a map keeps older peers able
//! to skip what they do not know.
//!
//! # Example
//!
//! ```
//! use rlpx_session::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Status {
//!     height: u64,
//!     genesis: String,
//! }
//!
//! let msg = Status { height: 42, genesis: "0xd4e5".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Status = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for structured packet bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
