//! Wire format encoding and decoding.
//!
//! Every block on the transport is sealed and length-prefixed:
//! ```text
//! ┌──────────────┬─────────────────────┐
//! │ Length       │ Ciphertext          │
//! │ 4 bytes BE   │ Length bytes        │
//! └──────────────┴─────────────────────┘
//! ```
//!
//! With framing enabled, each opened block starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬────────────┬──────────┐
//! │ Proto ID │ Flags │ Total size │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes    │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE  │ uint32 BE│
//! └──────────┴───────┴────────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{Result, SessionError};

/// Frame header size in bytes (fixed, exactly 11).
pub const FRAME_HEADER_SIZE: usize = 11;

/// Size of the length prefix in front of every sealed block.
pub const SEAL_PREFIX_SIZE: usize = 4;

/// Extra bytes a frame coder may add on top of the plain block (MAC, padding).
pub const SEAL_OVERHEAD_ALLOWANCE: usize = 1024;

/// Default size of one frame chunk.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Default maximum size of one reassembled packet (16 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// Sub-protocol id reserved for session control packets.
pub const CONTROL_PROTOCOL_ID: u16 = 0;

/// Highest protocol version that sends whole packets as single blocks.
pub const LAST_UNFRAMED_VERSION: u32 = 4;

/// Whether the negotiated protocol version multiplexes frames.
#[inline]
pub fn is_framing_allowed_for_version(version: u32) -> bool {
    version > LAST_UNFRAMED_VERSION
}

/// Flag constants for the frame header.
pub mod flags {
    /// First frame of a message; carries the total size.
    pub const FIRST: u8 = 0b0000_0001;
    /// Final frame of a message.
    pub const LAST: u8 = 0b0000_0010;

    /// Reserved bits mask (bits 2-7).
    pub const RESERVED_MASK: u8 = 0b1111_1100;

    /// A message that fits in one frame.
    pub const SINGLE: u8 = FIRST | LAST;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sub-protocol the frame belongs to.
    pub protocol_id: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Size of the whole message (first frame only, otherwise 0).
    pub total_size: u32,
    /// Chunk length in bytes.
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(protocol_id: u16, flags: u8, total_size: u32, payload_length: u32) -> Self {
        Self {
            protocol_id,
            flags,
            total_size,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use rlpx_session::protocol::{flags, FrameHeader};
    ///
    /// let header = FrameHeader::new(0x10, flags::SINGLE, 100, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `FRAME_HEADER_SIZE` (11 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= FRAME_HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.protocol_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.total_size.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use rlpx_session::protocol::FrameHeader;
    ///
    /// let bytes = [0, 0x10, 0x03, 0, 0, 0, 42, 0, 0, 0, 42];
    /// let header = FrameHeader::decode(&bytes).unwrap();
    /// assert_eq!(header.protocol_id, 0x10);
    /// assert_eq!(header.total_size, 42);
    /// assert_eq!(header.payload_length, 42);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            protocol_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            total_size: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Reserved flag bits are 0
    /// - Chunk is non-empty
    /// - Only the first frame declares a total size, and it fits the chunk
    ///   and the packet limit
    pub fn validate(&self, max_packet_size: u32) -> Result<()> {
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(SessionError::Protocol(
                "Reserved frame flag bits must be 0".to_string(),
            ));
        }

        if self.payload_length == 0 {
            return Err(SessionError::Protocol("Empty frame chunk".to_string()));
        }

        if self.is_first() {
            if self.total_size > max_packet_size {
                return Err(SessionError::Protocol(format!(
                    "Message size {} exceeds maximum {}",
                    self.total_size, max_packet_size
                )));
            }
            if self.payload_length > self.total_size {
                return Err(SessionError::Protocol(format!(
                    "Chunk of {} bytes larger than message of {}",
                    self.payload_length, self.total_size
                )));
            }
            if self.is_last() && self.payload_length != self.total_size {
                return Err(SessionError::Protocol(
                    "Single frame does not carry the whole message".to_string(),
                ));
            }
        } else if self.total_size != 0 {
            return Err(SessionError::Protocol(
                "Continuation frame declares a total size".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is the first frame of a message.
    #[inline]
    pub fn is_first(&self) -> bool {
        flags::has_flag(self.flags, flags::FIRST)
    }

    /// Check if this is the last frame of a message.
    #[inline]
    pub fn is_last(&self) -> bool {
        flags::has_flag(self.flags, flags::LAST)
    }
}

/// Length prefix for a sealed block.
#[inline]
pub fn seal_prefix(sealed_len: usize) -> [u8; SEAL_PREFIX_SIZE] {
    (sealed_len as u32).to_be_bytes()
}
