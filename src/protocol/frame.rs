//! Framed plain blocks.
//!
//! With framing enabled every opened block is one [`Frame`]: a header and a
//! chunk of some message on one sub-protocol. Chunks are zero-copy slices of
//! the block via `bytes::Bytes`.
//!
//! # Example
//!
//! ```
//! use rlpx_session::protocol::{build_frame, flags, Frame, FrameHeader, DEFAULT_MAX_PACKET_SIZE};
//! use bytes::Bytes;
//!
//! let header = FrameHeader::new(0x10, flags::SINGLE, 5, 5);
//! let block = build_frame(&header, b"hello");
//! let frame = Frame::decode(Bytes::from(block), DEFAULT_MAX_PACKET_SIZE).unwrap();
//!
//! assert_eq!(frame.protocol_id(), 0x10);
//! assert_eq!(frame.chunk(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{FrameHeader, FRAME_HEADER_SIZE};
use crate::error::{Result, SessionError};

/// One frame: header plus chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Chunk bytes.
    pub chunk: Bytes,
}

impl Frame {
    /// Create a new frame from header and chunk.
    pub fn new(header: FrameHeader, chunk: Bytes) -> Self {
        Self { header, chunk }
    }

    /// Parse and validate an opened block.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when the header is short or invalid, or when
    /// the declared chunk length does not match the bytes present.
    pub fn decode(plain: Bytes, max_packet_size: u32) -> Result<Self> {
        let header = FrameHeader::decode(&plain).ok_or_else(|| {
            SessionError::Protocol(format!(
                "Frame of {} bytes shorter than its header",
                plain.len()
            ))
        })?;
        header.validate(max_packet_size)?;

        let chunk = plain.slice(FRAME_HEADER_SIZE..);
        if chunk.len() != header.payload_length as usize {
            return Err(SessionError::Protocol(format!(
                "Frame declares {} bytes but carries {}",
                header.payload_length,
                chunk.len()
            )));
        }

        Ok(Self { header, chunk })
    }

    /// Get a reference to the chunk bytes.
    #[inline]
    pub fn chunk(&self) -> &[u8] {
        &self.chunk
    }

    /// Get the sub-protocol id.
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        self.header.protocol_id
    }

    /// Check if this frame starts a message.
    #[inline]
    pub fn is_first(&self) -> bool {
        self.header.is_first()
    }

    /// Check if this frame ends a message.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.header.is_last()
    }

    /// Encode back to a plain block.
    pub fn encode(&self) -> Vec<u8> {
        build_frame(&self.header, &self.chunk)
    }
}

/// Build a plain framed block as a single byte vector.
pub fn build_frame(header: &FrameHeader, chunk: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + chunk.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(chunk);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{flags, DEFAULT_MAX_PACKET_SIZE};

    #[test]
    fn test_build_and_decode() {
        let header = FrameHeader::new(0x10, flags::FIRST, 2048, 4);
        let block = build_frame(&header, b"abcd");

        assert_eq!(block.len(), FRAME_HEADER_SIZE + 4);

        let frame = Frame::decode(Bytes::from(block), DEFAULT_MAX_PACKET_SIZE).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.chunk(), b"abcd");
        assert!(frame.is_first());
        assert!(!frame.is_last());
    }

    #[test]
    fn test_decode_length_mismatch() {
        let header = FrameHeader::new(0x10, flags::SINGLE, 10, 10);
        let block = build_frame(&header, b"short");

        let err = Frame::decode(Bytes::from(block), DEFAULT_MAX_PACKET_SIZE).unwrap_err();
        assert!(err.to_string().contains("carries 5"));
    }

    #[test]
    fn test_decode_short_block() {
        let result = Frame::decode(Bytes::from_static(&[0, 1, 2]), DEFAULT_MAX_PACKET_SIZE);
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_is_zero_copy_slice() {
        let header = FrameHeader::new(1, flags::SINGLE, 3, 3);
        let block = Bytes::from(build_frame(&header, b"xyz"));
        let frame = Frame::decode(block.clone(), DEFAULT_MAX_PACKET_SIZE).unwrap();

        assert_eq!(frame.chunk.as_ptr(), block[FRAME_HEADER_SIZE..].as_ptr());
    }

    #[test]
    fn test_encode_matches_build() {
        let header = FrameHeader::new(7, 0, 0, 2);
        let frame = Frame::new(header, Bytes::from_static(b"ok"));
        assert_eq!(frame.encode(), build_frame(&header, b"ok"));
    }
}
