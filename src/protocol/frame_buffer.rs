//! Buffer for accumulating transport reads into sealed blocks.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented reads:
//! - `WaitingForLength`: Need the 4-byte length prefix
//! - `WaitingForBlock`: Prefix parsed, need N more ciphertext bytes
//!
//! # Example
//!
//! ```
//! use rlpx_session::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new(1024);
//!
//! let blocks = buffer.push(&[0, 0, 0, 3, b'a']).unwrap();
//! assert!(blocks.is_empty());
//!
//! let blocks = buffer.push(b"bc").unwrap();
//! assert_eq!(&blocks[0][..], b"abc");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::SEAL_PREFIX_SIZE;
use crate::error::{Result, SessionError};

/// State machine for block parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for the sealed bytes.
    WaitingForBlock { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete sealed
/// blocks.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Largest sealed block accepted before it is buffered.
    max_block_size: usize,
}

impl FrameBuffer {
    /// Create a new buffer with the given block limit and a 64KB capacity.
    pub fn new(max_block_size: usize) -> Self {
        Self::with_capacity(64 * 1024, max_block_size)
    }

    /// Create a new buffer with custom capacity and block limit.
    pub fn with_capacity(capacity: usize, max_block_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForLength,
            max_block_size,
        }
    }

    /// Push data into the buffer and extract all complete sealed blocks.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a prefix declares an empty or oversized
    /// block. The buffer is unusable afterwards; the connection is dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut blocks = Vec::new();
        while let Some(block) = self.try_extract_one()? {
            blocks.push(block);
        }

        Ok(blocks)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForLength => {
                if self.buffer.len() < SEAL_PREFIX_SIZE {
                    return Ok(None);
                }

                let prefix = self.buffer.split_to(SEAL_PREFIX_SIZE);
                let declared =
                    u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

                if declared == 0 {
                    return Err(SessionError::Protocol("Empty sealed block".to_string()));
                }
                if declared > self.max_block_size {
                    return Err(SessionError::Protocol(format!(
                        "Sealed block size {} exceeds maximum {}",
                        declared, self.max_block_size
                    )));
                }

                self.state = State::WaitingForBlock {
                    remaining: declared,
                };
                self.try_extract_one()
            }

            State::WaitingForBlock { remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let block = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForLength;
                Ok(Some(block))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBlock { .. } => "WaitingForBlock",
        }
    }
}
