//! Framing - splitting messages into frames and putting them back together.
//!
//! Each active sub-protocol owns one [`Framing`]: a [`FrameWriter`] holding
//! its outbound messages and a [`FrameReader`] holding at most one partially
//! received message. The [`Multiplexer`] pulls frames from all writers in
//! round-robin order so one large message cannot starve other sub-protocols.
//!
//! ```text
//! send(0x10, 4 KiB) ─► FrameWriter(0x10) ─┐
//! send(0x11, 200 B) ─► FrameWriter(0x11) ─┼─► Multiplexer ─► [0x10][0x11][0x10][0x10][0x10]
//! send(0x00, ping)  ─► FrameWriter(0x00) ─┘
//! ```

mod multiplexer;
mod reader;
mod writer;

use std::time::Instant;

use bytes::Bytes;

pub use multiplexer::Multiplexer;
pub use reader::FrameReader;
pub use writer::{FrameWriter, MuxedFrame};

/// A packet waiting in the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundEntry {
    /// Encoded packet bytes.
    pub payload: Bytes,
    /// Sub-protocol id.
    pub protocol_id: u16,
    /// When the entry was queued.
    pub enqueued_at: Instant,
    /// Whether the entry holds a backpressure slot.
    pub reserved: bool,
}

impl OutboundEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(protocol_id: u16, payload: Bytes, reserved: bool) -> Self {
        Self {
            payload,
            protocol_id,
            enqueued_at: Instant::now(),
            reserved,
        }
    }
}

/// Writer and reader for one sub-protocol id.
#[derive(Debug)]
pub struct Framing {
    /// Outbound side.
    pub writer: FrameWriter,
    /// Inbound side.
    pub reader: FrameReader,
}

impl Framing {
    /// Create the framing pair for `protocol_id`.
    pub fn new(protocol_id: u16, max_packet_size: u32) -> Self {
        Self {
            writer: FrameWriter::new(protocol_id),
            reader: FrameReader::new(protocol_id, max_packet_size),
        }
    }
}
