//! Outbound queue and per-protocol framing table.
//!
//! Shared between producers (any task calling `send`) and the actor,
//! behind one lock. Without framing, entries wait in a single FIFO and go
//! out one packet per write. With framing, each protocol id has its own
//! [`Framing`] and the [`Multiplexer`] decides what goes next.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;

use crate::error::{Result, SessionError};
use crate::framing::{Framing, Multiplexer, MuxedFrame, OutboundEntry};
use crate::protocol::{encode_legacy_block, Frame, CONTROL_PROTOCOL_ID};

/// Plain blocks ready for sealing, plus the entries they finish.
#[derive(Debug, Default)]
pub(crate) struct PlainBatch {
    pub blocks: Vec<Vec<u8>>,
    pub completed: Vec<OutboundEntry>,
}

impl PlainBatch {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct Outbound {
    framing_enabled: bool,
    max_packet_size: u32,
    legacy: VecDeque<OutboundEntry>,
    framings: BTreeMap<u16, Framing>,
    mux: Multiplexer,
}

impl Outbound {
    pub fn new(framing_enabled: bool, max_packet_size: u32) -> Self {
        let mut outbound = Self {
            framing_enabled,
            max_packet_size,
            legacy: VecDeque::new(),
            framings: BTreeMap::new(),
            mux: Multiplexer::new(),
        };
        if framing_enabled {
            outbound.add_framing(CONTROL_PROTOCOL_ID);
        }
        outbound
    }

    /// Create the framing for `protocol_id` if missing. Returns whether it
    /// was created.
    pub fn add_framing(&mut self, protocol_id: u16) -> bool {
        if !self.framing_enabled || self.framings.contains_key(&protocol_id) {
            return false;
        }
        self.framings
            .insert(protocol_id, Framing::new(protocol_id, self.max_packet_size));
        true
    }

    pub fn has_framing(&self, protocol_id: u16) -> bool {
        self.framings.contains_key(&protocol_id)
    }

    pub fn push(&mut self, entry: OutboundEntry) -> Result<()> {
        if !self.framing_enabled {
            self.legacy.push_back(entry);
            return Ok(());
        }
        match self.framings.get_mut(&entry.protocol_id) {
            Some(framing) => {
                framing.writer.enqueue(entry);
                Ok(())
            }
            None => Err(SessionError::UnknownProtocol(entry.protocol_id)),
        }
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        if self.framing_enabled {
            Multiplexer::has_pending(&self.framings)
        } else {
            !self.legacy.is_empty()
        }
    }

    /// Feed an inbound frame to its protocol's reader.
    ///
    /// Returns the message once complete. A frame for a protocol id with no
    /// framing is `UnknownProtocol`.
    pub fn push_frame(&mut self, frame: Frame) -> Result<Option<Bytes>> {
        let protocol_id = frame.protocol_id();
        match self.framings.get_mut(&protocol_id) {
            Some(framing) => framing.reader.push(frame),
            None => Err(SessionError::UnknownProtocol(protocol_id)),
        }
    }

    /// Take what the next write should carry.
    ///
    /// Legacy mode yields one whole packet; framed mode yields up to
    /// `max_frames` frames of at most `frame_size` bytes.
    pub fn next_batch(&mut self, frame_size: usize, max_frames: usize) -> PlainBatch {
        let mut batch = PlainBatch::default();

        if !self.framing_enabled {
            if let Some(entry) = self.legacy.pop_front() {
                batch
                    .blocks
                    .push(encode_legacy_block(entry.protocol_id, &entry.payload));
                batch.completed.push(entry);
            }
            return batch;
        }

        for MuxedFrame { frame, completed } in
            self.mux.pull(&mut self.framings, frame_size, max_frames)
        {
            batch.blocks.push(frame.encode());
            batch.completed.extend(completed);
        }
        batch
    }

    /// Discard everything queued; returns how many packets were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = self.legacy.drain(..).count();
        for framing in self.framings.values_mut() {
            dropped += framing.writer.clear().len();
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_legacy_block, encode_packet, DEFAULT_MAX_PACKET_SIZE};

    fn entry(protocol_id: u16, packet: Bytes, reserved: bool) -> OutboundEntry {
        OutboundEntry::new(protocol_id, packet, reserved)
    }

    #[test]
    fn test_legacy_one_packet_per_batch() {
        let mut out = Outbound::new(false, DEFAULT_MAX_PACKET_SIZE);
        out.push(entry(0x10, encode_packet(1, b"a"), true)).unwrap();
        out.push(entry(0x11, encode_packet(2, b"b"), true)).unwrap();

        let batch = out.next_batch(1024, 16);
        assert_eq!(batch.blocks.len(), 1);
        assert_eq!(batch.completed.len(), 1);

        let (pid, packet) = decode_legacy_block(Bytes::from(batch.blocks[0].clone())).unwrap();
        assert_eq!(pid, 0x10);
        assert_eq!(packet, encode_packet(1, b"a"));
        assert!(out.has_pending());
    }

    #[test]
    fn test_framed_requires_framing() {
        let mut out = Outbound::new(true, DEFAULT_MAX_PACKET_SIZE);
        assert!(out.has_framing(CONTROL_PROTOCOL_ID));

        let result = out.push(entry(0x10, encode_packet(1, b"a"), true));
        assert!(matches!(result, Err(SessionError::UnknownProtocol(0x10))));

        assert!(out.add_framing(0x10));
        assert!(!out.add_framing(0x10));
        out.push(entry(0x10, encode_packet(1, b"a"), true)).unwrap();
        assert!(out.has_pending());
    }

    #[test]
    fn test_framed_batch_is_bounded() {
        let mut out = Outbound::new(true, DEFAULT_MAX_PACKET_SIZE);
        out.add_framing(0x10);
        out.push(entry(0x10, Bytes::from(vec![7u8; 4096]), true))
            .unwrap();

        let first = out.next_batch(1024, 3);
        assert_eq!(first.blocks.len(), 3);
        assert!(first.completed.is_empty());

        let second = out.next_batch(1024, 3);
        assert_eq!(second.blocks.len(), 1);
        assert_eq!(second.completed.len(), 1);

        let frame = Frame::decode(Bytes::from(second.blocks[0].clone()), DEFAULT_MAX_PACKET_SIZE)
            .unwrap();
        assert!(frame.is_last());
        assert_eq!(frame.protocol_id(), 0x10);
    }

    #[test]
    fn test_clear_counts_dropped() {
        let mut out = Outbound::new(true, DEFAULT_MAX_PACKET_SIZE);
        out.add_framing(0x10);
        out.push(entry(0x10, Bytes::from_static(b"x"), false)).unwrap();
        out.push(entry(0x00, Bytes::from_static(b"y"), false)).unwrap();

        assert_eq!(out.clear(), 2);
        assert!(!out.has_pending());
    }

    #[test]
    fn test_legacy_never_creates_framings() {
        let mut out = Outbound::new(false, DEFAULT_MAX_PACKET_SIZE);
        assert!(!out.add_framing(0x10));
        assert!(!out.has_framing(0x10));
    }

    #[test]
    fn test_push_frame_reassembles_and_rejects_unknown() {
        let mut out = Outbound::new(true, DEFAULT_MAX_PACKET_SIZE);
        out.add_framing(0x10);
        out.push(entry(0x10, Bytes::from(vec![1u8; 300]), false))
            .unwrap();
        let batch = out.next_batch(128, 16);
        assert_eq!(batch.blocks.len(), 3);

        let mut message = None;
        for block in batch.blocks {
            let frame = Frame::decode(Bytes::from(block), DEFAULT_MAX_PACKET_SIZE).unwrap();
            message = out.push_frame(frame).unwrap();
        }
        assert_eq!(message.unwrap().len(), 300);

        let mut other = Outbound::new(true, DEFAULT_MAX_PACKET_SIZE);
        other.add_framing(0x20);
        other.push(entry(0x20, Bytes::from_static(b"x"), false)).unwrap();
        let block = other.next_batch(128, 1).blocks.remove(0);
        let frame = Frame::decode(Bytes::from(block), DEFAULT_MAX_PACKET_SIZE).unwrap();
        assert!(matches!(
            out.push_frame(frame),
            Err(SessionError::UnknownProtocol(0x20))
        ));
    }
}
