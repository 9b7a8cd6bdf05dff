//! Outbound side of one sub-protocol's framing.

use std::collections::VecDeque;

use crate::protocol::{flags, Frame, FrameHeader};

use super::OutboundEntry;

/// A frame produced by a [`FrameWriter`].
#[derive(Debug)]
pub struct MuxedFrame {
    /// The frame to seal.
    pub frame: Frame,
    /// The entry this frame finished, if it was the last one.
    pub completed: Option<OutboundEntry>,
}

#[derive(Debug)]
struct InProgress {
    entry: OutboundEntry,
    offset: usize,
}

/// Queue of outbound messages for one sub-protocol, cut into frames on demand.
///
/// Messages leave strictly in enqueue order and the frames of one message
/// are produced contiguously.
#[derive(Debug)]
pub struct FrameWriter {
    protocol_id: u16,
    queue: VecDeque<OutboundEntry>,
    current: Option<InProgress>,
}

impl FrameWriter {
    /// Create an empty writer.
    pub fn new(protocol_id: u16) -> Self {
        Self {
            protocol_id,
            queue: VecDeque::new(),
            current: None,
        }
    }

    /// Sub-protocol id this writer frames for.
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// Queue a message.
    pub fn enqueue(&mut self, entry: OutboundEntry) {
        self.queue.push_back(entry);
    }

    /// Whether any frame is left to produce.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.current.is_some() || !self.queue.is_empty()
    }

    /// Messages not yet fully framed (including one in progress).
    pub fn pending_messages(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Drop everything queued; returns the discarded entries.
    pub fn clear(&mut self) -> Vec<OutboundEntry> {
        let mut dropped: Vec<_> = self.current.take().map(|p| p.entry).into_iter().collect();
        dropped.extend(self.queue.drain(..));
        dropped
    }

    /// Cut the next frame of at most `frame_size` bytes.
    ///
    /// Returns `None` when nothing is pending.
    pub fn next_frame(&mut self, frame_size: usize) -> Option<MuxedFrame> {
        debug_assert!(frame_size > 0);

        let mut progress = match self.current.take() {
            Some(p) => p,
            None => {
                let entry = self.queue.pop_front()?;
                InProgress { entry, offset: 0 }
            }
        };

        let total = progress.entry.payload.len();
        let start = progress.offset;
        let end = total.min(start + frame_size);

        let mut frame_flags = 0;
        if start == 0 {
            frame_flags |= flags::FIRST;
        }
        if end == total {
            frame_flags |= flags::LAST;
        }
        let total_size = if start == 0 { total as u32 } else { 0 };

        let header = FrameHeader::new(
            self.protocol_id,
            frame_flags,
            total_size,
            (end - start) as u32,
        );
        let frame = Frame::new(header, progress.entry.payload.slice(start..end));

        if end == total {
            Some(MuxedFrame {
                frame,
                completed: Some(progress.entry),
            })
        } else {
            progress.offset = end;
            self.current = Some(progress);
            Some(MuxedFrame {
                frame,
                completed: None,
            })
        }
    }
}
