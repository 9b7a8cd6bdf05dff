//! Round-robin frame selection across sub-protocols.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::{Framing, MuxedFrame};

/// Picks which sub-protocol's next frame goes on the wire.
///
/// Sub-protocols with pending data are served one frame at a time in
/// ascending id order, resuming after the last one served.
#[derive(Debug, Default)]
pub struct Multiplexer {
    last_served: Option<u16>,
}

impl Multiplexer {
    /// Create a multiplexer that starts at the lowest id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull up to `max_frames` frames of at most `frame_size` bytes.
    pub fn pull(
        &mut self,
        framings: &mut BTreeMap<u16, Framing>,
        frame_size: usize,
        max_frames: usize,
    ) -> Vec<MuxedFrame> {
        let mut out = Vec::new();

        while out.len() < max_frames {
            let Some(id) = self.next_id(framings) else {
                break;
            };
            let Some(frame) = framings
                .get_mut(&id)
                .and_then(|f| f.writer.next_frame(frame_size))
            else {
                break;
            };
            out.push(frame);
            self.last_served = Some(id);
        }

        out
    }

    /// Whether any writer still has frames to give.
    pub fn has_pending(framings: &BTreeMap<u16, Framing>) -> bool {
        framings.values().any(|f| f.writer.has_pending())
    }

    fn next_id(&self, framings: &BTreeMap<u16, Framing>) -> Option<u16> {
        let pending = |(id, f): (&u16, &Framing)| f.writer.has_pending().then_some(*id);

        self.last_served
            .and_then(|last| {
                framings
                    .range((Bound::Excluded(last), Bound::Unbounded))
                    .find_map(pending)
            })
            .or_else(|| framings.iter().find_map(pending))
    }
}
