//! Inbound side of one sub-protocol's framing.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SessionError};
use crate::protocol::Frame;

#[derive(Debug)]
struct Reassembly {
    buf: BytesMut,
    total: usize,
}

/// Reassembles frames of one sub-protocol into complete messages.
///
/// Frames of different sub-protocols interleave freely, but within one
/// sub-protocol a message's frames must arrive contiguously and in order:
/// a new first frame while a message is open, or a continuation with none
/// open, is a protocol violation.
#[derive(Debug)]
pub struct FrameReader {
    protocol_id: u16,
    partial: Option<Reassembly>,
    max_packet_size: u32,
}

impl FrameReader {
    /// Create an idle reader.
    pub fn new(protocol_id: u16, max_packet_size: u32) -> Self {
        Self {
            protocol_id,
            partial: None,
            max_packet_size,
        }
    }

    /// Whether no message is partially received.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.partial.is_none()
    }

    /// Bytes of the open message received so far.
    pub fn buffered(&self) -> usize {
        self.partial.as_ref().map_or(0, |p| p.buf.len())
    }

    /// Feed one frame; returns the message once its last frame arrives.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Bytes>> {
        if frame.protocol_id() != self.protocol_id {
            return Err(SessionError::Protocol(format!(
                "Frame for protocol {} fed to reader {}",
                frame.protocol_id(),
                self.protocol_id
            )));
        }

        if frame.is_first() {
            if self.partial.is_some() {
                return Err(SessionError::Protocol(format!(
                    "New message on protocol {} before the previous one completed",
                    self.protocol_id
                )));
            }

            let total = frame.header.total_size as usize;
            if total > self.max_packet_size as usize {
                return Err(SessionError::Protocol(format!(
                    "Message size {} exceeds maximum {}",
                    total, self.max_packet_size
                )));
            }

            if frame.is_last() {
                return Ok(Some(frame.chunk));
            }

            // The declared total is untrusted; grow as chunks arrive.
            let mut buf = BytesMut::with_capacity(total.min(frame.chunk.len() * 4));
            buf.extend_from_slice(&frame.chunk);
            self.partial = Some(Reassembly { buf, total });
            return Ok(None);
        }

        let mut partial = self.partial.take().ok_or_else(|| {
            SessionError::Protocol(format!(
                "Continuation frame on protocol {} without a first frame",
                self.protocol_id
            ))
        })?;

        partial.buf.extend_from_slice(&frame.chunk);
        let received = partial.buf.len();

        if received > partial.total {
            return Err(SessionError::Protocol(format!(
                "Message on protocol {} overran its declared size {}",
                self.protocol_id, partial.total
            )));
        }

        match (frame.is_last(), received == partial.total) {
            (true, true) => Ok(Some(partial.buf.freeze())),
            (false, false) => {
                self.partial = Some(partial);
                Ok(None)
            }
            (true, false) => Err(SessionError::Protocol(format!(
                "Last frame on protocol {} left {} of {} bytes",
                self.protocol_id, received, partial.total
            ))),
            (false, true) => Err(SessionError::Protocol(format!(
                "Message on protocol {} complete without a last frame",
                self.protocol_id
            ))),
        }
    }
}
