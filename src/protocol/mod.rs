//! Protocol module - wire format, packets and frames.
//!
//! This module implements the byte layouts the session speaks:
//! - length-prefixed sealed blocks and their accumulation buffer
//! - the 11-byte frame header used once framing is enabled
//! - packets and `check_packet` validation

mod frame;
mod frame_buffer;
mod packet;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use packet::{
    check_packet, decode_legacy_block, encode_legacy_block, encode_packet, Packet,
    LEGACY_PREFIX_SIZE, MAX_PACKET_TYPE, PACKET_HEADER_SIZE,
};
pub use wire_format::{
    flags, is_framing_allowed_for_version, seal_prefix, FrameHeader, CONTROL_PROTOCOL_ID,
    DEFAULT_FRAME_SIZE, DEFAULT_MAX_PACKET_SIZE, FRAME_HEADER_SIZE, LAST_UNFRAMED_VERSION,
    SEAL_OVERHEAD_ALLOWANCE, SEAL_PREFIX_SIZE,
};
