//! Control plane - session-level packets on sub-protocol id 0.
//!
//! The session itself interprets these; capabilities never see them.
//!
//! | Type | Packet       | Body                         |
//! |------|--------------|------------------------------|
//! | 0x00 | Hello        | version, client, caps, port  |
//! | 0x01 | Disconnect   | reason code                  |
//! | 0x02 | Ping         | empty                        |
//! | 0x03 | Pong         | empty                        |
//! | 0x04 | Announcement | 32-byte all-peer hash        |

mod packets;
mod reason;

pub use packets::{packet_type, ControlPacket, Hello};
pub use reason::DisconnectReason;
