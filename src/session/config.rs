//! Session tuning knobs.
//!
//! Every field has a default; a JSON document only needs the fields it
//! overrides. Durations are written as milliseconds.
//!
//! ```
//! use rlpx_session::SessionConfig;
//!
//! let config = SessionConfig::from_json(r#"{ "frame_size": 512, "ping_timeout": 2000 }"#).unwrap();
//! assert_eq!(config.frame_size, 512);
//! assert_eq!(config.ping_timeout.as_secs(), 2);
//! assert_eq!(config.max_frames_per_write, 16);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backpressure::{DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT};
use crate::error::{Result, SessionError};
use crate::protocol::{
    DEFAULT_FRAME_SIZE, DEFAULT_MAX_PACKET_SIZE, FRAME_HEADER_SIZE, LEGACY_PREFIX_SIZE,
    PACKET_HEADER_SIZE, SEAL_OVERHEAD_ALLOWANCE,
};

/// Default number of frames sealed into one transport write.
pub const DEFAULT_MAX_FRAMES_PER_WRITE: usize = 16;

/// Default size of one transport read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default idle time before a keepalive ping.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default time to wait for traffic after a ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time a disconnecting session waits for its queue to flush.
pub const DEFAULT_DISCONNECT_LINGER: Duration = Duration::from_secs(2);

/// Default capacity of the actor's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum chunk carried by one frame.
    pub frame_size: usize,
    /// Frames pulled from the multiplexer per transport write.
    pub max_frames_per_write: usize,
    /// Largest packet accepted or sent.
    pub max_packet_size: u32,
    /// Size of one transport read.
    pub read_buffer_size: usize,
    /// Idle time before a keepalive ping.
    #[serde(with = "duration_ms")]
    pub keepalive_interval: Duration,
    /// Time to wait for traffic after a ping.
    #[serde(with = "duration_ms")]
    pub ping_timeout: Duration,
    /// Time a disconnecting session waits for its queue to flush.
    #[serde(with = "duration_ms")]
    pub disconnect_linger: Duration,
    /// Outbound high-water mark in packets.
    pub max_pending_packets: usize,
    /// How long `send_async` waits for room below the mark.
    #[serde(with = "duration_ms")]
    pub backpressure_timeout: Duration,
    /// Capacity of the actor's event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            max_frames_per_write: DEFAULT_MAX_FRAMES_PER_WRITE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            disconnect_linger: DEFAULT_DISCONNECT_LINGER,
            max_pending_packets: DEFAULT_MAX_PENDING,
            backpressure_timeout: DEFAULT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.frame_size > 0, "frame_size must be positive"),
            (
                self.max_frames_per_write > 0,
                "max_frames_per_write must be positive",
            ),
            (
                self.max_packet_size as usize >= PACKET_HEADER_SIZE,
                "max_packet_size is smaller than a packet header",
            ),
            (self.read_buffer_size > 0, "read_buffer_size must be positive"),
            (
                self.max_pending_packets > 0,
                "max_pending_packets must be positive",
            ),
            (self.event_capacity > 0, "event_capacity must be positive"),
            (
                !self.keepalive_interval.is_zero() && !self.ping_timeout.is_zero(),
                "keepalive_interval and ping_timeout must be positive",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(SessionError::Config(msg.to_string())),
            None => Ok(()),
        }
    }

    /// Largest sealed block the reader accepts.
    pub fn max_block_size(&self) -> usize {
        self.max_packet_size as usize
            + FRAME_HEADER_SIZE.max(LEGACY_PREFIX_SIZE)
            + SEAL_OVERHEAD_ALLOWANCE
    }
}

/// Serde helper: `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
