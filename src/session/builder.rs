//! Fluent construction of a [`Session`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;

use super::outbound::Outbound;
use super::{
    Inner, Launch, Peer, PeerSessionInfo, Session, SessionConfig, SessionHost, SessionState,
    Timestamps,
};
use crate::backpressure::BackpressureController;
use crate::capability::{Capability, CapabilityDescriptor, CapabilityTable};
use crate::codec::FrameCoder;
use crate::error::{Result, SessionError};
use crate::protocol::{is_framing_allowed_for_version, LAST_UNFRAMED_VERSION};
use crate::transport::{self, ByteTransport};

/// Protocol version assumed when none is given: the first framed one.
pub const DEFAULT_PROTOCOL_VERSION: u32 = LAST_UNFRAMED_VERSION + 1;

/// Builder for configuring and creating a [`Session`].
///
/// # Example
///
/// ```ignore
/// let session = Session::builder(peer, host)
///     .protocol_version(5)
///     .frame_size(1024)
///     .capability(Eth::descriptor(), Arc::new(Eth::default()))
///     .build(stream, coder)?;
/// session.start();
/// ```
pub struct SessionBuilder {
    peer: Arc<Peer>,
    host: Arc<dyn SessionHost>,
    config: SessionConfig,
    info: Option<PeerSessionInfo>,
    protocol_version: Option<u32>,
    capabilities: CapabilityTable,
    framings: Vec<u16>,
    error: Option<SessionError>,
}

impl SessionBuilder {
    /// Create a builder with the default configuration.
    pub fn new(peer: Arc<Peer>, host: Arc<dyn SessionHost>) -> Self {
        Self {
            peer,
            host,
            config: SessionConfig::default(),
            info: None,
            protocol_version: None,
            capabilities: CapabilityTable::new(),
            framings: Vec::new(),
            error: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the initial session info (client version, endpoint, ...).
    pub fn info(mut self, info: PeerSessionInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Set the negotiated base protocol version.
    ///
    /// Versions above 4 enable framing. Default: 5
    pub fn protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = Some(version);
        self
    }

    /// Register a capability before the session exists.
    pub fn capability<C: Capability>(
        mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<C>,
    ) -> Self {
        if let Err(e) = self.capabilities.register(descriptor, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Create a framing for `protocol_id` up front.
    pub fn framing(mut self, protocol_id: u16) -> Self {
        self.framings.push(protocol_id);
        self
    }

    /// Set the frame size.
    ///
    /// Default: 1024
    pub fn frame_size(mut self, size: usize) -> Self {
        self.config.frame_size = size;
        self
    }

    /// Set how many frames go into one transport write.
    ///
    /// Default: 16
    pub fn max_frames_per_write(mut self, frames: usize) -> Self {
        self.config.max_frames_per_write = frames;
        self
    }

    /// Set the largest packet accepted or sent.
    ///
    /// Default: 16 MiB
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.config.max_packet_size = size;
        self
    }

    /// Set the keepalive interval.
    ///
    /// Default: 30 seconds
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set how long to wait for traffic after a ping.
    ///
    /// Default: 15 seconds
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    /// Set how long a disconnecting session waits for its queue to flush.
    ///
    /// Default: 2 seconds
    pub fn disconnect_linger(mut self, linger: Duration) -> Self {
        self.config.disconnect_linger = linger;
        self
    }

    /// Set the outbound high-water mark.
    ///
    /// When this limit is reached, `send` fails and `send_async` waits.
    /// Default: 1024
    pub fn max_pending_packets(mut self, limit: usize) -> Self {
        self.config.max_pending_packets = limit;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout = timeout;
        self
    }

    /// Build the session over an established transport and frame coder.
    ///
    /// The session is not started; call [`Session::start`].
    pub fn build<T, C>(self, transport: T, coder: C) -> Result<Session>
    where
        T: ByteTransport,
        C: FrameCoder,
    {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.config.validate()?;

        let mut info = self
            .info
            .unwrap_or_else(|| PeerSessionInfo::new(self.peer.id(), DEFAULT_PROTOCOL_VERSION));
        if let Some(version) = self.protocol_version {
            info.protocol_version = version;
        }
        info.capabilities = self.capabilities.descriptors();

        let framing_enabled = is_framing_allowed_for_version(info.protocol_version);
        let mut outbound = Outbound::new(framing_enabled, self.config.max_packet_size);
        let capability_ids: Vec<u16> = self
            .capabilities
            .snapshot()
            .values()
            .map(|c| c.protocol_id())
            .collect();
        for id in capability_ids.into_iter().chain(self.framings) {
            outbound.add_framing(id);
        }

        let (reader, writer) = transport::split(transport);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Starting);
        let now = Instant::now();

        let inner = Inner {
            backpressure: BackpressureController::with_timeout(
                self.config.max_pending_packets,
                self.config.backpressure_timeout,
            ),
            config: self.config,
            peer: self.peer,
            host: self.host,
            framing_enabled,
            connected_at: now,
            state,
            dropped: AtomicBool::new(false),
            timestamps: Mutex::new(Timestamps {
                last_received: now,
                last_ping_sent: None,
                awaiting_reply: false,
            }),
            info: Mutex::new(info),
            capabilities: RwLock::new(self.capabilities),
            outbound: Mutex::new(outbound),
            outbound_ready: Notify::new(),
            commands: commands_tx,
            launch: Mutex::new(Some(Launch {
                reader,
                writer,
                coder: Box::new(coder),
                commands: commands_rx,
            })),
            auth_data: Mutex::new(None),
            io_stats: Default::default(),
        };

        Ok(Session {
            inner: Arc::new(inner),
        })
    }
}
