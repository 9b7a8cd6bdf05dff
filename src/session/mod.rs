//! The session: one live, post-handshake connection to a peer.
//!
//! A [`Session`] is a cheap, cloneable handle. Behind it sit three tasks
//! started by [`Session::start`]:
//!
//! - the **actor**, which owns the frame coder and the read/write state
//!   machine and handles every completion, timer and command in turn
//! - the **reader**, which keeps exactly one transport read outstanding
//! - the **writer**, which writes one sealed batch at a time
//!
//! Producers on any task call [`Session::send`]; it only queues. The actor
//! drains the queue whenever no write is in flight.
//!
//! # Lifecycle
//!
//! ```text
//! build() ──► Starting ──start()──► Active ──disconnect()──► Disconnecting ──► Closed
//!                                      └──────── fatal error / peer disconnect ──┘
//! ```
//!
//! `Closed` is reached exactly once and is announced to the
//! [`SessionHost`] through `on_session_closed`, together with any auth data
//! stored on the session.

mod actor;
mod builder;
mod config;
mod host;
mod info;
mod outbound;
mod state;
mod stats;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backpressure::BackpressureController;
use crate::capability::{Capability, CapabilityDescriptor, CapabilityTable};
use crate::codec::FrameCoder;
use crate::control::{ControlPacket, DisconnectReason, Hello};
use crate::error::{Result, SessionError};
use crate::framing::OutboundEntry;
use crate::protocol::{check_packet, encode_packet, CONTROL_PROTOCOL_ID};
use crate::transport::{BoxedReader, BoxedWriter};

pub(crate) use actor::Event;
use actor::Command;
pub use builder::SessionBuilder;
pub use config::SessionConfig;
pub use host::{AuthData, NoReputation, ReputationManager, SessionHost};
pub use info::{NodeId, Peer, PeerRecord, PeerSessionInfo, NODE_ID_LEN};
use outbound::Outbound;
pub use state::SessionState;
pub use stats::{IoStats, IoStatsSnapshot};

/// Resources the actor takes over on `start`.
pub(crate) struct Launch {
    reader: BoxedReader,
    writer: BoxedWriter,
    coder: Box<dyn FrameCoder>,
    commands: mpsc::UnboundedReceiver<Command>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Timestamps {
    last_received: Instant,
    last_ping_sent: Option<Instant>,
    /// Set when a ping is sent, cleared by any valid inbound packet.
    awaiting_reply: bool,
}

/// State shared by the handle, the actor and capability contexts.
pub(crate) struct Inner {
    config: SessionConfig,
    peer: Arc<Peer>,
    host: Arc<dyn SessionHost>,
    framing_enabled: bool,
    connected_at: Instant,
    state: watch::Sender<SessionState>,
    dropped: AtomicBool,
    timestamps: Mutex<Timestamps>,
    info: Mutex<PeerSessionInfo>,
    capabilities: RwLock<CapabilityTable>,
    outbound: Mutex<Outbound>,
    backpressure: BackpressureController,
    outbound_ready: Notify,
    commands: mpsc::UnboundedSender<Command>,
    launch: Mutex<Option<Launch>>,
    auth_data: Mutex<Option<AuthData>>,
    io_stats: Arc<IoStats>,
}

impl Inner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move the state forward; backward moves are ignored.
    fn advance(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Queue an encoded packet.
    ///
    /// Capability packets need an `Active` session; control packets are
    /// accepted until the session is dropped.
    fn enqueue(&self, protocol_id: u16, packet: Bytes, reserved: bool) -> Result<()> {
        {
            let mut outbound = self.outbound.lock();
            let state = self.state();
            let open = if protocol_id == CONTROL_PROTOCOL_ID {
                state != SessionState::Closed
            } else {
                state.accepts_sends()
            };
            if !open {
                return Err(SessionError::NotConnected);
            }
            outbound.push(OutboundEntry::new(protocol_id, packet, reserved))?;
        }
        self.outbound_ready.notify_one();
        Ok(())
    }

    /// Queue a packet that already holds a backpressure slot.
    fn enqueue_reserved(&self, protocol_id: u16, packet: Bytes) -> Result<()> {
        self.enqueue(protocol_id, packet, true).inspect_err(|_| {
            self.backpressure.release();
        })
    }

    /// Queue a control packet outside the backpressure bound.
    fn send_control(&self, packet: &ControlPacket) -> Result<()> {
        self.enqueue(CONTROL_PROTOCOL_ID, packet.to_packet()?, false)
    }

    /// Stamp and queue a ping. Only the actor calls this, so the stamp
    /// always lands before the reply can be read.
    fn send_ping(&self) -> Result<()> {
        {
            let mut timestamps = self.timestamps.lock();
            timestamps.last_ping_sent = Some(Instant::now());
            timestamps.awaiting_reply = true;
        }
        self.send_control(&ControlPacket::Ping)
    }

    fn check_outbound(&self, protocol_id: u16, packet: &[u8]) -> Result<()> {
        if protocol_id == CONTROL_PROTOCOL_ID {
            return Err(SessionError::ReservedProtocolId(protocol_id));
        }
        check_packet(packet, self.config.max_packet_size)?;
        if !self.state().accepts_sends() {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    /// Tear the session down. Only the first call has any effect.
    fn close(&self, reason: DisconnectReason) {
        if self.dropped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.advance(SessionState::Closed);

        let discarded = self.outbound.lock().clear();
        self.backpressure.reset();
        self.peer.note_session_closed(reason);
        let auth_data = self.auth_data.lock().take();

        debug!(
            peer = %self.peer.id(),
            %reason,
            discarded,
            "Session closed"
        );
        self.host.on_session_closed(&self.peer.id(), reason, auth_data);
    }
}

/// Handle to one peer session.
///
/// Cloning is cheap; all clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Start configuring a session for `peer`, owned by `host`.
    pub fn builder(peer: Arc<Peer>, host: Arc<dyn SessionHost>) -> SessionBuilder {
        SessionBuilder::new(peer, host)
    }

    /// Start the session: mark it active and spawn its tasks.
    ///
    /// Must be called from within a tokio runtime. Calling it again, or
    /// after the session was dropped, does nothing.
    pub fn start(&self) {
        let Some(launch) = self.inner.launch.lock().take() else {
            warn!(peer = %self.id(), "Session already started or closed");
            return;
        };

        self.inner.advance(SessionState::Active);
        self.inner.peer.note_connected();
        self.inner.timestamps.lock().last_received = Instant::now();

        debug!(
            peer = %self.id(),
            framing = self.inner.framing_enabled,
            "Session started"
        );
        tokio::spawn(actor::run(self.inner.clone(), launch));
    }

    /// Request a graceful disconnect.
    ///
    /// Safe from any task and idempotent: the first call queues a
    /// Disconnect packet and lets the queue flush for at most
    /// `disconnect_linger`; later calls do nothing. A session that was
    /// never started is dropped immediately.
    pub fn disconnect(&self, reason: DisconnectReason) {
        if self.state().is_shutting_down() {
            return;
        }

        let unstarted = self.inner.launch.lock().take();
        if unstarted.is_some() {
            drop(unstarted);
            self.inner.close(reason);
            return;
        }

        let _ = self.inner.commands.send(Command::Disconnect(reason));
    }

    /// Queue an encoded packet on `protocol_id`.
    ///
    /// Does not wait. Fails with `BackpressureTimeout` when the outbound
    /// queue is at its high-water mark.
    pub fn send(&self, protocol_id: u16, packet: Bytes) -> Result<()> {
        self.inner.check_outbound(protocol_id, &packet)?;
        self.inner.backpressure.try_reserve()?;
        self.inner.enqueue_reserved(protocol_id, packet)
    }

    /// Queue an encoded packet, waiting up to `backpressure_timeout` for
    /// room in the outbound queue.
    pub async fn send_async(&self, protocol_id: u16, packet: Bytes) -> Result<()> {
        self.inner.check_outbound(protocol_id, &packet)?;
        self.inner.backpressure.reserve().await?;
        self.inner.enqueue_reserved(protocol_id, packet)
    }

    /// Encode a packet from its type and body and queue it.
    ///
    /// `packet_type` is the wire type, including any user packet offset.
    pub fn seal_and_send(&self, protocol_id: u16, packet_type: u8, body: &[u8]) -> Result<()> {
        self.send(protocol_id, encode_packet(packet_type, body))
    }

    /// Send a keepalive ping.
    ///
    /// The ping is sent by the actor, which then expects an answer within
    /// `ping_timeout`. Fails with `NotConnected` unless the session is
    /// active.
    pub fn ping(&self) -> Result<()> {
        if !self.state().accepts_sends() {
            return Err(SessionError::NotConnected);
        }
        self.inner
            .commands
            .send(Command::Ping)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Announce a hash to the peer.
    pub fn announcement(&self, hash: &[u8; 32]) -> Result<()> {
        self.inner.send_control(&ControlPacket::Announcement(*hash))
    }

    /// Register a capability handler.
    ///
    /// Re-registering a descriptor replaces the previous handler. With
    /// framing enabled, the handler's protocol id gets a framing.
    pub fn register_capability<C: Capability>(
        &self,
        descriptor: CapabilityDescriptor,
        handler: Arc<C>,
    ) -> Result<()> {
        let protocol_id = handler.protocol_id();
        let descriptors = {
            let mut table = self.inner.capabilities.write();
            if table.register(descriptor.clone(), handler)?.is_some() {
                debug!(peer = %self.id(), capability = %descriptor, "Capability replaced");
            }
            table.descriptors()
        };

        self.register_framing(protocol_id);
        self.inner.info.lock().capabilities = descriptors;
        Ok(())
    }

    /// Create the framing for `protocol_id` if framing is enabled.
    pub fn register_framing(&self, protocol_id: u16) {
        if self.inner.outbound.lock().add_framing(protocol_id) {
            debug!(peer = %self.id(), protocol_id, "Framing registered");
        }
    }

    /// Whether `protocol_id` has a framing. Always false in legacy mode.
    pub fn has_framing(&self, protocol_id: u16) -> bool {
        self.inner.outbound.lock().has_framing(protocol_id)
    }

    /// Snapshot of the capability table.
    pub fn capabilities(&self) -> BTreeMap<CapabilityDescriptor, Arc<dyn Capability>> {
        self.inner.capabilities.read().snapshot()
    }

    /// Look up a capability by descriptor as its concrete type.
    pub fn capability<C: Capability>(&self, descriptor: &CapabilityDescriptor) -> Option<Arc<C>> {
        self.inner.capabilities.read().get_typed::<C>(descriptor)
    }

    /// Build the Hello this node would send, from the session's protocol
    /// version and capability table.
    pub fn hello_message(
        &self,
        local_id: &NodeId,
        client_version: impl Into<String>,
        listen_port: u16,
    ) -> Hello {
        Hello {
            protocol_version: self.inner.info.lock().protocol_version,
            client_version: client_version.into(),
            capabilities: self.inner.capabilities.read().descriptors(),
            listen_port,
            node_id: local_id.as_bytes().to_vec(),
        }
    }

    /// Remote node id.
    pub fn id(&self) -> NodeId {
        self.inner.peer.id()
    }

    /// Shared peer record.
    pub fn peer(&self) -> Arc<Peer> {
        self.inner.peer.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether the session has not been dropped.
    pub fn is_connected(&self) -> bool {
        !self.inner.dropped.load(Ordering::Acquire)
    }

    /// Wait until the session is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Whether frames are multiplexed (protocol version above 4).
    pub fn framing_enabled(&self) -> bool {
        self.inner.framing_enabled
    }

    /// Session rating.
    pub fn rating(&self) -> i64 {
        self.inner.info.lock().rating
    }

    /// Adjust the session rating by `delta`.
    pub fn add_rating(&self, delta: i32) {
        self.inner.info.lock().rating += i64::from(delta);
    }

    /// Record a note about the peer.
    pub fn add_note(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.info.lock().notes.insert(key.into(), value.into());
    }

    /// Snapshot of the session info.
    pub fn info(&self) -> PeerSessionInfo {
        self.inner.info.lock().clone()
    }

    /// When the session was built.
    pub fn connection_time(&self) -> Instant {
        self.inner.connected_at
    }

    /// When the last valid packet arrived.
    pub fn last_received(&self) -> Instant {
        self.inner.timestamps.lock().last_received
    }

    /// The host's reputation manager.
    pub fn rep_man(&self) -> &dyn ReputationManager {
        self.inner.host.reputation()
    }

    /// Store handshake data, returning what was stored before.
    pub fn replace_auth_data(&self, data: AuthData) -> Option<AuthData> {
        self.inner.auth_data.lock().replace(data)
    }

    /// Remove and return the stored handshake data.
    pub fn take_auth_data(&self) -> Option<AuthData> {
        self.inner.auth_data.lock().take()
    }

    /// Run `f` on the stored handshake data if it is a `T`.
    pub fn with_auth_data<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner
            .auth_data
            .lock()
            .as_ref()
            .and_then(|data| data.downcast_ref::<T>())
            .map(f)
    }

    /// Packets queued and holding a backpressure slot.
    pub fn pending_packets(&self) -> usize {
        self.inner.backpressure.pending_count()
    }

    /// Whether `send` would currently be rejected for backpressure.
    pub fn is_backpressure_active(&self) -> bool {
        self.inner.backpressure.is_active()
    }

    /// I/O counters.
    pub fn io_stats(&self) -> IoStatsSnapshot {
        self.inner.io_stats.snapshot()
    }

    /// Effective configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
