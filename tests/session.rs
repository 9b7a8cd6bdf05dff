//! End-to-end session tests over in-memory duplex streams.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use rlpx_session::capability::{
    capability_from_session, capability_from_session_version, Capability, CapabilityContext,
    CapabilityDescriptor, NamedCapability,
};
use rlpx_session::codec::{FrameCoder, PlainCoder};
use rlpx_session::control::{packet_type, ControlPacket, DisconnectReason};
use rlpx_session::protocol::{
    build_frame, encode_packet, flags, seal_prefix, Frame, FrameBuffer, FrameHeader, Packet,
    DEFAULT_MAX_PACKET_SIZE,
};
use rlpx_session::session::{AuthData, NodeId, Peer, SessionHost, NODE_ID_LEN};
use rlpx_session::{Session, SessionError, SessionState};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingHost {
    closed: Mutex<Vec<(NodeId, DisconnectReason, Option<AuthData>)>>,
    announcements: Mutex<Vec<[u8; 32]>>,
}

impl RecordingHost {
    fn reasons(&self) -> Vec<DisconnectReason> {
        self.closed.lock().iter().map(|(_, r, _)| *r).collect()
    }
}

impl SessionHost for RecordingHost {
    fn on_session_closed(
        &self,
        peer: &NodeId,
        reason: DisconnectReason,
        auth_data: Option<AuthData>,
    ) {
        self.closed.lock().push((*peer, reason, auth_data));
    }

    fn on_announcement(&self, _peer: &NodeId, hash: &[u8; 32]) {
        self.announcements.lock().push(*hash);
    }
}

/// Forwards every packet it sees; rejects packet type 0x0f.
struct Recorder {
    protocol_id: u16,
    tx: mpsc::UnboundedSender<(u16, u8, Bytes)>,
}

impl Capability for Recorder {
    fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    fn interpret(&self, ctx: &CapabilityContext, packet_type: u8, body: &Bytes) -> bool {
        if packet_type == 0x0f {
            return false;
        }
        let _ = self.tx.send((ctx.protocol_id(), packet_type, body.clone()));
        true
    }
}

impl NamedCapability for Recorder {
    const NAME: &'static str = "rec";
    const VERSION: u32 = 1;
}

/// Answers packet type 0 with type 1 carrying the same body.
struct Echo;

impl Capability for Echo {
    fn protocol_id(&self) -> u16 {
        0x20
    }

    fn interpret(&self, ctx: &CapabilityContext, packet_type: u8, body: &Bytes) -> bool {
        packet_type == 0 && ctx.send(1, body).is_ok()
    }
}

impl NamedCapability for Echo {
    const NAME: &'static str = "echo";
    const VERSION: u32 = 1;
}

fn node(fill: u8) -> NodeId {
    NodeId::new([fill; NODE_ID_LEN])
}

fn recorder(protocol_id: u16) -> (Arc<Recorder>, mpsc::UnboundedReceiver<(u16, u8, Bytes)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { protocol_id, tx }), rx)
}

fn session(fill: u8, io: DuplexStream, version: u32) -> (Session, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::default());
    let session = Session::builder(Arc::new(Peer::new(node(fill), None)), host.clone())
        .protocol_version(version)
        .build(io, PlainCoder)
        .unwrap();
    (session, host)
}

fn pair(version: u32) -> (Session, Arc<RecordingHost>, Session, Arc<RecordingHost>) {
    let (a_io, b_io) = duplex(64 * 1024);
    let (a, host_a) = session(1, a_io, version);
    let (b, host_b) = session(2, b_io, version);
    (a, host_a, b, host_b)
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for packet")
        .expect("capability dropped")
}

async fn closed(session: &Session) {
    tokio::time::timeout(TIMEOUT, session.closed())
        .await
        .expect("session did not close");
}

/// Seal a plain block with the identity coder's framing.
fn sealed(plain: &[u8]) -> Vec<u8> {
    let mut out = seal_prefix(plain.len()).to_vec();
    out.extend_from_slice(plain);
    out
}

/// Packet types of every framed block on the wire, in order.
fn packet_types(wire: &[u8]) -> Vec<u8> {
    FrameBuffer::new(4096)
        .push(wire)
        .unwrap()
        .into_iter()
        .map(|block| {
            let frame = Frame::decode(block, DEFAULT_MAX_PACKET_SIZE).unwrap();
            Packet::decode(frame.protocol_id(), frame.chunk, DEFAULT_MAX_PACKET_SIZE)
                .unwrap()
                .packet_type
        })
        .collect()
}

/// Coder whose integrity check always fails.
struct RejectingCoder;

impl FrameCoder for RejectingCoder {
    fn encrypt(&mut self, plain: &[u8]) -> rlpx_session::Result<Bytes> {
        Ok(Bytes::copy_from_slice(plain))
    }

    fn decrypt(&mut self, _sealed: &[u8]) -> rlpx_session::Result<Bytes> {
        Err(SessionError::Auth("MAC mismatch".to_string()))
    }
}

fn single_frame(protocol_id: u16, packet: &[u8]) -> Vec<u8> {
    let len = packet.len() as u32;
    sealed(&build_frame(
        &FrameHeader::new(protocol_id, flags::SINGLE, len, len),
        packet,
    ))
}

#[tokio::test]
async fn test_large_payload_is_framed_and_reassembled() {
    let (a, _host_a, b, _host_b) = pair(5);
    let (cap, mut rx) = recorder(0x10);
    b.register_capability(Recorder::descriptor(), cap).unwrap();
    a.register_framing(0x10);
    a.start();
    b.start();

    // 5-byte header + 4091-byte body = 4096 bytes = 4 frames of 1024
    let body: Vec<u8> = (0..4091).map(|i| (i % 251) as u8).collect();
    a.seal_and_send(0x10, packet_type::USER_PACKET + 3, &body)
        .unwrap();

    let (protocol_id, ty, received) = recv(&mut rx).await;
    assert_eq!(protocol_id, 0x10);
    assert_eq!(ty, 3);
    assert_eq!(&received[..], &body[..]);

    let stats = a.io_stats();
    assert!(stats.max_writes_in_flight <= 1);
    assert!(b.io_stats().max_reads_in_flight <= 1);
}

#[tokio::test]
async fn test_legacy_sessions_deliver_in_order() {
    let (a, _host_a, b, _host_b) = pair(4);
    assert!(!a.framing_enabled());

    let (cap, mut rx) = recorder(0x10);
    b.register_capability(Recorder::descriptor(), cap).unwrap();
    a.start();
    b.start();

    for i in 0..5u8 {
        a.seal_and_send(0x10, packet_type::USER_PACKET + i, &[i; 3])
            .unwrap();
    }

    for i in 0..5u8 {
        let (_, ty, body) = recv(&mut rx).await;
        assert_eq!(ty, i);
        assert_eq!(&body[..], &[i; 3]);
    }
}

#[tokio::test]
async fn test_small_message_overtakes_large_one() {
    let (a, _host_a, b, _host_b) = pair(5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    b.register_capability(
        CapabilityDescriptor::new("bulk", 1),
        Arc::new(Recorder {
            protocol_id: 0x10,
            tx: tx.clone(),
        }),
    )
    .unwrap();
    b.register_capability(
        CapabilityDescriptor::new("chat", 1),
        Arc::new(Recorder {
            protocol_id: 0x11,
            tx,
        }),
    )
    .unwrap();
    a.register_framing(0x10);
    a.register_framing(0x11);
    a.start();
    b.start();

    a.seal_and_send(0x10, packet_type::USER_PACKET, &vec![0xaa; 8 * 1024])
        .unwrap();
    a.seal_and_send(0x11, packet_type::USER_PACKET, b"hi")
        .unwrap();

    let (first, _, body) = recv(&mut rx).await;
    assert_eq!(first, 0x11);
    assert_eq!(&body[..], b"hi");

    let (second, _, body) = recv(&mut rx).await;
    assert_eq!(second, 0x10);
    assert_eq!(body.len(), 8 * 1024);
}

#[tokio::test]
async fn test_capability_reply_through_context() {
    let (a, _host_a, b, _host_b) = pair(5);
    let (cap, mut rx) = recorder(0x20);
    a.register_capability(CapabilityDescriptor::new("echo-client", 1), cap)
        .unwrap();
    b.register_capability(Echo::descriptor(), Arc::new(Echo))
        .unwrap();
    a.start();
    b.start();

    a.seal_and_send(0x20, packet_type::USER_PACKET, b"marco")
        .unwrap();

    let (_, ty, body) = recv(&mut rx).await;
    assert_eq!(ty, 1);
    assert_eq!(&body[..], b"marco");
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (a, host_a, b, host_b) = pair(5);
    a.start();
    b.start();

    let clone = a.clone();
    a.disconnect(DisconnectReason::ClientQuit);
    a.disconnect(DisconnectReason::ClientQuit);
    clone.disconnect(DisconnectReason::UselessPeer);

    closed(&a).await;
    closed(&b).await;

    assert_eq!(host_a.reasons(), vec![DisconnectReason::ClientQuit]);
    assert_eq!(host_b.reasons(), vec![DisconnectReason::DisconnectRequested]);
    assert_eq!(
        a.peer().record().last_disconnect,
        Some(DisconnectReason::ClientQuit)
    );
    assert!(!a.is_connected());
    assert_eq!(a.state(), SessionState::Closed);

    a.disconnect(DisconnectReason::ClientQuit);
    assert_eq!(host_a.reasons().len(), 1);
    assert!(matches!(
        a.seal_and_send(0x10, packet_type::USER_PACKET, b"late"),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_disconnect_before_start_drops_immediately() {
    let (a_io, _b_io) = duplex(1024);
    let (a, host) = session(1, a_io, 5);

    a.disconnect(DisconnectReason::TooManyPeers);

    assert_eq!(a.state(), SessionState::Closed);
    assert_eq!(host.reasons(), vec![DisconnectReason::TooManyPeers]);

    // Starting a dropped session does nothing.
    a.start();
    assert_eq!(a.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_malformed_packet_drops_without_dispatch() {
    let (raw, io) = duplex(64 * 1024);
    let (b, host) = session(2, io, 5);
    b.peer().update(|r| {
        r.rating = 10;
        r.score = 4;
    });
    let (cap, mut rx) = recorder(0x10);
    b.register_capability(Recorder::descriptor(), cap).unwrap();
    b.start();

    // Declares a 100-byte body but carries 3 bytes.
    let mut packet = vec![packet_type::USER_PACKET];
    packet.extend_from_slice(&100u32.to_be_bytes());
    packet.extend_from_slice(b"abc");

    let (_raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write
        .write_all(&single_frame(0x10, &packet))
        .await
        .unwrap();

    closed(&b).await;

    assert_eq!(host.reasons(), vec![DisconnectReason::BadProtocol]);
    assert!(rx.try_recv().is_err());
    let record = b.peer().record();
    assert_eq!(record.rating, 5);
    assert_eq!(record.score, 2);
}

#[tokio::test]
async fn test_unregistered_protocol_is_bad_protocol() {
    let (raw, io) = duplex(64 * 1024);
    let (b, host) = session(2, io, 5);
    b.start();

    let (_raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write
        .write_all(&single_frame(0x33, &encode_packet(packet_type::USER_PACKET, b"x")))
        .await
        .unwrap();

    closed(&b).await;
    assert_eq!(host.reasons(), vec![DisconnectReason::BadProtocol]);
}

#[tokio::test]
async fn test_rejected_packet_is_bad_protocol() {
    let (a, _host_a, b, host_b) = pair(5);
    let (cap, mut rx) = recorder(0x10);
    b.register_capability(Recorder::descriptor(), cap).unwrap();
    a.register_framing(0x10);
    a.start();
    b.start();

    a.seal_and_send(0x10, packet_type::USER_PACKET + 0x0f, b"nope")
        .unwrap();

    closed(&b).await;
    assert_eq!(host_b.reasons(), vec![DisconnectReason::BadProtocol]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_capability_packet_below_user_range_is_bad_protocol() {
    let (raw, io) = duplex(64 * 1024);
    let (b, host) = session(2, io, 4);
    let (cap, mut rx) = recorder(0x10);
    b.register_capability(Recorder::descriptor(), cap).unwrap();
    b.start();

    let mut block = 0x10u16.to_be_bytes().to_vec();
    block.extend_from_slice(&encode_packet(0x05, b"low"));

    let (_raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write.write_all(&sealed(&block)).await.unwrap();

    closed(&b).await;
    assert_eq!(host.reasons(), vec![DisconnectReason::BadProtocol]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_rating_accumulates() {
    let (a_io, _b_io) = duplex(1024);
    let (a, _host) = session(1, a_io, 5);

    a.add_rating(5);
    a.add_rating(-2);

    assert_eq!(a.rating(), 3);
    assert_eq!(a.info().rating, 3);

    // No clamping at the bounds of a single delta.
    a.add_rating(i32::MAX);
    a.add_rating(i32::MAX);
    assert_eq!(a.rating(), 3 + 2 * i64::from(i32::MAX));
}

#[tokio::test]
async fn test_typed_capability_lookup() {
    let (a_io, _b_io) = duplex(1024);
    let (a, _host) = session(1, a_io, 5);
    let (cap, _rx) = recorder(0x10);
    a.register_capability(Recorder::descriptor(), cap).unwrap();

    assert!(capability_from_session::<Recorder>(&a).is_some());
    assert!(capability_from_session_version::<Recorder>(&a, 2).is_none());
    assert!(capability_from_session::<Echo>(&a).is_none());

    // Same descriptor, different type: lookup misses instead of failing.
    a.register_capability(Recorder::descriptor(), Arc::new(Echo))
        .unwrap();
    assert!(capability_from_session::<Recorder>(&a).is_none());
    assert_eq!(a.capabilities().len(), 1);
    assert_eq!(a.info().capabilities, vec![Recorder::descriptor()]);
}

#[tokio::test]
async fn test_send_validation() {
    let (a_io, _b_io) = duplex(64 * 1024);
    let (a, _host) = session(1, a_io, 5);
    a.register_framing(0x10);

    assert!(matches!(
        a.seal_and_send(0x10, packet_type::USER_PACKET, b"early"),
        Err(SessionError::NotConnected)
    ));

    a.start();

    assert!(matches!(
        a.send(0, encode_packet(packet_type::PING, &[])),
        Err(SessionError::ReservedProtocolId(0))
    ));
    assert!(matches!(
        a.send(0x10, Bytes::new()),
        Err(SessionError::InvalidPacket(_))
    ));
    assert!(matches!(
        a.seal_and_send(0x44, packet_type::USER_PACKET, b"x"),
        Err(SessionError::UnknownProtocol(0x44))
    ));
    assert_eq!(a.pending_packets(), 0);
    assert!(a
        .seal_and_send(0x10, packet_type::USER_PACKET, b"ok")
        .is_ok());
}

#[tokio::test]
async fn test_backpressure_bounds_the_queue() {
    // The peer never reads and the pipe is tiny, so the first write stalls.
    let (a_io, _b_io) = duplex(16);
    let host = Arc::new(RecordingHost::default());
    let a = Session::builder(Arc::new(Peer::new(node(1), None)), host)
        .max_pending_packets(2)
        .backpressure_timeout(Duration::from_millis(50))
        .framing(0x10)
        .build(a_io, PlainCoder)
        .unwrap();
    a.start();

    let packet = encode_packet(packet_type::USER_PACKET, &[0u8; 64]);
    a.send(0x10, packet.clone()).unwrap();
    a.send(0x10, packet.clone()).unwrap();
    assert!(a.is_backpressure_active());
    assert!(matches!(
        a.send(0x10, packet.clone()),
        Err(SessionError::BackpressureTimeout)
    ));
    assert!(matches!(
        a.send_async(0x10, packet).await,
        Err(SessionError::BackpressureTimeout)
    ));
    assert_eq!(a.pending_packets(), 2);

    // Control packets are not bounded.
    assert!(a.ping().is_ok());
}

#[tokio::test]
async fn test_ping_pong_updates_last_received() {
    let (a, _host_a, b, _host_b) = pair(5);
    a.start();
    b.start();

    let before = a.last_received();
    tokio::time::sleep(Duration::from_millis(5)).await;
    a.ping().unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while a.last_received() <= before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no pong");
    assert!(a.info().last_ping > Duration::ZERO);
}

#[tokio::test]
async fn test_announcement_reaches_host() {
    let (a, _host_a, b, host_b) = pair(5);
    a.start();
    b.start();

    a.announcement(&[7u8; 32]).unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while host_b.announcements.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no announcement");
    assert_eq!(host_b.announcements.lock()[0], [7u8; 32]);
}

#[tokio::test]
async fn test_auth_data_is_returned_on_close() {
    let (a, host_a, b, _host_b) = pair(5);
    assert!(a
        .replace_auth_data(Box::new(String::from("secret")))
        .is_none());
    assert_eq!(a.with_auth_data(|s: &String| s.len()), Some(6));
    assert_eq!(a.with_auth_data(|n: &u32| *n), None);
    a.start();
    b.start();

    a.disconnect(DisconnectReason::ClientQuit);
    closed(&a).await;

    let mut records = host_a.closed.lock();
    let (peer, reason, auth) = records.pop().unwrap();
    assert_eq!(peer, node(1));
    assert_eq!(reason, DisconnectReason::ClientQuit);
    let auth = auth.unwrap().downcast::<String>().unwrap();
    assert_eq!(*auth, "secret");
    assert!(a.take_auth_data().is_none());
}

#[tokio::test]
async fn test_peer_eof_is_tcp_error() {
    let (raw, io) = duplex(1024);
    let (b, host) = session(2, io, 5);
    b.start();

    drop(raw);

    closed(&b).await;
    assert_eq!(host.reasons(), vec![DisconnectReason::TcpError]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_times_out() {
    let (mut raw, io) = duplex(64 * 1024);
    let host = Arc::new(RecordingHost::default());
    let a = Session::builder(Arc::new(Peer::new(node(1), None)), host.clone())
        .keepalive_interval(Duration::from_secs(1))
        .ping_timeout(Duration::from_millis(500))
        .build(io, PlainCoder)
        .unwrap();
    a.start();

    tokio::time::timeout(Duration::from_secs(10), a.closed())
        .await
        .expect("no ping timeout");
    assert_eq!(host.reasons(), vec![DisconnectReason::PingTimeout]);

    // The wire carries a Ping followed by a Disconnect.
    let mut wire = Vec::new();
    raw.read_to_end(&mut wire).await.unwrap();
    assert_eq!(
        packet_types(&wire),
        vec![packet_type::PING, packet_type::DISCONNECT]
    );
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_survives_when_peer_answers() {
    let (a_io, b_io) = duplex(64 * 1024);
    let host_a = Arc::new(RecordingHost::default());
    let a = Session::builder(Arc::new(Peer::new(node(1), None)), host_a.clone())
        .keepalive_interval(Duration::from_secs(1))
        .ping_timeout(Duration::from_millis(500))
        .build(a_io, PlainCoder)
        .unwrap();
    let (b, _host_b) = session(2, b_io, 5);
    a.start();
    b.start();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(a.is_connected());
    assert!(host_a.reasons().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_ping_times_out_after_ping_timeout() {
    let (_raw, io) = duplex(64 * 1024);
    let host = Arc::new(RecordingHost::default());
    let a = Session::builder(Arc::new(Peer::new(node(1), None)), host.clone())
        .keepalive_interval(Duration::from_secs(30))
        .ping_timeout(Duration::from_secs(1))
        .build(io, PlainCoder)
        .unwrap();
    a.start();

    let sent = tokio::time::Instant::now();
    a.ping().unwrap();

    tokio::time::timeout(Duration::from_secs(60), a.closed())
        .await
        .expect("no ping timeout");
    assert!(sent.elapsed() < Duration::from_secs(2));
    assert_eq!(host.reasons(), vec![DisconnectReason::PingTimeout]);
}

#[tokio::test]
async fn test_ping_requires_active_session() {
    let (a_io, _b_io) = duplex(1024);
    let (a, _host) = session(1, a_io, 5);

    assert!(matches!(a.ping(), Err(SessionError::NotConnected)));

    a.disconnect(DisconnectReason::ClientQuit);
    assert!(matches!(a.ping(), Err(SessionError::NotConnected)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_answered_pings_never_time_out() {
    let (a_io, b_io) = duplex(64 * 1024);
    let host_a = Arc::new(RecordingHost::default());
    let a = Session::builder(Arc::new(Peer::new(node(1), None)), host_a.clone())
        .ping_timeout(Duration::from_millis(200))
        .build(a_io, PlainCoder)
        .unwrap();
    let (b, _host_b) = session(2, b_io, 5);
    a.start();
    b.start();

    for _ in 0..20 {
        let before = a.last_received();
        a.ping().unwrap();
        tokio::time::timeout(TIMEOUT, async {
            while a.last_received() <= before {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("no pong");
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(a.is_connected());
    assert!(host_a.reasons().is_empty());
    assert!(a.info().last_ping > Duration::ZERO);
}

#[tokio::test]
async fn test_hello_on_established_session_is_bad_protocol() {
    let (raw, io) = duplex(64 * 1024);
    let (b, host) = session(2, io, 5);
    b.start();

    let hello = b.hello_message(&node(9), "peer/1.0", 30303);
    let packet = ControlPacket::Hello(hello).to_packet().unwrap();

    let (_raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write
        .write_all(&single_frame(0, &packet))
        .await
        .unwrap();

    closed(&b).await;
    assert_eq!(host.reasons(), vec![DisconnectReason::BadProtocol]);
}

#[tokio::test]
async fn test_failed_block_authentication_is_bad_protocol() {
    let (raw, io) = duplex(64 * 1024);
    let host = Arc::new(RecordingHost::default());
    let b = Session::builder(Arc::new(Peer::new(node(2), None)), host.clone())
        .build(io, RejectingCoder)
        .unwrap();
    b.start();

    let ping = ControlPacket::Ping.to_packet().unwrap();
    let (_raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write
        .write_all(&single_frame(0, &ping))
        .await
        .unwrap();

    closed(&b).await;
    assert_eq!(host.reasons(), vec![DisconnectReason::BadProtocol]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_disconnects_put_one_packet_on_wire() {
    let (mut raw, io) = duplex(64 * 1024);
    let (a, host) = session(1, io, 5);
    a.start();

    let first = {
        let a = a.clone();
        tokio::spawn(async move { a.disconnect(DisconnectReason::ClientQuit) })
    };
    let second = {
        let a = a.clone();
        tokio::spawn(async move { a.disconnect(DisconnectReason::UselessPeer) })
    };
    first.await.unwrap();
    second.await.unwrap();
    closed(&a).await;

    let mut wire = Vec::new();
    tokio::time::timeout(TIMEOUT, raw.read_to_end(&mut wire))
        .await
        .expect("wire not closed")
        .unwrap();
    assert_eq!(packet_types(&wire), vec![packet_type::DISCONNECT]);
    assert_eq!(host.reasons().len(), 1);

    // The aborted reader no longer counts as in flight.
    tokio::time::timeout(TIMEOUT, async {
        while a.io_stats().reads_in_flight != 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("read still counted in flight");
}
