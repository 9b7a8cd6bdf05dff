//! The session actor.
//!
//! Everything that touches the read/write state machine happens here, one
//! message at a time: sealed blocks from the reader, write completions from
//! the writer, disconnect commands, queue notifications and timers. The
//! actor owns the frame coder, so ingress and egress cipher state never
//! need a lock.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use super::{Inner, Launch, Session, SessionState, Timestamps};
use crate::capability::CapabilityContext;
use crate::codec::FrameCoder;
use crate::control::{packet_type::USER_PACKET, ControlPacket, DisconnectReason};
use crate::error::{Result, SessionError};
use crate::framing::OutboundEntry;
use crate::protocol::{decode_legacy_block, Frame, FrameBuffer, Packet, CONTROL_PROTOCOL_ID};
use crate::reader::spawn_reader_task;
use crate::writer::{spawn_writer_task, SealedBlock, WriterHandle};

/// Requests from session handles.
#[derive(Debug)]
pub(crate) enum Command {
    Disconnect(DisconnectReason),
    Ping,
}

/// Completions from the I/O tasks.
#[derive(Debug)]
pub(crate) enum Event {
    /// One sealed block, still encrypted.
    Sealed(Bytes),
    /// The reader stopped.
    ReadFailed(SessionError),
    /// The batch in flight finished; bytes written on success.
    WriteComplete(Result<usize>),
}

/// Outcome of handling one message: `Err` ends the session with a reason.
type Step = std::result::Result<(), DisconnectReason>;

struct Driver {
    inner: Arc<Inner>,
    coder: Box<dyn FrameCoder>,
    writer: WriterHandle,
    /// Entries finished by the write in flight, if one is.
    in_flight: Option<Vec<OutboundEntry>>,
    disconnecting: Option<DisconnectReason>,
}

pub(crate) async fn run(inner: Arc<Inner>, launch: Launch) {
    let Launch {
        reader,
        writer,
        coder,
        mut commands,
    } = launch;
    let config = inner.config.clone();

    let (events_tx, mut events) = mpsc::channel(config.event_capacity);
    let reader_task = spawn_reader_task(
        reader,
        FrameBuffer::with_capacity(config.read_buffer_size, config.max_block_size()),
        config.read_buffer_size,
        inner.io_stats.clone(),
        events_tx.clone(),
    );
    let (writer, writer_task) = spawn_writer_task(writer, inner.io_stats.clone(), events_tx);

    let keepalive = sleep(config.keepalive_interval);
    let linger = sleep(config.disconnect_linger);
    tokio::pin!(keepalive, linger);
    let mut linger_armed = false;

    let mut driver = Driver {
        inner: inner.clone(),
        coder,
        writer,
        in_flight: None,
        disconnecting: None,
    };

    let mut step = driver.flush();
    let reason = loop {
        if let Err(reason) = step {
            break reason;
        }
        if driver.disconnecting.is_some() && !linger_armed {
            linger.as_mut().reset(Instant::now() + config.disconnect_linger);
            linger_armed = true;
        }

        step = tokio::select! {
            Some(command) = commands.recv() => match command {
                Command::Disconnect(reason) => driver.begin_disconnect(reason),
                Command::Ping => driver.on_ping().map(|deadline| {
                    if let Some(deadline) = deadline {
                        keepalive.as_mut().reset(deadline);
                    }
                }),
            },
            event = events.recv() => match event {
                Some(event) => driver.on_event(event),
                None => Err(DisconnectReason::TcpError),
            },
            _ = inner.outbound_ready.notified() => driver.flush(),
            _ = &mut keepalive, if driver.disconnecting.is_none() => {
                driver.on_keepalive().map(|next| keepalive.as_mut().reset(next))
            }
            _ = &mut linger, if linger_armed => {
                debug!(peer = %inner.peer.id(), "Disconnect linger expired");
                Err(DisconnectReason::TcpError)
            }
        };
    };

    let reason = driver.disconnecting.unwrap_or(reason);
    reader_task.abort();
    if driver.in_flight.is_some() {
        writer_task.abort();
    }
    drop(driver);

    inner.close(reason);
}

impl Driver {
    fn peer_id(&self) -> super::NodeId {
        self.inner.peer.id()
    }

    fn violation(&self, error: SessionError) -> DisconnectReason {
        warn!(peer = %self.peer_id(), %error, "Protocol violation");
        DisconnectReason::BadProtocol
    }

    fn on_event(&mut self, event: Event) -> Step {
        match event {
            Event::Sealed(sealed) => self.on_sealed(sealed),
            Event::ReadFailed(error) => {
                let reason = error.disconnect_reason();
                if reason == DisconnectReason::BadProtocol {
                    return Err(self.violation(error));
                }
                debug!(peer = %self.peer_id(), %error, "Read failed");
                Err(reason)
            }
            Event::WriteComplete(Ok(bytes)) => self.on_write_complete(bytes),
            Event::WriteComplete(Err(error)) => {
                debug!(peer = %self.peer_id(), %error, "Write failed");
                Err(error.disconnect_reason())
            }
        }
    }

    fn on_sealed(&mut self, sealed: Bytes) -> Step {
        if self.disconnecting.is_some() {
            trace!(peer = %self.peer_id(), "Ignoring inbound block while disconnecting");
            return Ok(());
        }

        let plain = self
            .coder
            .decrypt(&sealed)
            .map_err(|e| self.violation(e))?;

        if self.inner.framing_enabled {
            self.on_frame(plain)
        } else {
            let (protocol_id, raw) = decode_legacy_block(plain).map_err(|e| self.violation(e))?;
            self.read_packet(protocol_id, raw)
        }
    }

    fn on_frame(&mut self, plain: Bytes) -> Step {
        let frame =
            Frame::decode(plain, self.inner.config.max_packet_size).map_err(|e| self.violation(e))?;
        let protocol_id = frame.protocol_id();
        trace!(
            peer = %self.peer_id(),
            protocol_id,
            len = frame.chunk().len(),
            "Frame received"
        );

        let pushed = self.inner.outbound.lock().push_frame(frame);
        let message = pushed.map_err(|e| self.violation(e))?;

        match message {
            Some(raw) => self.read_packet(protocol_id, raw),
            None => Ok(()),
        }
    }

    fn read_packet(&mut self, protocol_id: u16, raw: Bytes) -> Step {
        let packet = Packet::decode(protocol_id, raw, self.inner.config.max_packet_size)
            .map_err(|e| self.violation(e))?;
        {
            let mut timestamps = self.inner.timestamps.lock();
            timestamps.last_received = Instant::now();
            timestamps.awaiting_reply = false;
        }

        if protocol_id == CONTROL_PROTOCOL_ID {
            return self.interpret(packet.packet_type, &packet.body);
        }

        let handler = self
            .inner
            .capabilities
            .read()
            .by_protocol(protocol_id)
            .ok_or_else(|| self.violation(SessionError::UnknownProtocol(protocol_id)))?;

        let Some(packet_type) = packet.packet_type.checked_sub(USER_PACKET) else {
            return Err(self.violation(SessionError::InvalidPacket(format!(
                "Capability packet type {:#04x} below the user range",
                packet.packet_type
            ))));
        };

        let ctx = CapabilityContext::new(
            protocol_id,
            Session {
                inner: self.inner.clone(),
            },
        );
        if handler.interpret(&ctx, packet_type, &packet.body) {
            Ok(())
        } else {
            Err(self.violation(SessionError::InvalidPacket(format!(
                "Protocol {} rejected packet type {}",
                protocol_id, packet_type
            ))))
        }
    }

    /// Handle a control packet.
    fn interpret(&mut self, packet_type: u8, body: &[u8]) -> Step {
        let packet = ControlPacket::decode(packet_type, body).map_err(|e| self.violation(e))?;

        match packet {
            ControlPacket::Hello(_) => Err(self.violation(SessionError::Protocol(
                "Hello on an established session".to_string(),
            ))),
            ControlPacket::Disconnect(code) => {
                match DisconnectReason::from_code(code) {
                    Some(reason) => debug!(peer = %self.peer_id(), %reason, "Peer disconnected"),
                    None => debug!(peer = %self.peer_id(), code, "Peer disconnected, unknown reason"),
                }
                Err(DisconnectReason::DisconnectRequested)
            }
            ControlPacket::Ping => {
                if let Err(error) = self.inner.send_control(&ControlPacket::Pong) {
                    debug!(peer = %self.peer_id(), %error, "Pong not queued");
                }
                Ok(())
            }
            ControlPacket::Pong => {
                let sent = self.inner.timestamps.lock().last_ping_sent;
                if let Some(sent) = sent {
                    let rtt = sent.elapsed();
                    self.inner.info.lock().last_ping = rtt;
                    trace!(peer = %self.peer_id(), rtt_ms = rtt.as_millis() as u64, "Pong");
                }
                Ok(())
            }
            ControlPacket::Announcement(hash) => {
                self.inner.host.on_announcement(&self.peer_id(), &hash);
                Ok(())
            }
        }
    }

    /// Issue the next write if none is in flight.
    ///
    /// While disconnecting, an empty queue with nothing in flight ends the
    /// session.
    fn flush(&mut self) -> Step {
        if self.in_flight.is_some() {
            return Ok(());
        }

        let batch = self.inner.outbound.lock().next_batch(
            self.inner.config.frame_size,
            self.inner.config.max_frames_per_write,
        );
        if batch.is_empty() {
            return match self.disconnecting {
                Some(reason) => Err(reason),
                None => Ok(()),
            };
        }

        let mut sealed = Vec::with_capacity(batch.blocks.len());
        for block in &batch.blocks {
            let ciphertext = self.coder.encrypt(block).map_err(|e| self.violation(e))?;
            sealed.push(SealedBlock::new(ciphertext));
        }

        trace!(peer = %self.peer_id(), blocks = sealed.len(), "Write issued");
        self.writer.submit(sealed).map_err(|error| {
            debug!(peer = %self.peer_id(), %error, "Writer unavailable");
            DisconnectReason::TcpError
        })?;
        self.in_flight = Some(batch.completed);
        Ok(())
    }

    fn on_write_complete(&mut self, bytes: usize) -> Step {
        let completed = self.in_flight.take().unwrap_or_default();
        let now = std::time::Instant::now();

        let reserved = completed.iter().filter(|e| e.reserved).count();
        self.inner.backpressure.release_many(reserved);

        for entry in &completed {
            trace!(
                peer = %self.peer_id(),
                protocol_id = entry.protocol_id,
                queued_us = now.duration_since(entry.enqueued_at).as_micros() as u64,
                "Packet written"
            );
        }
        trace!(peer = %self.peer_id(), bytes, "Write complete");

        self.flush()
    }

    /// Start a graceful disconnect. Later calls do nothing.
    fn begin_disconnect(&mut self, reason: DisconnectReason) -> Step {
        if self.disconnecting.is_some() {
            return Ok(());
        }
        self.disconnecting = Some(reason);
        self.inner.advance(SessionState::Disconnecting);
        debug!(peer = %self.peer_id(), %reason, "Disconnecting");

        if let Err(error) = self.inner.send_control(&ControlPacket::disconnect(reason)) {
            debug!(peer = %self.peer_id(), %error, "Disconnect packet not queued");
            return Err(reason);
        }
        self.flush()
    }

    /// Ping requested through the session handle.
    ///
    /// Returns the new keepalive deadline. A ping already awaiting its reply
    /// keeps its deadline; the extra ping is still sent.
    fn on_ping(&mut self) -> std::result::Result<Option<Instant>, DisconnectReason> {
        if self.disconnecting.is_some() {
            return Ok(None);
        }
        if self.inner.timestamps.lock().awaiting_reply {
            self.inner
                .send_control(&ControlPacket::Ping)
                .map_err(|e| e.disconnect_reason())?;
            return Ok(None);
        }

        self.inner
            .send_ping()
            .map_err(|e| e.disconnect_reason())?;
        trace!(peer = %self.peer_id(), "Ping");
        Ok(Some(Instant::now() + self.inner.config.ping_timeout))
    }

    /// Keepalive timer fired; returns when it should fire next.
    fn on_keepalive(&mut self) -> std::result::Result<Instant, DisconnectReason> {
        let now = Instant::now();
        let interval = self.inner.config.keepalive_interval;
        let timeout = self.inner.config.ping_timeout;
        let Timestamps {
            last_ping_sent,
            awaiting_reply,
            ..
        } = *self.inner.timestamps.lock();

        match last_ping_sent {
            Some(sent) if awaiting_reply => {
                let deadline = sent + timeout;
                if now < deadline {
                    return Ok(deadline);
                }
                warn!(peer = %self.peer_id(), "Ping timeout");
                self.begin_disconnect(DisconnectReason::PingTimeout)?;
                Ok(now + interval)
            }
            _ => {
                if let Some(due) = last_ping_sent.map(|sent| sent + interval) {
                    if due > now {
                        return Ok(due);
                    }
                }
                self.inner
                    .send_ping()
                    .map_err(|e| e.disconnect_reason())?;
                trace!(peer = %self.peer_id(), "Keepalive ping");
                Ok(now + timeout)
            }
        }
    }
}
