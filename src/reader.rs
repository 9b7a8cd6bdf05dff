//! Reader task: turns transport reads into sealed blocks.
//!
//! Exactly one read is outstanding at any time. Each read is fed through a
//! [`FrameBuffer`] and every complete sealed block is forwarded to the
//! session actor. The event channel is bounded, so a slow actor stops the
//! reads instead of letting blocks pile up.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::SessionError;
use crate::protocol::FrameBuffer;
use crate::session::{Event, IoStats};

/// Spawn the reader task.
///
/// The task ends after forwarding a `ReadFailed` event, or silently once
/// the actor has dropped its receiver. End-of-stream is reported as an
/// `UnexpectedEof` I/O error.
pub fn spawn_reader_task<R>(
    reader: R,
    buffer: FrameBuffer,
    read_size: usize,
    stats: Arc<IoStats>,
    events: mpsc::Sender<Event>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_loop(reader, buffer, read_size, stats, events))
}

async fn read_loop<R>(
    mut reader: R,
    mut buffer: FrameBuffer,
    read_size: usize,
    stats: Arc<IoStats>,
    events: mpsc::Sender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_size.max(1)];

    loop {
        let in_flight = stats.begin_read();
        let result = reader.read(&mut buf).await;
        in_flight.finish(*result.as_ref().unwrap_or(&0));

        let n = match result {
            Ok(0) => {
                let eof = std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "transport closed by peer",
                );
                let _ = events.send(Event::ReadFailed(eof.into())).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = events.send(Event::ReadFailed(SessionError::Io(e))).await;
                return;
            }
        };

        let blocks = match buffer.push(&buf[..n]) {
            Ok(blocks) => blocks,
            Err(e) => {
                let _ = events.send(Event::ReadFailed(e)).await;
                return;
            }
        };

        trace!(bytes = n, blocks = blocks.len(), "Transport read");

        for block in blocks {
            if events.send(Event::Sealed(block)).await.is_err() {
                return;
            }
        }
    }
}
