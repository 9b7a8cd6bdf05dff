//! Dedicated writer task for sealed blocks.
//!
//! The session actor seals frames with the connection's [`FrameCoder`] and
//! hands them to this task one batch at a time. The task writes the batch
//! with scatter/gather I/O and reports the outcome back on the actor's event
//! channel, which is what lets the actor keep at most one write in flight.
//!
//! # Architecture
//!
//! ```text
//! Session actor ─► mpsc::Sender<Vec<SealedBlock>> ─► Writer Task ─► Transport
//!       ▲                                                │
//!       └──────────── Event::WriteComplete ──────────────┘
//! ```
//!
//! [`FrameCoder`]: crate::codec::FrameCoder

use std::io::IoSlice;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{Result, SessionError};
use crate::protocol::{seal_prefix, SEAL_PREFIX_SIZE};
use crate::session::{Event, IoStats};

/// A sealed block ready to be written to the transport.
#[derive(Debug)]
pub struct SealedBlock {
    /// Pre-encoded length prefix (4 bytes).
    pub prefix: [u8; SEAL_PREFIX_SIZE],
    /// Coder output.
    pub sealed: Bytes,
}

impl SealedBlock {
    /// Wrap coder output with its length prefix.
    #[inline]
    pub fn new(sealed: Bytes) -> Self {
        Self {
            prefix: seal_prefix(sealed.len()),
            sealed,
        }
    }

    /// Total size on the wire (prefix + sealed bytes).
    #[inline]
    pub fn size(&self) -> usize {
        SEAL_PREFIX_SIZE + self.sealed.len()
    }
}

/// Handle for submitting batches to the writer task.
pub struct WriterHandle {
    tx: mpsc::Sender<Vec<SealedBlock>>,
}

impl WriterHandle {
    /// Submit a batch without waiting.
    ///
    /// The channel holds a single batch, so this fails if the previous
    /// batch has not been picked up yet.
    pub fn submit(&self, batch: Vec<SealedBlock>) -> Result<()> {
        self.tx.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SessionError::Protocol("write already in flight".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => SessionError::NotConnected,
        })
    }
}

/// Spawn the writer task.
///
/// # Arguments
///
/// * `writer` - The transport's write half
/// * `stats` - Shared I/O counters
/// * `events` - The actor's event channel; one `WriteComplete` per batch
///
/// Dropping the returned handle closes the channel; the task then shuts the
/// write half down and exits.
pub fn spawn_writer_task<W>(
    writer: W,
    stats: Arc<IoStats>,
    events: mpsc::Sender<Event>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(writer_loop(rx, writer, stats, events));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Vec<SealedBlock>>,
    mut writer: W,
    stats: Arc<IoStats>,
    events: mpsc::Sender<Event>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(batch) = rx.recv().await {
        let size: usize = batch.iter().map(SealedBlock::size).sum();

        let in_flight = stats.begin_write();
        let result = write_batch(&mut writer, &batch).await;
        in_flight.finish(if result.is_ok() { size } else { 0 });

        trace!(blocks = batch.len(), bytes = size, ok = result.is_ok(), "Batch written");

        let failed = result.is_err();
        if events
            .send(Event::WriteComplete(result.map(|()| size)))
            .await
            .is_err()
            || failed
        {
            return Ok(());
        }
    }

    // Channel closed, clean shutdown
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of blocks using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[SealedBlock]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(batch.len() * 2);
    for block in batch {
        slices.push(IoSlice::new(&block.prefix));
        if !block.sealed.is_empty() {
            slices.push(IoSlice::new(&block.sealed));
        }
    }

    let total_size: usize = batch.iter().map(SealedBlock::size).sum();

    // Fast path: the whole batch fits in the kernel buffer
    let written = writer.write_vectored(&slices).await?;
    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }
    if written == 0 {
        return Err(write_zero());
    }

    // Slow path: partial write, continue with remaining data
    let mut total_written = written;
    while total_written < total_size {
        let remaining_slices = build_remaining_slices(batch, total_written);
        if remaining_slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining_slices).await?;
        if written == 0 {
            return Err(write_zero());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

fn write_zero() -> SessionError {
    SessionError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[SealedBlock], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for block in batch {
        let prefix_start = skipped;
        let prefix_end = skipped + SEAL_PREFIX_SIZE;
        if skip_bytes < prefix_end {
            let start_in_prefix = skip_bytes.saturating_sub(prefix_start);
            slices.push(IoSlice::new(&block.prefix[start_in_prefix..]));
        }
        skipped = prefix_end;

        if !block.sealed.is_empty() {
            let sealed_start = skipped;
            let sealed_end = skipped + block.sealed.len();
            if skip_bytes < sealed_end {
                let start_in_sealed = skip_bytes.saturating_sub(sealed_start);
                slices.push(IoSlice::new(&block.sealed[start_in_sealed..]));
            }
            skipped = sealed_end;
        }
    }

    slices
}
