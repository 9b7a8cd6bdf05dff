//! I/O counters.
//!
//! The session keeps at most one read and one write in flight; these
//! counters record that, along with totals for diagnostics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Live I/O counters shared by the reader and writer tasks.
#[derive(Debug, Default)]
pub struct IoStats {
    reads_in_flight: AtomicUsize,
    writes_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
    reads_completed: AtomicU64,
    writes_completed: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

/// Point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoStatsSnapshot {
    /// Reads currently outstanding.
    pub reads_in_flight: usize,
    /// Writes currently outstanding.
    pub writes_in_flight: usize,
    /// Most reads ever outstanding at once.
    pub max_reads_in_flight: usize,
    /// Most writes ever outstanding at once.
    pub max_writes_in_flight: usize,
    /// Finished reads.
    pub reads_completed: u64,
    /// Finished writes.
    pub writes_completed: u64,
    /// Bytes received.
    pub bytes_read: u64,
    /// Bytes sent.
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// One read or write in flight.
///
/// Dropping the guard takes the operation off the in-flight count, also
/// when its task is aborted mid-operation. Only operations passed to
/// [`finish`](InFlight::finish) count as completed.
#[derive(Debug)]
pub(crate) struct InFlight<'a> {
    stats: &'a IoStats,
    direction: Direction,
    transferred: Option<usize>,
}

impl InFlight<'_> {
    /// Record the operation as completed with `bytes` transferred.
    pub(crate) fn finish(mut self, bytes: usize) {
        self.transferred = Some(bytes);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let stats = self.stats;
        let (in_flight, completed, total) = match self.direction {
            Direction::Read => (
                &stats.reads_in_flight,
                &stats.reads_completed,
                &stats.bytes_read,
            ),
            Direction::Write => (
                &stats.writes_in_flight,
                &stats.writes_completed,
                &stats.bytes_written,
            ),
        };

        in_flight.fetch_sub(1, Ordering::AcqRel);
        if let Some(bytes) = self.transferred {
            completed.fetch_add(1, Ordering::Relaxed);
            total.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }
}

impl IoStats {
    pub(crate) fn begin_read(&self) -> InFlight<'_> {
        let now = self.reads_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_reads_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlight {
            stats: self,
            direction: Direction::Read,
            transferred: None,
        }
    }

    pub(crate) fn begin_write(&self) -> InFlight<'_> {
        let now = self.writes_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_writes_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlight {
            stats: self,
            direction: Direction::Write,
            transferred: None,
        }
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            reads_in_flight: self.reads_in_flight.load(Ordering::Acquire),
            writes_in_flight: self.writes_in_flight.load(Ordering::Acquire),
            max_reads_in_flight: self.max_reads_in_flight.load(Ordering::Acquire),
            max_writes_in_flight: self.max_writes_in_flight.load(Ordering::Acquire),
            reads_completed: self.reads_completed.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}
