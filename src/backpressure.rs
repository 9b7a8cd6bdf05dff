//! Backpressure on the outbound packet queue.
//!
//! Producers may call `send` from any task while the wire drains at the
//! peer's pace. The [`BackpressureController`] counts packets queued but not
//! yet written and puts a high-water mark on that count:
//!
//! - `Session::send` uses [`try_reserve`](BackpressureController::try_reserve)
//!   and fails with `BackpressureTimeout` at the mark
//! - `Session::send_async` uses [`reserve`](BackpressureController::reserve)
//!   and waits for room up to the configured timeout
//! - control packets take no slot, so Pong and Disconnect always get out
//!
//! # Configuration
//!
//! - `max_pending`: Maximum number of queued packets (default: 1024)
//! - Timeout: How long `reserve` waits for room (default: 5s)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SessionError};

/// Default maximum queued packets before backpressure kicks in.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default backpressure timeout (how long to wait for space to become available).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between backpressure checks.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Counts queued outbound packets against a high-water mark.
///
/// Lock-free; clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    /// Current pending packet count.
    pending: Arc<AtomicUsize>,
    /// Maximum allowed pending packets.
    max_pending: usize,
    /// Timeout for waiting on backpressure.
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with the default timeout.
    pub fn new(max_pending: usize) -> Self {
        Self::with_timeout(max_pending, DEFAULT_TIMEOUT)
    }

    /// Create a controller with custom timeout.
    pub fn with_timeout(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
            timeout,
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Try to reserve a slot without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` if at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|_| SessionError::BackpressureTimeout)
    }

    /// Reserve a slot, waiting if necessary.
    ///
    /// Returns `Err(BackpressureTimeout)` if timeout is reached.
    pub async fn reserve(&self) -> Result<()> {
        if self.try_reserve().is_ok() {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;

            if self.try_reserve().is_ok() {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(SessionError::BackpressureTimeout);
            }
        }
    }

    /// Release a slot (called after the packet is written).
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release multiple slots at once (for batch writes).
    #[inline]
    pub fn release_many(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }

    /// Reset the pending count; only used when the queue is discarded.
    pub fn reset(&self) {
        self.pending.store(0, Ordering::Release);
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}
