// src/core/connection/backpressure.rs

use crate::core::ClientError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Counts bytes that were accepted for sending but not yet written to the socket.
///
/// Once the count goes above the high-water mark, new submissions are rejected
/// with `Backpressure` until it drains to the low-water mark. Commands accepted
/// before the crossing are always kept.
#[derive(Debug)]
pub struct OutboundGauge {
    bytes: AtomicUsize,
    engaged: AtomicBool,
    high_watermark: usize,
    low_watermark: usize,
}

impl OutboundGauge {
    pub fn new(high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            bytes: AtomicUsize::new(0),
            engaged: AtomicBool::new(false),
            high_watermark,
            low_watermark,
        }
    }

    /// Accounts for a new submission, or rejects it while backpressure is engaged.
    pub fn try_acquire(&self, n: usize) -> Result<(), ClientError> {
        if self.engaged.load(Ordering::Acquire) {
            return Err(ClientError::Backpressure);
        }
        self.force_acquire(n);
        Ok(())
    }

    /// Accounts for bytes that must be sent regardless of the limit (replays and requeues).
    pub fn force_acquire(&self, n: usize) {
        let total = self.bytes.fetch_add(n, Ordering::AcqRel) + n;
        if total > self.high_watermark && !self.engaged.swap(true, Ordering::AcqRel) {
            warn!(
                "Outbound buffer at {} bytes exceeds the high-water mark ({}); rejecting new commands.",
                total, self.high_watermark
            );
        }
    }

    /// Releases bytes that were written, or that belong to commands that will never be written.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let previous = self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| Some(b.saturating_sub(n)))
            .unwrap_or_default();
        let total = previous.saturating_sub(n);
        if total <= self.low_watermark && self.engaged.swap(false, Ordering::AcqRel) {
            debug!("Outbound buffer drained to {} bytes; accepting commands again.", total);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}
