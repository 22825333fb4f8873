//! In-flight frame budget — the sole backpressure mechanism.
//!
//! There is no frame queue: when the budget is saturated the sampler drops
//! frames at the source, bounding end-to-end latency at the cost of
//! temporal completeness.

use std::sync::atomic::{AtomicU32, Ordering};

/// Bounded counter of frames sent but not yet acknowledged.
///
/// Invariant: `0 <= pending <= max` under any interleaving of acquires and
/// releases. Over-release (a frame producing several acknowledgement-class
/// events) saturates at zero rather than going negative.
pub struct FrameBudget {
    pending: AtomicU32,
    max: u32,
}

impl FrameBudget {
    pub fn new(max: u32) -> Self {
        Self {
            pending: AtomicU32::new(0),
            max,
        }
    }

    /// Reserve one slot. Returns false when the budget is saturated; the
    /// caller must drop the frame, not queue it.
    pub fn try_acquire(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < self.max).then_some(cur + 1)
            })
            .is_ok()
    }

    /// Release one slot on any acknowledgement-class event.
    pub fn release(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur > 0).then(|| cur - 1)
            });
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}
