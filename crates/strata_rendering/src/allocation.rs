//! # Allocation Tracker
//!
//! Slot accounting for one render group's destination buffers.
//!
//! ```text
//! 0                    used            allocated
//! ├─ page ranges ───────┤──── unused ────┤
//! ```
//!
//! `allocated` only grows; it returns to a smaller value through an explicit
//! [`AllocationTracker::reset`] and nothing else.

/// `allocated` / `used` slot counters plus the growth step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationTracker {
    allocated: u64,
    used: u64,
    step: u64,
}

impl AllocationTracker {
    /// Creates a tracker with `initial` allocated slots.
    #[must_use]
    pub const fn new(initial: u64, step: u64) -> Self {
        Self {
            allocated: initial,
            used: 0,
            step,
        }
    }

    /// Slots the destination buffers hold.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Slots covered by assigned page ranges.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Minimum growth per resize.
    #[inline]
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// `allocated - used`.
    #[inline]
    #[must_use]
    pub const fn unused(&self) -> u64 {
        self.allocated.saturating_sub(self.used)
    }

    /// The allocation [`grow`](Self::grow) would reach for `needed` slots,
    /// without changing the tracker.
    #[inline]
    #[must_use]
    pub const fn next_allocation(&self, needed: u64) -> u64 {
        let shortfall = needed.saturating_sub(self.allocated);
        let step = if self.step > shortfall { self.step } else { shortfall };
        self.allocated + step
    }

    /// Grows so that `needed` slots fit: `allocated += max(step, needed - allocated)`.
    ///
    /// Returns the new allocation. Always grows by at least `step`.
    pub fn grow(&mut self, needed: u64) -> u64 {
        self.allocated = self.next_allocation(needed);
        tracing::debug!(needed, allocated = self.allocated, "allocation grown");
        self.allocated
    }

    /// Records the slot count covered after index assignment.
    #[inline]
    pub fn commit(&mut self, used: u64) {
        self.used = used;
    }

    /// Explicit reset: forget every range and shrink to `initial`.
    pub fn reset(&mut self, initial: u64) {
        self.allocated = initial;
        self.used = 0;
    }

    /// Debug-only consistency check after index assignment.
    ///
    /// `needed` is the capacity the current pages require.
    #[inline]
    pub fn verify(&self, needed: u64) {
        debug_assert!(
            self.used <= self.allocated,
            "used {} exceeds allocated {}",
            self.used,
            self.allocated
        );
        debug_assert!(self.used >= needed, "used {} below required {needed}", self.used);
        debug_assert!(
            self.allocated >= needed,
            "allocated {} below required {needed}",
            self.allocated
        );
    }
}
