//! Per-cycle and per-frame statistics.

use crate::error::{RenderError, RenderResult};
use crate::system::GroupHandle;

/// Which path a group's cycle took.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CyclePath {
    /// The group had no pages; nothing was copied or drawn.
    #[default]
    Skipped,
    /// Only `EveryCycle` attributes; classification was bypassed.
    PerRecordOnly,
    /// Existing ranges kept; new pages appended.
    Incremental,
    /// Every page reassigned.
    FullRemap,
}

/// What one group's cycle did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// The group.
    pub group: Option<GroupHandle>,
    /// Path taken.
    pub path: CyclePath,
    /// Pages observed.
    pub pages: usize,
    /// Pages classified new.
    pub new_pages: usize,
    /// Pages classified reordered.
    pub reordered_pages: usize,
    /// Records drawn.
    pub records: u64,
    /// Bytes handed to destination buffers.
    pub bytes_written: u64,
    /// Page columns copied.
    pub pages_copied: u64,
    /// Slots allocated after the cycle.
    pub allocated: u64,
    /// Slots covered by page ranges after the cycle.
    pub used: u64,
    /// Whether the buffers were reallocated.
    pub grew: bool,
    /// Whether pages were created, emptied, filled or moved since last cycle.
    pub structure_changed: bool,
}

/// Sum over every group of one `update`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Per-group results in handle order.
    pub groups: Vec<CycleStats>,
    /// Draw calls issued.
    pub draws: usize,
    /// Bytes handed to destination buffers.
    pub bytes_written: u64,
    /// Groups that took a full remap.
    pub full_remaps: usize,
    /// Groups whose cycle failed, in handle order. They drew nothing.
    pub failures: Vec<(GroupHandle, RenderError)>,
}

impl FrameStats {
    pub(crate) fn push(&mut self, cycle: CycleStats) {
        if cycle.path != CyclePath::Skipped {
            self.draws += 1;
        }
        if cycle.path == CyclePath::FullRemap {
            self.full_remaps += 1;
        }
        self.bytes_written += cycle.bytes_written;
        self.groups.push(cycle);
    }

    pub(crate) fn fail(&mut self, group: GroupHandle, error: RenderError) {
        self.failures.push((group, error));
    }

    /// The frame, or the first group failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest-handle group that failed.
    pub fn into_result(mut self) -> RenderResult<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures.swap_remove(0).1)
        }
    }
}
