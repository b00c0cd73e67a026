//! # Index Assignment
//!
//! Maps pages to slot ranges, then recomputes per-record slots.
//!
//! ```text
//! Full remap:   [assign all pages from 0] ──> parallel recompute(all)
//!
//! Incremental:  [assign new pages from used] ─┬─> parallel recompute(new)       ─┐
//!                                             └─> parallel recompute(reordered) ─┴─> combined
//! ```
//!
//! Page starts are only ever written by the single assignment job under the
//! map's write lock; recompute jobs take read locks and write disjoint
//! per-page record arrays.

use std::sync::Arc;

use strata_core::{JobHandle, JobPool, PageInfo};

use crate::allocation::AllocationTracker;
use crate::classify::Classification;
use crate::offsets::SharedOffsets;

/// Which assignment a cycle takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignPath {
    /// Reassign every page from slot 0.
    FullRemap,
    /// Assign new pages after `used`; keep every other range.
    Incremental,
}

impl AssignPath {
    /// Picks the path for this cycle.
    ///
    /// A full remap is needed when the pages no longer fit the allocation, or
    /// the new pages do not fit the unused tail.
    #[must_use]
    pub fn choose(tracker: &AllocationTracker, classification: &Classification) -> Self {
        if classification.total_capacity > tracker.allocated()
            || classification.new_capacity > tracker.unused()
        {
            Self::FullRemap
        } else {
            Self::Incremental
        }
    }
}

/// Clears the map, assigns every page sequentially, then recomputes every
/// record slot in parallel.
pub fn schedule_full_remap(
    pool: &JobPool,
    offsets: &SharedOffsets,
    pages: &Arc<[PageInfo]>,
    batch: usize,
) -> JobHandle {
    let assign_offsets = Arc::clone(offsets);
    let assign_pages = Arc::clone(pages);
    let assigned = pool.schedule(&[], move |_| {
        let mut map = assign_offsets.write();
        map.clear();
        let mut start = 0u32;
        for page in assign_pages.iter() {
            map.assign(page, start);
            start += page.capacity;
        }
    });

    let recompute_offsets = Arc::clone(offsets);
    let recompute_pages = Arc::clone(pages);
    pool.parallel_for(pages.len(), batch, &[assigned], move |_, range| {
        let map = recompute_offsets.read();
        for page in &recompute_pages[range] {
            map.recompute_records(page);
        }
    })
}

/// Assigns fresh ranges to new pages starting at `used`, then recomputes
/// record slots of new and reordered pages concurrently.
pub fn schedule_incremental(
    pool: &JobPool,
    offsets: &SharedOffsets,
    classification: &Classification,
    used: u64,
    batch: usize,
) -> JobHandle {
    let pages = &classification.pages;

    let assign_offsets = Arc::clone(offsets);
    let assign_pages = Arc::clone(pages);
    let new_pages = Arc::clone(&classification.new_pages);
    let assigned = if new_pages.is_empty() {
        JobHandle::completed()
    } else {
        // Allocation never exceeds u32 slots; checked by the orchestrator.
        let mut start = used as u32;
        pool.schedule(&[], move |_| {
            let mut map = assign_offsets.write();
            for &index in new_pages.iter() {
                let page = &assign_pages[index];
                map.assign(page, start);
                start += page.capacity;
            }
        })
    };

    let recompute_new = recompute_listed(pool, offsets, pages, &classification.new_pages, batch, &assigned);
    let recompute_reordered = recompute_listed(
        pool,
        offsets,
        pages,
        &classification.reordered_pages,
        batch,
        &assigned,
    );
    pool.combine(&[assigned, recompute_new, recompute_reordered])
}

fn recompute_listed(
    pool: &JobPool,
    offsets: &SharedOffsets,
    pages: &Arc<[PageInfo]>,
    listed: &Arc<[usize]>,
    batch: usize,
    assigned: &JobHandle,
) -> JobHandle {
    let offsets = Arc::clone(offsets);
    let pages = Arc::clone(pages);
    let job_listed = Arc::clone(listed);
    pool.parallel_for(listed.len(), batch, std::slice::from_ref(assigned), move |_, range| {
        let map = offsets.read();
        for &index in &job_listed[range] {
            map.recompute_records(&pages[index]);
        }
    })
}
