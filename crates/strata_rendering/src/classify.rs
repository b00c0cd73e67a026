//! # Page Classification
//!
//! One parallel pass over a group's pages:
//!
//! ```text
//! page ──> capacity, len ──────────────────────> counters (sum)
//!      ──> order_version ──────────────────────> newest (max)
//!      ──> no range for this identity? ── yes ──> new list
//!                                     └── no ──> order_version > since? ──> reordered list
//! ```
//!
//! A page is never both new and reordered. The orchestrator joins this pass
//! synchronously: the remap decision needs the totals.

#![allow(unsafe_code)]

use std::sync::Arc;

use strata_core::{
    GroupKey, JobPool, PageInfo, PageStore, WorkerCounter, WorkerList, WorkerReducer,
};

use crate::error::RenderResult;
use crate::offsets::SharedOffsets;

/// Aggregated result of one classification pass.
#[derive(Clone, Debug)]
pub struct Classification {
    /// Pages in iteration order, as observed at cycle start.
    pub pages: Arc<[PageInfo]>,
    /// Sum of page capacities.
    pub total_capacity: u64,
    /// Sum of capacities of pages without an assigned range.
    pub new_capacity: u64,
    /// Sum of occupied counts.
    pub record_count: u64,
    /// Positions of new pages, ascending.
    pub new_pages: Arc<[usize]>,
    /// Positions of reordered pages, ascending.
    pub reordered_pages: Arc<[usize]>,
    /// Largest page order version seen.
    pub newest_order_version: Option<u64>,
}

impl Classification {
    /// New and reordered positions merged, ascending.
    #[must_use]
    pub fn touched_pages(&self) -> Arc<[usize]> {
        let mut touched: Vec<usize> = self
            .new_pages
            .iter()
            .chain(self.reordered_pages.iter())
            .copied()
            .collect();
        touched.sort_unstable();
        touched.into()
    }

    /// Whether any page was created, filled, emptied or moved after `since`.
    #[must_use]
    pub fn structure_changed(&self, since: u64) -> bool {
        !self.new_pages.is_empty() || self.newest_order_version.is_some_and(|v| v > since)
    }
}

/// Reads a group's pages in iteration order.
#[must_use]
pub fn snapshot_pages<S: PageStore + ?Sized>(store: &S, group: GroupKey) -> Arc<[PageInfo]> {
    (0..store.page_count(group))
        .filter_map(|order| store.page_at(group, order))
        .collect()
}

struct Accumulators {
    total_capacity: WorkerCounter,
    new_capacity: WorkerCounter,
    records: WorkerCounter,
    newest: WorkerReducer<u64>,
    new_pages: WorkerList<usize>,
    reordered_pages: WorkerList<usize>,
}

/// Classifies `pages` against the offset map and blocks until done.
///
/// # Errors
///
/// Returns an error if a classification job panicked.
pub fn classify(
    pool: &JobPool,
    pages: Arc<[PageInfo]>,
    offsets: &SharedOffsets,
    since: u64,
    batch: usize,
) -> RenderResult<Classification> {
    let acc = Arc::new(Accumulators {
        total_capacity: WorkerCounter::new(pool),
        new_capacity: WorkerCounter::new(pool),
        records: WorkerCounter::new(pool),
        newest: WorkerReducer::max(pool),
        new_pages: WorkerList::new(pool),
        reordered_pages: WorkerList::new(pool),
    });

    let job_acc = Arc::clone(&acc);
    let job_pages = Arc::clone(&pages);
    let job_offsets = Arc::clone(offsets);
    pool.parallel_for(pages.len(), batch, &[], move |ctx, range| {
        let map = job_offsets.read();
        for index in range {
            let page = &job_pages[index];
            job_acc.total_capacity.add(ctx, u64::from(page.capacity));
            job_acc.records.add(ctx, u64::from(page.len));
            job_acc.newest.account(ctx, page.order_version);

            if !map.entry(page).initialized {
                job_acc.new_capacity.add(ctx, u64::from(page.capacity));
                job_acc.new_pages.push(ctx, index);
            } else if page.order_version > since {
                job_acc.reordered_pages.push(ctx, index);
            }
        }
    })
    .wait()?;

    // SAFETY: the parallel loop above was joined; no job writes `acc` anymore.
    let (totals, mut new_pages, mut reordered_pages, newest) = unsafe {
        (
            (
                acc.total_capacity.total(),
                acc.new_capacity.total(),
                acc.records.total(),
            ),
            acc.new_pages.drain(),
            acc.reordered_pages.drain(),
            acc.newest.value(),
        )
    };
    new_pages.sort_unstable();
    reordered_pages.sort_unstable();

    let (total_capacity, new_capacity, record_count) = totals;
    tracing::trace!(
        pages = pages.len(),
        total_capacity,
        new_capacity,
        new = new_pages.len(),
        reordered = reordered_pages.len(),
        "classified"
    );

    Ok(Classification {
        pages,
        total_capacity,
        new_capacity,
        record_count,
        new_pages: new_pages.into(),
        reordered_pages: reordered_pages.into(),
        newest_order_version: newest,
    })
}
