//! # Sync Jobs
//!
//! One generic byte copy, parameterized by stride, in four scheduling
//! variants:
//!
//! | Variant              | Pages visited                    | Destination slot          |
//! |----------------------|----------------------------------|---------------------------|
//! | `sync_full_pages`    | all                              | page start + row          |
//! | `sync_changed_pages` | column or order advanced, or new | page start + row          |
//! | `sync_listed_pages`  | given indices                    | page start + row          |
//! | `sync_per_record`    | all                              | first global index + row  |
//!
//! `sync_pointers` fills the instance-id → slot indirection buffer.
//!
//! Every variant writes whole page columns with one `write` call. Problems
//! found by a job are parked in the context's [`ErrorSlot`] and surface after
//! the join.

use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{AttributeKey, JobHandle, JobPool, PageInfo, PageStore, WorkerContext, WorkerCounter};

use crate::buffer::AttributeBuffer;
use crate::error::RenderError;
use crate::offsets::SharedOffsets;

/// First error reported by any job of a cycle.
#[derive(Default)]
pub struct ErrorSlot(Mutex<Option<RenderError>>);

impl ErrorSlot {
    /// Keeps `error` unless an earlier one was recorded.
    pub fn record(&self, error: RenderError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// Takes the recorded error.
    pub fn take(&self) -> Option<RenderError> {
        self.0.lock().take()
    }
}

/// Everything a cycle's sync jobs read.
pub struct SyncContext<S> {
    /// Store snapshot source; not mutated while the cycle runs.
    pub store: Arc<S>,
    /// Pages of the group in iteration order.
    pub pages: Arc<[PageInfo]>,
    /// Global index of each page's first record (prefix sum of `len`).
    pub first_index: Arc<[u32]>,
    /// Assigned page ranges.
    pub offsets: SharedOffsets,
    /// Write zeros for missing attributes instead of failing.
    pub zero_fill: bool,
    /// Pages per job.
    pub batch: usize,
    /// First failure.
    pub errors: ErrorSlot,
    /// Bytes handed to destination buffers.
    pub bytes: WorkerCounter,
    /// Page columns copied.
    pub pages_copied: WorkerCounter,
}

impl<S: PageStore> SyncContext<S> {
    /// Builds the context for one cycle.
    #[must_use]
    pub fn new(
        pool: &JobPool,
        store: Arc<S>,
        pages: Arc<[PageInfo]>,
        offsets: SharedOffsets,
        zero_fill: bool,
        batch: usize,
    ) -> Self {
        let first_index = first_record_indices(&pages);
        Self {
            store,
            pages,
            first_index,
            offsets,
            zero_fill,
            batch,
            errors: ErrorSlot::default(),
            bytes: WorkerCounter::new(pool),
            pages_copied: WorkerCounter::new(pool),
        }
    }

    /// Copies one page column to `slot`.
    fn copy_page(
        &self,
        worker: &WorkerContext,
        buffer: &dyn AttributeBuffer,
        key: AttributeKey,
        page: &PageInfo,
        slot: usize,
    ) {
        let len = page.len as usize;
        if len == 0 {
            return;
        }

        match self.store.attribute_data(page.id, key) {
            Some(data) if data.stride != buffer.stride() => {
                self.errors.record(RenderError::StrideMismatch {
                    key,
                    store: data.stride,
                    registered: buffer.stride(),
                });
            }
            Some(data) => {
                buffer.write(slot, data.bytes);
                self.bytes.add(worker, data.bytes.len() as u64);
                self.pages_copied.add(worker, 1);
            }
            None if self.zero_fill => {
                let zeros = vec![0u8; len * buffer.stride()];
                buffer.write(slot, &zeros);
                self.bytes.add(worker, zeros.len() as u64);
                self.pages_copied.add(worker, 1);
            }
            None => self.errors.record(RenderError::MissingAttribute { page: page.id, key }),
        }
    }

    /// Copies one page column to its assigned range.
    fn copy_to_range(&self, worker: &WorkerContext, buffer: &dyn AttributeBuffer, key: AttributeKey, page: &PageInfo) {
        let entry = self.offsets.read().entry(page);
        if entry.initialized {
            self.copy_page(worker, buffer, key, page, entry.start as usize);
        } else {
            tracing::error!(slot = page.id.slot, "page has no assigned range at sync time");
        }
    }

    fn changed_since(&self, key: AttributeKey, page: &PageInfo, since: u64) -> bool {
        page.order_version > since
            || self
                .store
                .attribute_data(page.id, key)
                .is_some_and(|data| data.version > since)
    }
}

/// Prefix sum of occupied counts.
#[must_use]
pub fn first_record_indices(pages: &[PageInfo]) -> Arc<[u32]> {
    pages
        .iter()
        .scan(0u32, |next, page| {
            let first = *next;
            *next += page.len;
            Some(first)
        })
        .collect()
}

/// Copies every page into its assigned range.
pub fn sync_full_pages<S: PageStore>(
    pool: &JobPool,
    ctx: &Arc<SyncContext<S>>,
    buffer: Arc<dyn AttributeBuffer>,
    key: AttributeKey,
    deps: &[JobHandle],
) -> JobHandle {
    let ctx_job = Arc::clone(ctx);
    pool.parallel_for(ctx.pages.len(), ctx.batch, deps, move |worker, range| {
        for page in &ctx_job.pages[range] {
            ctx_job.copy_to_range(worker, buffer.as_ref(), key, page);
        }
    })
}

/// Copies pages whose column version or order version advanced past `since`,
/// plus the `touched` positions (new or reordered pages), which hold fresh
/// ranges whatever their versions say.
pub fn sync_changed_pages<S: PageStore>(
    pool: &JobPool,
    ctx: &Arc<SyncContext<S>>,
    buffer: Arc<dyn AttributeBuffer>,
    key: AttributeKey,
    since: u64,
    touched: Arc<[usize]>,
    deps: &[JobHandle],
) -> JobHandle {
    let ctx_job = Arc::clone(ctx);
    pool.parallel_for(ctx.pages.len(), ctx.batch, deps, move |worker, range| {
        for index in range {
            let page = &ctx_job.pages[index];
            if touched.binary_search(&index).is_ok() || ctx_job.changed_since(key, page, since) {
                ctx_job.copy_to_range(worker, buffer.as_ref(), key, page);
            }
        }
    })
}

/// Copies the pages at the given iteration positions.
pub fn sync_listed_pages<S: PageStore>(
    pool: &JobPool,
    ctx: &Arc<SyncContext<S>>,
    buffer: Arc<dyn AttributeBuffer>,
    key: AttributeKey,
    listed: Arc<[usize]>,
    deps: &[JobHandle],
) -> JobHandle {
    let ctx_job = Arc::clone(ctx);
    pool.parallel_for(listed.len(), ctx.batch, deps, move |worker, range| {
        for &index in &listed[range] {
            ctx_job.copy_to_range(worker, buffer.as_ref(), key, &ctx_job.pages[index]);
        }
    })
}

/// Copies every record to its global record index, ignoring page ranges.
pub fn sync_per_record<S: PageStore>(
    pool: &JobPool,
    ctx: &Arc<SyncContext<S>>,
    buffer: Arc<dyn AttributeBuffer>,
    key: AttributeKey,
    deps: &[JobHandle],
) -> JobHandle {
    let ctx_job = Arc::clone(ctx);
    pool.parallel_for(ctx.pages.len(), ctx.batch, deps, move |worker, range| {
        for index in range {
            let first = ctx_job.first_index[index] as usize;
            ctx_job.copy_page(worker, buffer.as_ref(), key, &ctx_job.pages[index], first);
        }
    })
}

/// Writes each record's destination slot at its global record index.
pub fn sync_pointers<S: PageStore>(
    pool: &JobPool,
    ctx: &Arc<SyncContext<S>>,
    buffer: Arc<dyn AttributeBuffer>,
    deps: &[JobHandle],
) -> JobHandle {
    let ctx_job = Arc::clone(ctx);
    pool.parallel_for(ctx.pages.len(), ctx.batch, deps, move |worker, range| {
        for index in range {
            let page = &ctx_job.pages[index];
            let slots = ctx_job.offsets.read().record_slots(page.id, page.len as usize);
            match slots {
                Some(slots) if !slots.is_empty() => {
                    let bytes: &[u8] = bytemuck::cast_slice(&slots);
                    buffer.write(ctx_job.first_index[index] as usize, bytes);
                    ctx_job.bytes.add(worker, bytes.len() as u64);
                }
                Some(_) => {}
                None => tracing::error!(slot = page.id.slot, "page has no record offsets at sync time"),
            }
        }
    })
}
