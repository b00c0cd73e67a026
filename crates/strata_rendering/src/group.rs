//! # Render Group
//!
//! Orchestrates one independently drawn group per cycle.
//!
//! ```text
//!            ┌───────────── EveryCycle-only ─────────────┐
//!            │                                           ▼
//!  Idle ──> Classified ──┬──> Remapping ────────────> Syncing ──> Drawable ──> Idle
//!   ▲                    └──> IncrementalAssigning ──────┘
//!   └─ empty group: no classification, no draw
//! ```
//!
//! Two joins per cycle: after classification (the remap decision needs the
//! totals) and before the draw (every sync handle plus the assignment handle).
//! Everything in between is scheduled with explicit dependencies.

#![allow(unsafe_code)]

use std::sync::Arc;

use strata_core::{AttributeKey, GroupKey, JobHandle, JobPool, PageInfo, PageStore};

use crate::allocation::AllocationTracker;
use crate::assign::{schedule_full_remap, schedule_incremental, AssignPath};
use crate::buffer::BufferAllocator;
use crate::classify::{classify, snapshot_pages};
use crate::config::StreamConfig;
use crate::error::{RenderError, RenderResult};
use crate::offsets::{PageOffsetMap, SharedOffsets};
use crate::property::{AttributeBinding, BufferBinding, PropertyBuffer, PropertySet, SyncRequest};
use crate::stats::{CyclePath, CycleStats};
use crate::sync_jobs::SyncContext;
use crate::system::GroupHandle;

/// Opaque material identity. `0` is the null material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

impl MaterialHandle {
    /// The null material; rejected at registration.
    pub const NULL: Self = Self(0);

    /// Returns true for the null material.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque mesh identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// Instanced draw issued at the end of a cycle.
#[derive(Debug)]
pub struct DrawCall<'a> {
    /// Group being drawn.
    pub group: GroupHandle,
    /// Material to bind.
    pub material: MaterialHandle,
    /// Mesh to instance.
    pub mesh: MeshHandle,
    /// Number of instances (records).
    pub instance_count: u32,
    /// Attribute and pointer buffers, sorted by binding slot.
    pub bindings: &'a [BufferBinding],
}

/// Receives draw calls.
pub trait DrawSink {
    /// Issues one instanced draw.
    fn draw(&mut self, call: &DrawCall<'_>);
}

impl<F: FnMut(&DrawCall<'_>)> DrawSink for F {
    fn draw(&mut self, call: &DrawCall<'_>) {
        self(call);
    }
}

/// Orchestrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// Between cycles.
    Idle,
    /// Classification joined.
    Classified,
    /// Full remap scheduled.
    Remapping,
    /// Incremental assignment scheduled.
    IncrementalAssigning,
    /// Sync jobs in flight.
    Syncing,
    /// Every handle joined; draw pending.
    Drawable,
}

impl GroupState {
    /// Whether `self -> next` is a legal transition. Any state may fall back
    /// to `Idle` when a cycle fails.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Classified | Self::Syncing)
                | (Self::Classified, Self::Remapping | Self::IncrementalAssigning)
                | (Self::Remapping | Self::IncrementalAssigning, Self::Syncing)
                | (Self::Syncing, Self::Drawable)
                | (_, Self::Idle)
        )
    }
}

/// Assignment outcome handed to the sync phase.
struct CyclePlan {
    assignment: JobHandle,
    request: SyncRequest,
    records: u64,
}

/// One registered group and everything it owns.
pub struct RenderGroup {
    handle: GroupHandle,
    label: String,
    material: MaterialHandle,
    mesh: MeshHandle,
    source: GroupKey,
    initial_capacity: u64,
    tracker: AllocationTracker,
    offsets: SharedOffsets,
    properties: PropertySet,
    state: GroupState,
    last_version: u64,
    force_remap: bool,
}

impl RenderGroup {
    /// Creates a group with buffers of `initial_capacity` slots.
    ///
    /// # Errors
    ///
    /// Propagates allocator failures.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        handle: GroupHandle,
        material: MaterialHandle,
        mesh: MeshHandle,
        source: GroupKey,
        attributes: &[AttributeBinding],
        initial_capacity: u64,
        capacity_step: u64,
        allocator: &dyn BufferAllocator,
    ) -> RenderResult<Self> {
        let label = format!("group{}.{}", handle.index(), handle.generation());
        let capacity = slot_count(initial_capacity)?;
        let properties = PropertySet::new(allocator, &label, attributes, capacity)?;

        Ok(Self {
            handle,
            label,
            material,
            mesh,
            source,
            initial_capacity,
            tracker: AllocationTracker::new(initial_capacity, capacity_step),
            offsets: PageOffsetMap::shared(),
            properties,
            state: GroupState::Idle,
            last_version: 0,
            force_remap: false,
        })
    }

    /// Handle of this group.
    #[must_use]
    pub const fn handle(&self) -> GroupHandle {
        self.handle
    }

    /// Material handle.
    #[must_use]
    pub const fn material(&self) -> MaterialHandle {
        self.material
    }

    /// Mesh handle.
    #[must_use]
    pub const fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    /// Store partition drawn by this group.
    #[must_use]
    pub const fn source(&self) -> GroupKey {
        self.source
    }

    /// Current orchestrator state. `Idle` between cycles.
    #[must_use]
    pub const fn state(&self) -> GroupState {
        self.state
    }

    /// Slot accounting.
    #[must_use]
    pub const fn tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    /// Page ranges.
    #[must_use]
    pub fn offsets(&self) -> &SharedOffsets {
        &self.offsets
    }

    /// Buffers.
    #[must_use]
    pub const fn properties(&self) -> &PropertySet {
        &self.properties
    }

    /// Buffer of one attribute.
    #[must_use]
    pub fn buffer(&self, key: AttributeKey) -> Option<&PropertyBuffer> {
        self.properties.find(key)
    }

    /// Store version the destination buffers reflect.
    #[must_use]
    pub const fn last_version(&self) -> u64 {
        self.last_version
    }

    fn advance(&mut self, next: GroupState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        tracing::trace!(group = %self.label, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Shrinks back to the initial allocation and forgets every range.
    /// The next cycle performs a full remap.
    ///
    /// # Errors
    ///
    /// Propagates allocator failures.
    pub(crate) fn reset_allocation(&mut self, allocator: &dyn BufferAllocator) -> RenderResult<()> {
        self.tracker.reset(self.initial_capacity);
        self.offsets.write().clear();
        self.properties
            .reallocate(allocator, slot_count(self.initial_capacity)?)?;
        self.force_remap = true;
        tracing::debug!(group = %self.label, allocated = self.initial_capacity, "allocation reset");
        Ok(())
    }

    /// Runs one full cycle: classify, assign, sync, join, draw.
    ///
    /// On failure the group returns to `Idle`, keeps its last observed
    /// version and performs a full remap next cycle.
    ///
    /// # Errors
    ///
    /// Returns classification or sync job panics, missing attributes and
    /// stride mismatches, and allocator failures.
    pub(crate) fn run_cycle<S: PageStore>(
        &mut self,
        pool: &JobPool,
        allocator: &dyn BufferAllocator,
        config: &StreamConfig,
        store: &Arc<S>,
        sink: &mut dyn DrawSink,
    ) -> RenderResult<CycleStats> {
        let result = self.cycle(pool, allocator, config, store, sink);
        if result.is_err() {
            self.state = GroupState::Idle;
            self.force_remap = true;
        }
        result
    }

    fn cycle<S: PageStore>(
        &mut self,
        pool: &JobPool,
        allocator: &dyn BufferAllocator,
        config: &StreamConfig,
        store: &Arc<S>,
        sink: &mut dyn DrawSink,
    ) -> RenderResult<CycleStats> {
        debug_assert_eq!(self.state, GroupState::Idle, "cycles must not overlap");
        let observed = store.version();
        let pages = snapshot_pages(store.as_ref(), self.source);

        let mut stats = CycleStats {
            group: Some(self.handle),
            pages: pages.len(),
            ..CycleStats::default()
        };

        if pages.is_empty() {
            self.last_version = observed;
            stats.allocated = self.tracker.allocated();
            stats.used = self.tracker.used();
            return Ok(stats);
        }

        let plan = if self.properties.needs_classification() {
            self.plan_paged(pool, allocator, config, &pages, &mut stats)?
        } else {
            self.plan_per_record(allocator, &pages, &mut stats)?
        };

        self.advance(GroupState::Syncing);
        let ctx = Arc::new(SyncContext::new(
            pool,
            Arc::clone(store),
            pages,
            Arc::clone(&self.offsets),
            config.zero_fill_missing,
            config.batch_size,
        ));

        self.properties.begin_write();
        let synced = self
            .properties
            .schedule_sync(pool, &ctx, &plan.request, &[plan.assignment]);
        let joined = synced.wait();
        self.properties.end_write();

        joined?;
        if let Some(error) = ctx.errors.take() {
            return Err(error);
        }

        // SAFETY: `synced` covers every job holding `ctx` and was joined above.
        let (bytes, copied) = unsafe { (ctx.bytes.total(), ctx.pages_copied.total()) };
        stats.bytes_written = bytes;
        stats.pages_copied = copied;
        stats.records = plan.records;
        stats.allocated = self.tracker.allocated();
        stats.used = self.tracker.used();

        self.advance(GroupState::Drawable);
        sink.draw(&DrawCall {
            group: self.handle,
            material: self.material,
            mesh: self.mesh,
            // Records never exceed allocated slots, which fit in u32.
            instance_count: plan.records as u32,
            bindings: self.properties.bindings(),
        });
        self.advance(GroupState::Idle);
        self.last_version = observed;

        Ok(stats)
    }

    fn plan_paged(
        &mut self,
        pool: &JobPool,
        allocator: &dyn BufferAllocator,
        config: &StreamConfig,
        pages: &Arc<[PageInfo]>,
        stats: &mut CycleStats,
    ) -> RenderResult<CyclePlan> {
        let since = self.last_version;
        let classification = classify(pool, Arc::clone(pages), &self.offsets, since, config.batch_size)?;
        self.advance(GroupState::Classified);

        stats.new_pages = classification.new_pages.len();
        stats.reordered_pages = classification.reordered_pages.len();
        stats.structure_changed = classification.structure_changed(since);

        let chosen = AssignPath::choose(&self.tracker, &classification);
        let path = if self.force_remap { AssignPath::FullRemap } else { chosen };

        let assignment = match path {
            AssignPath::FullRemap => {
                self.advance(GroupState::Remapping);
                if chosen == AssignPath::FullRemap {
                    self.grow(allocator, classification.total_capacity)?;
                    stats.grew = true;
                }
                let handle = schedule_full_remap(pool, &self.offsets, pages, config.batch_size);
                self.tracker.commit(classification.total_capacity);
                self.force_remap = false;
                stats.path = CyclePath::FullRemap;
                tracing::debug!(
                    group = %self.label,
                    pages = pages.len(),
                    used = classification.total_capacity,
                    allocated = self.tracker.allocated(),
                    "full remap"
                );
                handle
            }
            AssignPath::Incremental => {
                self.advance(GroupState::IncrementalAssigning);
                let used = self.tracker.used();
                let handle = schedule_incremental(pool, &self.offsets, &classification, used, config.batch_size);
                self.tracker.commit(used + classification.new_capacity);
                stats.path = CyclePath::Incremental;
                handle
            }
        };
        self.tracker.verify(classification.total_capacity);

        Ok(CyclePlan {
            assignment,
            request: SyncRequest {
                full: path == AssignPath::FullRemap,
                since,
                touched: classification.touched_pages(),
            },
            records: classification.record_count,
        })
    }

    fn plan_per_record(
        &mut self,
        allocator: &dyn BufferAllocator,
        pages: &Arc<[PageInfo]>,
        stats: &mut CycleStats,
    ) -> RenderResult<CyclePlan> {
        let records: u64 = pages.iter().map(|p| u64::from(p.len)).sum();
        if records > self.tracker.allocated() {
            self.grow(allocator, records)?;
            stats.grew = true;
        }
        self.tracker.commit(records);
        self.tracker.verify(records);

        stats.path = CyclePath::PerRecordOnly;
        stats.structure_changed = pages.iter().any(|p| p.order_version > self.last_version);

        Ok(CyclePlan {
            assignment: JobHandle::completed(),
            request: SyncRequest {
                full: true,
                since: self.last_version,
                touched: Arc::from(Vec::new()),
            },
            records,
        })
    }

    /// Reallocates every buffer to fit `needed`, then grows the tracker.
    ///
    /// The tracker is untouched when any allocation fails, so `allocated`
    /// never exceeds what every buffer holds.
    fn grow(&mut self, allocator: &dyn BufferAllocator, needed: u64) -> RenderResult<()> {
        let target = self.tracker.next_allocation(needed);
        self.properties.reallocate(allocator, slot_count(target)?)?;
        let allocated = self.tracker.grow(needed);
        tracing::debug!(group = %self.label, needed, allocated, "buffers reallocated");
        Ok(())
    }
}

/// Slot counts must stay addressable by the u32 pointer buffer.
fn slot_count(slots: u64) -> RenderResult<usize> {
    u32::try_from(slots)
        .ok()
        .and_then(|s| usize::try_from(s).ok())
        .ok_or(RenderError::SlotOverflow(slots))
}
