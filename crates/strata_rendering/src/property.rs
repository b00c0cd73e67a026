//! # Property Buffers
//!
//! One destination buffer per attribute, each with a resync policy, grouped
//! into a [`PropertySet`] per render group.
//!
//! | Policy           | Full remap / growth | Incremental cycle                |
//! |------------------|---------------------|----------------------------------|
//! | `ChangeTracked`  | all pages           | pages whose data or order moved  |
//! | `EveryCycle`     | every record        | every record                     |
//! | `OnceOnCreation` | all pages           | new and reordered pages only     |
//!
//! Groups with a `ChangeTracked` or `OnceOnCreation` attribute also get a u32
//! pointer buffer mapping draw-instance id to attribute slot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{Attribute, AttributeKey, JobHandle, JobPool, PageStore};

use crate::buffer::{AttributeBuffer, BufferAllocator};
use crate::error::RenderResult;
use crate::sync_jobs::{
    sync_changed_pages, sync_full_pages, sync_listed_pages, sync_per_record, sync_pointers,
    SyncContext,
};

/// Element size of the pointer buffer.
pub const POINTER_STRIDE: usize = std::mem::size_of::<u32>();

/// How often an attribute is copied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// Copy pages whose attribute or order version advanced.
    ChangeTracked,
    /// Copy every record every cycle, addressed by global record index.
    EveryCycle,
    /// Copy pages only when they are new or reordered.
    OnceOnCreation,
}

impl SyncPolicy {
    /// Whether this policy addresses records through page ranges.
    #[inline]
    #[must_use]
    pub const fn uses_page_ranges(self) -> bool {
        matches!(self, Self::ChangeTracked | Self::OnceOnCreation)
    }
}

/// Registration entry for one attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    /// Store column.
    pub key: AttributeKey,
    /// Bytes per element.
    pub stride: usize,
    /// Resync policy.
    pub policy: SyncPolicy,
    /// Shader binding slot.
    pub binding: u32,
}

impl AttributeBinding {
    /// Binding for a typed attribute.
    #[must_use]
    pub fn of<A: Attribute>(policy: SyncPolicy, binding: u32) -> Self {
        Self {
            key: A::KEY,
            stride: std::mem::size_of::<A>(),
            policy,
            binding,
        }
    }
}

/// A buffer as handed to the draw call.
#[derive(Clone)]
pub struct BufferBinding {
    /// Shader binding slot.
    pub binding: u32,
    /// Source attribute; `None` for the pointer buffer.
    pub key: Option<AttributeKey>,
    /// The buffer.
    pub buffer: Arc<dyn AttributeBuffer>,
}

impl std::fmt::Debug for BufferBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferBinding")
            .field("binding", &self.binding)
            .field("key", &self.key)
            .field("buffer", &self.buffer.label())
            .finish()
    }
}

/// One attribute's destination buffer.
pub struct PropertyBuffer {
    key: Option<AttributeKey>,
    binding: u32,
    stride: usize,
    policy: SyncPolicy,
    label: String,
    buffer: Arc<dyn AttributeBuffer>,
}

impl PropertyBuffer {
    fn allocate(
        allocator: &dyn BufferAllocator,
        label: String,
        key: Option<AttributeKey>,
        binding: u32,
        stride: usize,
        policy: SyncPolicy,
        capacity: usize,
    ) -> RenderResult<Self> {
        let buffer = allocator.allocate(&label, stride, capacity)?;
        Ok(Self {
            key,
            binding,
            stride,
            policy,
            label,
            buffer,
        })
    }

    /// Source attribute; `None` for the pointer buffer.
    #[must_use]
    pub const fn key(&self) -> Option<AttributeKey> {
        self.key
    }

    /// Shader binding slot.
    #[must_use]
    pub const fn binding(&self) -> u32 {
        self.binding
    }

    /// Bytes per element.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Resync policy.
    #[must_use]
    pub const fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Elements the buffer holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The external buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<dyn AttributeBuffer> {
        &self.buffer
    }

    /// Replaces the buffer with a zeroed one of `capacity` elements.
    /// Stride is preserved, contents are discarded.
    ///
    /// # Errors
    ///
    /// Propagates allocator failures.
    pub fn reallocate(&mut self, allocator: &dyn BufferAllocator, capacity: usize) -> RenderResult<()> {
        self.buffer = allocator.allocate(&self.label, self.stride, capacity)?;
        Ok(())
    }

    fn to_binding(&self) -> BufferBinding {
        BufferBinding {
            binding: self.binding,
            key: self.key,
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// What the page-range policies must copy this cycle.
#[derive(Clone, Debug)]
pub struct SyncRequest {
    /// Slot numbering changed or buffers were reallocated: copy every page.
    pub full: bool,
    /// Last version the destination reflects.
    pub since: u64,
    /// New and reordered page positions, sorted.
    pub touched: Arc<[usize]>,
}

/// Every buffer of one render group.
pub struct PropertySet {
    change_tracked: Vec<PropertyBuffer>,
    every_cycle: Vec<PropertyBuffer>,
    once_on_creation: Vec<PropertyBuffer>,
    pointer: Option<PropertyBuffer>,
    bindings: Vec<BufferBinding>,
}

impl PropertySet {
    /// Allocates one buffer per attribute plus the pointer buffer if needed.
    ///
    /// `attributes` must already be validated.
    ///
    /// # Errors
    ///
    /// Propagates allocator failures.
    pub fn new(
        allocator: &dyn BufferAllocator,
        label: &str,
        attributes: &[AttributeBinding],
        capacity: usize,
    ) -> RenderResult<Self> {
        let mut set = Self {
            change_tracked: Vec::new(),
            every_cycle: Vec::new(),
            once_on_creation: Vec::new(),
            pointer: None,
            bindings: Vec::new(),
        };

        for attribute in attributes {
            let buffer = PropertyBuffer::allocate(
                allocator,
                format!("{label}/attr{}", attribute.key.0),
                Some(attribute.key),
                attribute.binding,
                attribute.stride,
                attribute.policy,
                capacity,
            )?;
            match attribute.policy {
                SyncPolicy::ChangeTracked => set.change_tracked.push(buffer),
                SyncPolicy::EveryCycle => set.every_cycle.push(buffer),
                SyncPolicy::OnceOnCreation => set.once_on_creation.push(buffer),
            }
        }

        if set.needs_classification() {
            let binding = attributes.iter().map(|a| a.binding + 1).max().unwrap_or(0);
            set.pointer = Some(PropertyBuffer::allocate(
                allocator,
                format!("{label}/pointer"),
                None,
                binding,
                POINTER_STRIDE,
                SyncPolicy::EveryCycle,
                capacity,
            )?);
        }

        set.rebuild_bindings();
        Ok(set)
    }

    /// Whether any attribute is addressed through page ranges.
    #[must_use]
    pub fn needs_classification(&self) -> bool {
        !self.change_tracked.is_empty() || !self.once_on_creation.is_empty()
    }

    /// Buffers with the given policy. The pointer buffer is not included.
    #[must_use]
    pub fn by_policy(&self, policy: SyncPolicy) -> &[PropertyBuffer] {
        match policy {
            SyncPolicy::ChangeTracked => &self.change_tracked,
            SyncPolicy::EveryCycle => &self.every_cycle,
            SyncPolicy::OnceOnCreation => &self.once_on_creation,
        }
    }

    /// The pointer buffer, if the group has one.
    #[must_use]
    pub fn pointer(&self) -> Option<&PropertyBuffer> {
        self.pointer.as_ref()
    }

    /// Every buffer, pointer included.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyBuffer> {
        self.change_tracked
            .iter()
            .chain(&self.every_cycle)
            .chain(&self.once_on_creation)
            .chain(&self.pointer)
    }

    /// The buffer of one attribute.
    #[must_use]
    pub fn find(&self, key: AttributeKey) -> Option<&PropertyBuffer> {
        self.iter().find(|b| b.key == Some(key))
    }

    /// Bindings sorted by slot.
    #[must_use]
    pub fn bindings(&self) -> &[BufferBinding] {
        &self.bindings
    }

    fn rebuild_bindings(&mut self) {
        let mut bindings: Vec<BufferBinding> = self.iter().map(PropertyBuffer::to_binding).collect();
        bindings.sort_by_key(|b| b.binding);
        self.bindings = bindings;
    }

    /// Reallocates every buffer at `capacity`, discarding contents.
    ///
    /// # Errors
    ///
    /// Propagates the first allocator failure. Buffers reallocated before it
    /// keep their new storage and the bindings reflect them either way.
    pub fn reallocate(&mut self, allocator: &dyn BufferAllocator, capacity: usize) -> RenderResult<()> {
        let result = self
            .change_tracked
            .iter_mut()
            .chain(&mut self.every_cycle)
            .chain(&mut self.once_on_creation)
            .chain(&mut self.pointer)
            .try_for_each(|buffer| buffer.reallocate(allocator, capacity));
        self.rebuild_bindings();
        result
    }

    /// Opens the write session of every buffer.
    pub fn begin_write(&self) {
        self.iter().for_each(|b| b.buffer.begin_write());
    }

    /// Closes the write session of every buffer.
    pub fn end_write(&self) {
        self.iter().for_each(|b| b.buffer.end_write());
    }

    /// Schedules this cycle's copies for every buffer and combines them.
    ///
    /// All jobs depend on `deps` (the index assignment).
    pub fn schedule_sync<S: PageStore>(
        &self,
        pool: &JobPool,
        ctx: &Arc<SyncContext<S>>,
        request: &SyncRequest,
        deps: &[JobHandle],
    ) -> JobHandle {
        let mut handles = Vec::with_capacity(self.bindings.len() + deps.len());

        for property in &self.change_tracked {
            let Some(key) = property.key else { continue };
            let buffer = Arc::clone(&property.buffer);
            handles.push(if request.full {
                sync_full_pages(pool, ctx, buffer, key, deps)
            } else {
                sync_changed_pages(pool, ctx, buffer, key, request.since, Arc::clone(&request.touched), deps)
            });
        }
        for property in &self.once_on_creation {
            let Some(key) = property.key else { continue };
            let buffer = Arc::clone(&property.buffer);
            handles.push(if request.full {
                sync_full_pages(pool, ctx, buffer, key, deps)
            } else {
                sync_listed_pages(pool, ctx, buffer, key, Arc::clone(&request.touched), deps)
            });
        }
        for property in &self.every_cycle {
            let Some(key) = property.key else { continue };
            let buffer = Arc::clone(&property.buffer);
            handles.push(sync_per_record(pool, ctx, buffer, key, deps));
        }
        if let Some(pointer) = &self.pointer {
            handles.push(sync_pointers(pool, ctx, Arc::clone(&pointer.buffer), deps));
        }

        handles.extend_from_slice(deps);
        pool.combine(&handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{HostAllocator, HostBuffer};
    use strata_core::{Color, Position, Scale};

    fn attributes() -> Vec<AttributeBinding> {
        vec![
            AttributeBinding::of::<Position>(SyncPolicy::ChangeTracked, 0),
            AttributeBinding::of::<Color>(SyncPolicy::OnceOnCreation, 1),
            AttributeBinding::of::<Scale>(SyncPolicy::EveryCycle, 4),
        ]
    }

    #[test]
    fn test_grouping_and_pointer() {
        let set = PropertySet::new(&HostAllocator, "g", &attributes(), 8).unwrap();
        assert!(set.needs_classification());
        assert_eq!(set.by_policy(SyncPolicy::ChangeTracked).len(), 1);
        assert_eq!(set.by_policy(SyncPolicy::EveryCycle).len(), 1);
        assert_eq!(set.by_policy(SyncPolicy::OnceOnCreation).len(), 1);

        let pointer = set.pointer().unwrap();
        assert_eq!(pointer.stride(), POINTER_STRIDE);
        assert_eq!(pointer.binding(), 5);

        let slots: Vec<u32> = set.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(slots, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_every_cycle_only_has_no_pointer() {
        let attrs = [AttributeBinding::of::<Scale>(SyncPolicy::EveryCycle, 0)];
        let set = PropertySet::new(&HostAllocator, "g", &attrs, 8).unwrap();
        assert!(!set.needs_classification());
        assert!(set.pointer().is_none());
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn test_reallocate_preserves_stride_and_discards_contents() {
        let mut set = PropertySet::new(&HostAllocator, "g", &attributes(), 2).unwrap();
        let scale = set.find(Scale::KEY).unwrap().buffer().clone();
        scale.begin_write();
        scale.write(0, bytemuck::bytes_of(&Scale(2.0)));
        scale.end_write();

        set.reallocate(&HostAllocator, 6).unwrap();
        for buffer in set.iter() {
            assert_eq!(buffer.capacity(), 6);
        }
        let scale = set.find(Scale::KEY).unwrap();
        assert_eq!(scale.stride(), 4);
        let host = scale.buffer().as_any().downcast_ref::<HostBuffer>().unwrap();
        assert!(host.snapshot().iter().all(|&b| b == 0));
        assert!(Arc::ptr_eq(&set.bindings()[2].buffer, scale.buffer()));
    }

    #[test]
    fn test_begin_end_covers_all_buffers() {
        let set = PropertySet::new(&HostAllocator, "g", &attributes(), 2).unwrap();
        set.begin_write();
        for buffer in set.iter() {
            let host = buffer.buffer().as_any().downcast_ref::<HostBuffer>().unwrap();
            assert!(host.is_writing());
        }
        set.end_write();
        for buffer in set.iter() {
            let host = buffer.buffer().as_any().downcast_ref::<HostBuffer>().unwrap();
            assert!(!host.is_writing());
        }
    }
}
