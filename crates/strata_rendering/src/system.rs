//! # Render System
//!
//! Owns the worker pool, the buffer allocator and every registered group.
//!
//! ```rust,ignore
//! let mut system = RenderSystem::new(StreamConfig::default(), Arc::new(HostAllocator))?;
//! let handle = system.register_group(
//!     GroupDescriptor::new(MaterialHandle(1), MeshHandle(0), GroupKey(0))
//!         .with_attribute(AttributeBinding::of::<Position>(SyncPolicy::ChangeTracked, 0))
//!         .with_capacity(256, 256),
//! )?;
//!
//! let mut store = Arc::new(world);
//! loop {
//!     // No job holds the store once `update` returned.
//!     mutate(Arc::get_mut(&mut store).expect("unshared"));
//!     system.update(&store, &mut renderer).into_result()?;
//! }
//! ```

use std::sync::Arc;

use strata_core::{AttributeKey, GroupKey, JobPool, PageStore, SlotHandle, SlotPool};

use crate::buffer::{AttributeBuffer, BufferAllocator};
use crate::config::StreamConfig;
use crate::error::{RenderError, RenderResult};
use crate::group::{DrawSink, MaterialHandle, MeshHandle, RenderGroup};
use crate::property::AttributeBinding;
use crate::stats::FrameStats;

/// Identity of a registered group. Stale after unregistration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupHandle(SlotHandle);

impl GroupHandle {
    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.index
    }

    /// Slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0.generation
    }
}

/// Everything needed to register a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDescriptor {
    /// Material to draw with. Must not be null.
    pub material: MaterialHandle,
    /// Mesh to instance.
    pub mesh: MeshHandle,
    /// Store partition to stream from.
    pub source: GroupKey,
    /// Attribute binding table.
    pub attributes: Vec<AttributeBinding>,
    /// Initial slots; `None` takes the configured default.
    pub initial_capacity: Option<usize>,
    /// Minimum growth; `None` takes the configured default.
    pub capacity_step: Option<usize>,
}

impl GroupDescriptor {
    /// Descriptor with no attributes and default capacities.
    #[must_use]
    pub fn new(material: MaterialHandle, mesh: MeshHandle, source: GroupKey) -> Self {
        Self {
            material,
            mesh,
            source,
            attributes: Vec::new(),
            initial_capacity: None,
            capacity_step: None,
        }
    }

    /// Adds an attribute binding.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeBinding) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sets initial capacity and growth step.
    #[must_use]
    pub fn with_capacity(mut self, initial: usize, step: usize) -> Self {
        self.initial_capacity = Some(initial);
        self.capacity_step = Some(step);
        self
    }

    /// Checks the descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> RenderResult<()> {
        if self.material.is_null() {
            return Err(RenderError::NullMaterial);
        }
        if self.initial_capacity == Some(0) {
            return Err(RenderError::ZeroInitialCapacity);
        }
        if self.capacity_step == Some(0) {
            return Err(RenderError::ZeroCapacityStep);
        }
        for (i, attribute) in self.attributes.iter().enumerate() {
            if attribute.stride == 0 {
                return Err(RenderError::ZeroStride(attribute.key));
            }
            let earlier = &self.attributes[..i];
            if earlier.iter().any(|a| a.key == attribute.key) {
                return Err(RenderError::DuplicateAttribute(attribute.key));
            }
            if earlier.iter().any(|a| a.binding == attribute.binding) {
                return Err(RenderError::DuplicateBinding(attribute.binding));
            }
        }
        Ok(())
    }
}

/// Registration, per-frame update and disposal of render groups.
pub struct RenderSystem {
    config: StreamConfig,
    pool: JobPool,
    allocator: Arc<dyn BufferAllocator>,
    groups: SlotPool<RenderGroup>,
}

impl RenderSystem {
    /// Starts the worker pool.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if workers cannot be spawned.
    pub fn new(config: StreamConfig, allocator: Arc<dyn BufferAllocator>) -> RenderResult<Self> {
        config.validate()?;
        let pool = match config.worker_count {
            Some(count) => JobPool::new(count)?,
            None => JobPool::with_default_workers()?,
        };
        tracing::debug!(workers = pool.worker_count(), batch = config.batch_size, "render system started");

        Ok(Self {
            config,
            pool,
            allocator,
            groups: SlotPool::with_capacity(16),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Worker threads in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Number of registered groups.
    #[must_use]
    pub const fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Registers a group and allocates its buffers.
    ///
    /// # Errors
    ///
    /// Fails on an invalid descriptor or allocator failure.
    pub fn register_group(&mut self, descriptor: GroupDescriptor) -> RenderResult<GroupHandle> {
        descriptor.validate()?;
        let initial = descriptor
            .initial_capacity
            .unwrap_or(self.config.default_initial_capacity);
        let step = descriptor.capacity_step.unwrap_or(self.config.default_capacity_step);

        let handle = GroupHandle(self.groups.peek_next());
        let group = RenderGroup::new(
            handle,
            descriptor.material,
            descriptor.mesh,
            descriptor.source,
            &descriptor.attributes,
            initial as u64,
            step as u64,
            self.allocator.as_ref(),
        )?;
        let inserted = GroupHandle(self.groups.insert(group));
        debug_assert_eq!(inserted, handle);

        tracing::debug!(
            group = handle.index(),
            source = descriptor.source.0,
            attributes = descriptor.attributes.len(),
            initial,
            step,
            "group registered"
        );
        Ok(handle)
    }

    /// Runs one cycle of every group against `store` and issues the draws.
    ///
    /// `store` must not be mutated until this returns.
    ///
    /// A failing group skips its draw and is listed in
    /// [`FrameStats::failures`]; every other group still runs.
    pub fn update<S: PageStore>(&mut self, store: &Arc<S>, sink: &mut dyn DrawSink) -> FrameStats {
        let mut frame = FrameStats::default();
        for (_, group) in self.groups.iter_mut() {
            match group.run_cycle(&self.pool, self.allocator.as_ref(), &self.config, store, sink) {
                Ok(cycle) => frame.push(cycle),
                Err(error) => {
                    tracing::warn!(group = group.handle().index(), %error, "group cycle failed");
                    frame.fail(group.handle(), error);
                }
            }
        }
        frame
    }

    /// Looks up a group.
    #[must_use]
    pub fn group(&self, handle: GroupHandle) -> Option<&RenderGroup> {
        self.groups.get(handle.0)
    }

    /// Current buffer of one attribute of a group.
    #[must_use]
    pub fn buffer(&self, handle: GroupHandle, key: AttributeKey) -> Option<Arc<dyn AttributeBuffer>> {
        self.group(handle)?.buffer(key).map(|b| Arc::clone(b.buffer()))
    }

    /// Shrinks a group back to its initial allocation. Its next cycle
    /// performs a full remap.
    ///
    /// # Errors
    ///
    /// Fails for unknown handles or allocator failure.
    pub fn reset_group(&mut self, handle: GroupHandle) -> RenderResult<()> {
        let group = self
            .groups
            .get_mut(handle.0)
            .ok_or(RenderError::UnknownGroup(handle))?;
        group.reset_allocation(self.allocator.as_ref())
    }

    /// Removes a group and releases its buffers.
    ///
    /// # Errors
    ///
    /// Fails for unknown handles.
    pub fn unregister_group(&mut self, handle: GroupHandle) -> RenderResult<()> {
        self.groups
            .remove(handle.0)
            .map(drop)
            .ok_or(RenderError::UnknownGroup(handle))?;
        tracing::debug!(group = handle.index(), "group unregistered");
        Ok(())
    }

    /// Releases every group and stops the workers.
    pub fn dispose(mut self) {
        let groups = self.groups.len();
        self.groups.clear();
        tracing::debug!(groups, "render system disposed");
    }
}
