//! Shared fixtures for render system tests.

#![allow(dead_code)]

use std::sync::Arc;

use strata_core::{Attribute, AttributeKey, Color, GroupKey, PagedWorld, Position, RecordId, Scale};
use strata_rendering::{
    AttributeBinding, DrawCall, DrawSink, GroupDescriptor, GroupHandle, HostAllocator, HostBuffer,
    MaterialHandle, MeshHandle, RenderSystem, StreamConfig, SyncPolicy,
};

pub const SOURCE: GroupKey = GroupKey(1);
pub const PAGE_CAPACITY: usize = 4;

/// One recorded draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drawn {
    pub group: GroupHandle,
    pub instance_count: u32,
    pub bindings: Vec<u32>,
}

#[derive(Default)]
pub struct RecordingSink {
    pub calls: Vec<Drawn>,
}

impl DrawSink for RecordingSink {
    fn draw(&mut self, call: &DrawCall<'_>) {
        self.calls.push(Drawn {
            group: call.group,
            instance_count: call.instance_count,
            bindings: call.bindings.iter().map(|b| b.binding).collect(),
        });
    }
}

pub fn world_with(layouts: &[strata_core::AttributeLayout]) -> Arc<PagedWorld> {
    let mut world = PagedWorld::new();
    world.define_group(SOURCE, PAGE_CAPACITY, layouts).unwrap();
    Arc::new(world)
}

pub fn world() -> Arc<PagedWorld> {
    world_with(&[Position::layout(), Color::layout(), Scale::layout()])
}

/// Mutable access between cycles. No job holds the store once `update` returned.
pub fn edit(store: &mut Arc<PagedWorld>) -> &mut PagedWorld {
    Arc::get_mut(store).expect("store still shared after update")
}

pub fn system(config: StreamConfig) -> RenderSystem {
    RenderSystem::new(config, Arc::new(HostAllocator)).unwrap()
}

pub fn small_config() -> StreamConfig {
    StreamConfig {
        worker_count: Some(3),
        batch_size: 1,
        ..StreamConfig::default()
    }
}

pub fn descriptor(initial: usize, step: usize) -> GroupDescriptor {
    GroupDescriptor::new(MaterialHandle(7), MeshHandle(1), SOURCE)
        .with_attribute(AttributeBinding::of::<Position>(SyncPolicy::ChangeTracked, 0))
        .with_attribute(AttributeBinding::of::<Color>(SyncPolicy::OnceOnCreation, 1))
        .with_attribute(AttributeBinding::of::<Scale>(SyncPolicy::EveryCycle, 2))
        .with_capacity(initial, step)
}

pub fn spawn(world: &mut PagedWorld, n: usize, seed: f32) -> Vec<RecordId> {
    (0..n)
        .map(|i| {
            let r = world.spawn(SOURCE).unwrap();
            let v = seed + i as f32;
            world.set(r, Position::new(v, v * 2.0, -v)).unwrap();
            world.set(r, Color::new(v, 0.5, 0.25, 1.0)).unwrap();
            world.set(r, Scale(v * 0.5)).unwrap();
            r
        })
        .collect()
}

/// Records of the source group in draw order.
pub fn draw_order(world: &PagedWorld) -> Vec<RecordId> {
    world
        .page_order(SOURCE)
        .unwrap()
        .iter()
        .flat_map(|id| world.page(*id).unwrap().records().to_vec())
        .collect()
}

pub fn host_buffer(system: &RenderSystem, group: GroupHandle, key: AttributeKey) -> Arc<dyn strata_rendering::AttributeBuffer> {
    system.buffer(group, key).unwrap()
}

pub fn elements<T: bytemuck::Pod>(system: &RenderSystem, group: GroupHandle, key: AttributeKey) -> Vec<T> {
    let buffer = host_buffer(system, group, key);
    buffer.as_any().downcast_ref::<HostBuffer>().unwrap().elements::<T>()
}

pub fn write_log(system: &RenderSystem, group: GroupHandle, key: AttributeKey) -> Vec<strata_rendering::WriteRecord> {
    let buffer = host_buffer(system, group, key);
    buffer.as_any().downcast_ref::<HostBuffer>().unwrap().take_write_log()
}

pub fn pointer(system: &RenderSystem, group: GroupHandle) -> Vec<u32> {
    let buffer = system.group(group).unwrap().properties().pointer().unwrap().buffer().clone();
    buffer.as_any().downcast_ref::<HostBuffer>().unwrap().elements::<u32>()
}

pub fn pointer_log(system: &RenderSystem, group: GroupHandle) -> Vec<strata_rendering::WriteRecord> {
    let buffer = system.group(group).unwrap().properties().pointer().unwrap().buffer().clone();
    buffer.as_any().downcast_ref::<HostBuffer>().unwrap().take_write_log()
}

/// Checks every drawn instance reads its own record's data.
pub fn assert_mirrors(system: &RenderSystem, group: GroupHandle, world: &PagedWorld) {
    let records = draw_order(world);
    let pointer = pointer(system, group);
    let positions: Vec<Position> = elements(system, group, Position::KEY);
    let colors: Vec<Color> = elements(system, group, Color::KEY);
    let scales: Vec<Scale> = elements(system, group, Scale::KEY);

    for (instance, record) in records.iter().enumerate() {
        let slot = pointer[instance] as usize;
        assert_eq!(positions[slot], world.get::<Position>(*record).unwrap(), "position of instance {instance}");
        assert_eq!(colors[slot], world.get::<Color>(*record).unwrap(), "color of instance {instance}");
        assert_eq!(scales[instance], world.get::<Scale>(*record).unwrap(), "scale of instance {instance}");
    }
}

/// Page ranges never overlap and add up to `used`.
pub fn assert_ranges(system: &RenderSystem, group: GroupHandle) {
    let group = system.group(group).unwrap();
    let map = group.offsets().read();
    let mut ranges = map.reserved_ranges();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlapping ranges {pair:?}");
    }
    let used = group.tracker().used();
    assert_eq!(map.reserved_capacity(), used);
    assert!(used <= group.tracker().allocated());
    if let Some(last) = ranges.last() {
        assert!(u64::from(last.0 + last.1) <= used);
    }
}
