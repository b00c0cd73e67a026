//! End-to-end cycles against a paged world and host buffers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use strata_core::{Attribute, AttributeData, AttributeKey, Color, GroupKey, PageId, PageInfo, PageStore, Position, Scale};
use strata_rendering::{
    AttributeBinding, AttributeBuffer, BufferAllocator, CyclePath, GroupDescriptor, GroupState, HostAllocator,
    MaterialHandle, MeshHandle, RenderError, RenderResult, RenderSystem, SyncPolicy, WriteRecord,
};

#[test]
fn test_first_cycle_grows_and_remaps() {
    let mut store = world();
    spawn(edit(&mut store), 4, 1.0);

    let mut system = system(small_config());
    let group = system.register_group(descriptor(1, 2)).unwrap();
    let mut sink = RecordingSink::default();

    let frame = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &frame.groups[0];

    assert_eq!(stats.path, CyclePath::FullRemap);
    assert!(stats.grew);
    // 1 + max(2, 4 - 1)
    assert_eq!(stats.allocated, 4);
    assert_eq!(stats.used, 4);
    assert_eq!(stats.records, 4);
    assert_eq!(frame.full_remaps, 1);

    assert_eq!(write_log(&system, group, Position::KEY), vec![WriteRecord { slot: 0, count: 4 }]);
    assert_eq!(pointer(&system, group), vec![0, 1, 2, 3]);
    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);

    assert_eq!(sink.calls.len(), 1);
    assert_eq!(sink.calls[0].instance_count, 4);
    assert_eq!(sink.calls[0].bindings, vec![0, 1, 2, 3]);
    assert_eq!(system.group(group).unwrap().state(), GroupState::Idle);
}

#[test]
fn test_single_change_copies_one_page() {
    let mut store = world();
    let records = spawn(edit(&mut store), 8, 0.0);

    let mut system = system(small_config());
    let group = system.register_group(descriptor(8, 8)).unwrap();
    let mut sink = RecordingSink::default();

    let first = system.update(&store, &mut sink).into_result().unwrap();
    assert_eq!(first.groups[0].path, CyclePath::Incremental);
    assert_eq!(first.groups[0].allocated, 8);
    assert_eq!(first.groups[0].used, 8);
    for key in [Position::KEY, Color::KEY, Scale::KEY] {
        write_log(&system, group, key);
    }
    pointer_log(&system, group);

    edit(&mut store).set(records[5], Position::new(50.0, 0.0, 0.0)).unwrap();
    let second = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &second.groups[0];

    assert_eq!(stats.path, CyclePath::Incremental);
    assert!(!stats.grew);
    assert!(!stats.structure_changed);
    assert_eq!(stats.new_pages, 0);
    assert_eq!(stats.reordered_pages, 0);
    assert_eq!(stats.used, 8);

    assert_eq!(write_log(&system, group, Position::KEY), vec![WriteRecord { slot: 4, count: 4 }]);
    assert!(write_log(&system, group, Color::KEY).is_empty());
    let scale_slots: usize = write_log(&system, group, Scale::KEY).iter().map(|w| w.count).sum();
    assert_eq!(scale_slots, 8);
    let pointer_slots: usize = pointer_log(&system, group).iter().map(|w| w.count).sum();
    assert_eq!(pointer_slots, 8);

    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);
}

#[test]
fn test_recycled_page_slot_gets_fresh_range() {
    let mut store = world();
    let records = spawn(edit(&mut store), 8, 0.0);

    let mut system = system(small_config());
    let group = system.register_group(descriptor(16, 16)).unwrap();
    let mut sink = RecordingSink::default();
    system.update(&store, &mut sink).into_result().unwrap();

    let world = edit(&mut store);
    let first_page = world.page_order(SOURCE).unwrap()[0];
    for record in &records[..4] {
        world.despawn(*record).unwrap();
    }
    spawn(world, 4, 100.0);
    let recycled = world.page_order(SOURCE).unwrap()[1];
    assert_eq!(recycled.slot, first_page.slot);
    assert_ne!(recycled.generation, first_page.generation);

    let frame = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &frame.groups[0];
    assert_eq!(stats.path, CyclePath::Incremental);
    assert_eq!(stats.new_pages, 1);
    assert_eq!(stats.reordered_pages, 0);
    assert_eq!(stats.used, 12);

    {
        let render_group = system.group(group).unwrap();
        let map = render_group.offsets().read();
        let entry = map.entry(&store.page(recycled).unwrap().info());
        assert!(entry.initialized);
        assert_eq!(entry.start, 8);
        assert_eq!(entry.capacity, 4);
    }

    assert_eq!(pointer(&system, group), vec![4, 5, 6, 7, 8, 9, 10, 11]);
    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);
}

#[test]
fn test_swapped_pages_keep_ranges() {
    let mut store = world();
    spawn(edit(&mut store), 8, 0.0);

    let mut system = system(small_config());
    let group = system.register_group(descriptor(16, 16)).unwrap();
    let mut sink = RecordingSink::default();
    system.update(&store, &mut sink).into_result().unwrap();
    assert_eq!(pointer(&system, group), vec![0, 1, 2, 3, 4, 5, 6, 7]);

    edit(&mut store).swap_pages(SOURCE, 0, 1).unwrap();
    let frame = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &frame.groups[0];

    assert_eq!(stats.path, CyclePath::Incremental);
    assert_eq!(stats.new_pages, 0);
    assert_eq!(stats.reordered_pages, 2);
    assert!(stats.structure_changed);
    assert_eq!(stats.used, 8);

    assert_eq!(pointer(&system, group), vec![4, 5, 6, 7, 0, 1, 2, 3]);
    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);
}

#[test]
fn test_outgrowing_allocation_remaps_everything() {
    let mut store = world();
    spawn(edit(&mut store), 4, 0.0);

    let mut system = system(small_config());
    let group = system.register_group(descriptor(4, 3)).unwrap();
    let mut sink = RecordingSink::default();
    let first = system.update(&store, &mut sink).into_result().unwrap();
    assert_eq!(first.groups[0].path, CyclePath::Incremental);

    spawn(edit(&mut store), 5, 10.0);
    let frame = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &frame.groups[0];

    // 4 + max(3, 12 - 4)
    assert_eq!(stats.path, CyclePath::FullRemap);
    assert!(stats.grew);
    assert_eq!(stats.allocated, 12);
    assert_eq!(stats.used, 12);
    assert_eq!(stats.records, 9);
    assert_eq!(system.buffer(group, Position::KEY).unwrap().capacity(), 12);

    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);
}

/// Host allocator that refuses one allocation.
struct FailingOnce {
    calls: AtomicUsize,
    fail_at: usize,
}

impl BufferAllocator for FailingOnce {
    fn allocate(&self, label: &str, stride: usize, capacity: usize) -> RenderResult<Arc<dyn AttributeBuffer>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(RenderError::SlotOverflow(capacity as u64));
        }
        HostAllocator.allocate(label, stride, capacity)
    }
}

#[test]
fn test_failed_growth_keeps_tracker_within_buffers() {
    let mut store = world();
    spawn(edit(&mut store), 8, 0.0);

    // Registration makes 4 buffers; the growth fails on its last one, the pointer.
    let allocator = Arc::new(FailingOnce {
        calls: AtomicUsize::new(0),
        fail_at: 7,
    });
    let mut system = RenderSystem::new(small_config(), allocator).unwrap();
    let group = system.register_group(descriptor(4, 4)).unwrap();
    let mut sink = RecordingSink::default();

    let frame = system.update(&store, &mut sink);
    assert_eq!(frame.failures, vec![(group, RenderError::SlotOverflow(8))]);
    assert!(sink.calls.is_empty());

    let render_group = system.group(group).unwrap();
    assert_eq!(render_group.tracker().allocated(), 4);
    assert_eq!(render_group.state(), GroupState::Idle);
    // Bindings follow the buffers that were replaced before the failure.
    let bindings = render_group.properties().bindings();
    assert_eq!(bindings.len(), 4);
    for binding in bindings {
        let expected = if binding.key.is_some() { 8 } else { 4 };
        assert_eq!(binding.buffer.capacity(), expected, "binding {}", binding.binding);
        assert!(binding.buffer.capacity() as u64 >= render_group.tracker().allocated());
    }

    let frame = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &frame.groups[0];
    assert_eq!(stats.path, CyclePath::FullRemap);
    assert!(stats.grew);
    assert_eq!(stats.allocated, 8);
    assert_eq!(stats.records, 8);
    assert!(system
        .group(group)
        .unwrap()
        .properties()
        .iter()
        .all(|p| p.capacity() == 8));
    assert_mirrors(&system, group, &store);
    assert_ranges(&system, group);
}

/// One page whose capacity can change while every version stays put.
struct ResizingStore {
    capacity: u32,
    positions: Vec<Position>,
}

impl PageStore for ResizingStore {
    fn version(&self) -> u64 {
        5
    }

    fn page_count(&self, group: GroupKey) -> usize {
        usize::from(group == SOURCE)
    }

    fn page_at(&self, group: GroupKey, order: usize) -> Option<PageInfo> {
        (group == SOURCE && order == 0).then(|| PageInfo {
            id: PageId::new(0, 0),
            capacity: self.capacity,
            len: self.positions.len() as u32,
            order_version: 1,
        })
    }

    fn attribute_data(&self, _page: PageId, key: AttributeKey) -> Option<AttributeData<'_>> {
        (key == Position::KEY).then(|| AttributeData {
            bytes: bytemuck::cast_slice(&self.positions),
            stride: std::mem::size_of::<Position>(),
            version: 1,
        })
    }
}

#[test]
fn test_new_page_range_filled_without_version_change() {
    let mut store = Arc::new(ResizingStore {
        capacity: 4,
        positions: vec![Position::new(1.0, 2.0, 3.0), Position::new(4.0, 5.0, 6.0)],
    });

    let mut system = system(small_config());
    let descriptor = GroupDescriptor::new(MaterialHandle(3), MeshHandle(0), SOURCE)
        .with_attribute(AttributeBinding::of::<Position>(SyncPolicy::ChangeTracked, 0))
        .with_capacity(16, 16);
    let group = system.register_group(descriptor).unwrap();
    let mut sink = RecordingSink::default();

    let first = system.update(&store, &mut sink).into_result().unwrap();
    assert_eq!(first.groups[0].path, CyclePath::Incremental);
    assert_eq!(&pointer(&system, group)[..2], &[0, 1]);
    write_log(&system, group, Position::KEY);

    Arc::get_mut(&mut store).unwrap().capacity = 8;
    let second = system.update(&store, &mut sink).into_result().unwrap();
    let stats = &second.groups[0];
    assert_eq!(stats.path, CyclePath::Incremental);
    assert_eq!(stats.new_pages, 1);
    assert_eq!(stats.used, 12);

    assert_eq!(&pointer(&system, group)[..2], &[4, 5]);
    assert_eq!(write_log(&system, group, Position::KEY), vec![WriteRecord { slot: 4, count: 2 }]);
    let positions: Vec<Position> = elements(&system, group, Position::KEY);
    assert_eq!(positions[4], Position::new(1.0, 2.0, 3.0));
    assert_eq!(positions[5], Position::new(4.0, 5.0, 6.0));
    assert_ranges(&system, group);
}
