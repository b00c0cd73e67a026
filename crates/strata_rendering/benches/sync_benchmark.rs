//! # Sync Benchmark
//!
//! Cost of one render cycle over 64k records when nothing changed, when one
//! page changed, and when every page was reordered.

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_core::{Attribute, Color, GroupKey, PagedWorld, Position, RecordId, Scale};
use strata_rendering::{
    AttributeBinding, DrawCall, GroupDescriptor, HostAllocator, MaterialHandle, MeshHandle, RenderSystem,
    StreamConfig, SyncPolicy,
};

const SOURCE: GroupKey = GroupKey(0);
const RECORDS: usize = 65_536;
const PAGE: usize = 256;

fn setup() -> (Arc<PagedWorld>, Vec<RecordId>, RenderSystem) {
    let mut world = PagedWorld::new();
    world
        .define_group(SOURCE, PAGE, &[Position::layout(), Color::layout(), Scale::layout()])
        .expect("group");
    let records = world
        .spawn_batch(SOURCE, RECORDS, |i| Position::new(i as f32, 0.0, 0.0))
        .expect("spawn");

    let mut system = RenderSystem::new(StreamConfig::default(), Arc::new(HostAllocator)).expect("system");
    system
        .register_group(
            GroupDescriptor::new(MaterialHandle(1), MeshHandle(0), SOURCE)
                .with_attribute(AttributeBinding::of::<Position>(SyncPolicy::ChangeTracked, 0))
                .with_attribute(AttributeBinding::of::<Color>(SyncPolicy::OnceOnCreation, 1))
                .with_attribute(AttributeBinding::of::<Scale>(SyncPolicy::EveryCycle, 2))
                .with_capacity(RECORDS, PAGE),
        )
        .expect("register");

    let world = Arc::new(world);
    let mut sink = |_: &DrawCall<'_>| {};
    system.update(&world, &mut sink).into_result().expect("warm-up");
    (world, records, system)
}

fn bench_unchanged(c: &mut Criterion) {
    let (world, _, mut system) = setup();
    let mut sink = |call: &DrawCall<'_>| {
        black_box(call.instance_count);
    };

    c.bench_function("cycle_64k_unchanged", |b| {
        b.iter(|| black_box(system.update(&world, &mut sink).into_result().expect("cycle")));
    });
}

fn bench_one_page_changed(c: &mut Criterion) {
    let (mut world, records, mut system) = setup();
    let mut sink = |call: &DrawCall<'_>| {
        black_box(call.instance_count);
    };
    let mut tick = 0.0f32;

    c.bench_function("cycle_64k_one_page_changed", |b| {
        b.iter(|| {
            tick += 1.0;
            Arc::get_mut(&mut world)
                .expect("unshared")
                .set(records[0], Position::new(tick, 0.0, 0.0))
                .expect("set");
            black_box(system.update(&world, &mut sink).into_result().expect("cycle"))
        });
    });
}

fn bench_all_reordered(c: &mut Criterion) {
    let (mut world, _, mut system) = setup();
    let mut sink = |call: &DrawCall<'_>| {
        black_box(call.instance_count);
    };
    let pages = RECORDS / PAGE;

    c.bench_function("cycle_64k_all_reordered", |b| {
        b.iter(|| {
            let w = Arc::get_mut(&mut world).expect("unshared");
            for i in (0..pages - 1).step_by(2) {
                w.swap_pages(SOURCE, i, i + 1).expect("swap");
            }
            black_box(system.update(&world, &mut sink).into_result().expect("cycle"))
        });
    });
}

criterion_group!(benches, bench_unchanged, bench_one_page_changed, bench_all_reordered);
criterion_main!(benches);
