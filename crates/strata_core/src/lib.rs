//! # STRATA Core
//!
//! Building blocks shared by the streaming engine:
//! - A paged record store whose pages are created, destroyed and reordered
//!   freely, with per-page and per-column change versions
//! - A worker pool with explicit, chainable job handles
//! - Per-worker accumulators for contention-free aggregation
//! - A write gate that makes double `begin_write` fail fast
//!
//! ## Architecture Rules
//!
//! 1. **Indices, not references** - Pages and records are addressed by
//!    generational slot indices and re-resolved every cycle
//! 2. **Explicit joins** - Jobs never block; the scheduler joins handles
//! 3. **One writer per slot** - Accumulator slots belong to exactly one worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{GroupKey, PagedWorld, Position};
//!
//! let mut world = PagedWorld::new();
//! world.define_group(GroupKey(0), 64, &[Position::layout()])?;
//! let record = world.spawn(GroupKey(0))?;
//! world.set(record, Position::new(1.0, 2.0, 3.0))?;
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;
pub mod store;
pub mod sync;

pub use error::{CoreError, CoreResult};
pub use memory::{SlotHandle, SlotPool};
pub use store::{
    Attribute, AttributeData, AttributeKey, AttributeLayout, Color, GroupKey, Page, PageId,
    PageInfo, PageStore, PagedWorld, Position, RecordId, Scale,
};
pub use sync::{
    JobHandle, JobPool, OrdComparator, PerWorker, WorkerContext, WorkerCounter, WorkerList,
    WorkerReducer, WriteGate,
};
