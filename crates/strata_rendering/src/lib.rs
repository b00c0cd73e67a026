//! # STRATA Rendering
//!
//! Streams per-record attribute data from a paged store into growable,
//! instanced destination buffers, moving only the bytes that changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         PER GROUP CYCLE                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  snapshot pages ──> classify (parallel, join)                    │
//! │        │                                                         │
//! │        ├── doesn't fit ──> grow + full remap                     │
//! │        └── fits ─────────> incremental assignment                │
//! │                                 │                                │
//! │  begin_write ──> sync jobs (depend on assignment) ──> join       │
//! │                                                        │         │
//! │  end_write ──> draw(instance_count = records) <────────┘         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Slot numbering only changes on a full remap
//! - Unchanged pages cost zero bytes
//! - No job blocks; the orchestrator joins explicitly
//! - No cycle overlaps the next one

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocation;
pub mod assign;
pub mod buffer;
pub mod classify;
pub mod config;
pub mod error;
pub mod group;
pub mod offsets;
pub mod property;
pub mod stats;
pub mod sync_jobs;
pub mod system;

pub use allocation::AllocationTracker;
pub use assign::AssignPath;
pub use buffer::{
    AttributeBuffer, BufferAllocator, HostAllocator, HostBuffer, WgpuAttributeBuffer,
    WgpuBufferAllocator, WriteRecord,
};
pub use classify::Classification;
pub use config::StreamConfig;
pub use error::{RenderError, RenderResult};
pub use group::{DrawCall, DrawSink, GroupState, MaterialHandle, MeshHandle, RenderGroup};
pub use offsets::{PageOffsetEntry, PageOffsetMap, SharedOffsets};
pub use property::{
    AttributeBinding, BufferBinding, PropertyBuffer, PropertySet, SyncPolicy, SyncRequest,
    POINTER_STRIDE,
};
pub use stats::{CyclePath, CycleStats, FrameStats};
pub use system::{GroupDescriptor, GroupHandle, RenderSystem};
