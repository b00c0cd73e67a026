//! # Synchronization Primitives for Parallel Streaming
//!
//! ## The Problem
//!
//! ```text
//! Main thread:   classify ─┐            ┌─ end_write
//! Workers:                 └─ sync jobs ┘
//!
//! Shared counter:       CACHE LINE PING-PONG → workers serialize
//! Blocking inside jobs: POOL STARVATION      → deadlock
//! ```
//!
//! ## The Solution
//!
//! - Jobs declare their dependencies up front and are only queued once every
//!   dependency completed. Nothing ever blocks on a worker.
//! - Aggregation goes to one cache-line-padded slot per worker, merged by the
//!   main thread after the join.
//! - Destination writes are bracketed by a gate that panics on a second
//!   `begin` instead of silently corrupting the buffer.

mod accumulator;
mod jobs;
mod write_gate;

pub use accumulator::{
    OrdComparator, PerWorker, WorkerContext, WorkerCounter, WorkerList, WorkerReducer,
};
pub use jobs::{JobHandle, JobPool};
pub use write_gate::WriteGate;
