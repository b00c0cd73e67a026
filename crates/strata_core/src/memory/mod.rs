//! # Memory Management
//!
//! Generational slot storage for objects whose identity must survive
//! reordering but never be confused with a later reuse of the same slot.

mod slot_pool;

pub use slot_pool::{SlotHandle, SlotPool};
