//! # Attribute Buffers
//!
//! Destination arrays are owned outside the engine and reached through two
//! traits, so the same orchestration drives GPU buffers and host memory.
//!
//! ```text
//! BufferAllocator::allocate(label, stride, capacity)
//!         │
//!         ▼
//! AttributeBuffer ── begin_write ── write(slot, bytes)* ── end_write
//! ```
//!
//! `write` takes `&self` and may be called from many workers at once; callers
//! guarantee the written slot ranges are disjoint.

use std::any::Any;
use std::sync::Arc;

use crate::error::RenderResult;

mod gpu;
mod host;

pub use gpu::{WgpuAttributeBuffer, WgpuBufferAllocator};
pub use host::{HostAllocator, HostBuffer, WriteRecord};

/// A flat array of `capacity` elements of `stride` bytes.
pub trait AttributeBuffer: Send + Sync {
    /// Debug label.
    fn label(&self) -> &str;

    /// Bytes per element.
    fn stride(&self) -> usize;

    /// Elements the buffer holds.
    fn capacity(&self) -> usize;

    /// Opens the cycle's write session.
    ///
    /// # Panics
    ///
    /// Panics if a session is already open.
    fn begin_write(&self);

    /// Copies `bytes` (a whole number of elements) starting at element `slot`.
    fn write(&self, slot: usize, bytes: &[u8]);

    /// Closes the write session.
    fn end_write(&self);

    /// Downcasting hook for backend-specific access.
    fn as_any(&self) -> &dyn Any;
}

/// Creates destination buffers.
pub trait BufferAllocator: Send + Sync {
    /// Allocates a zeroed buffer of `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot represent the layout.
    fn allocate(&self, label: &str, stride: usize, capacity: usize)
        -> RenderResult<Arc<dyn AttributeBuffer>>;
}
