//! wgpu-backed buffers. Writes go through `Queue::write_buffer` and land
//! before the next submit.

use std::any::Any;
use std::sync::Arc;

use strata_core::WriteGate;

use super::{AttributeBuffer, BufferAllocator};
use crate::error::{RenderError, RenderResult};

/// One attribute array in GPU memory, bindable as storage or vertex data.
pub struct WgpuAttributeBuffer {
    label: String,
    buffer: wgpu::Buffer,
    queue: Arc<wgpu::Queue>,
    stride: usize,
    capacity: usize,
    gate: WriteGate,
}

impl WgpuAttributeBuffer {
    /// The underlying buffer, for bind groups and vertex bindings.
    #[must_use]
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl AttributeBuffer for WgpuAttributeBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn begin_write(&self) {
        self.gate.begin();
    }

    fn write(&self, slot: usize, bytes: &[u8]) {
        debug_assert!(self.gate.is_open(), "write outside begin_write/end_write");
        debug_assert!(slot * self.stride + bytes.len() <= self.capacity * self.stride);
        if bytes.is_empty() {
            return;
        }
        self.queue
            .write_buffer(&self.buffer, (slot * self.stride) as wgpu::BufferAddress, bytes);
    }

    fn end_write(&self) {
        self.gate.end();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Allocates [`WgpuAttributeBuffer`]s on one device.
pub struct WgpuBufferAllocator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuBufferAllocator {
    /// Creates an allocator for `device`, writing through `queue`.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }
}

impl BufferAllocator for WgpuBufferAllocator {
    fn allocate(&self, label: &str, stride: usize, capacity: usize) -> RenderResult<Arc<dyn AttributeBuffer>> {
        // Queue writes must be aligned to COPY_BUFFER_ALIGNMENT.
        if stride as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(RenderError::UnalignedStride(stride));
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (stride * capacity) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        tracing::debug!(label, stride, capacity, "gpu attribute buffer allocated");

        Ok(Arc::new(WgpuAttributeBuffer {
            label: label.to_string(),
            buffer,
            queue: Arc::clone(&self.queue),
            stride,
            capacity,
            gate: WriteGate::new(),
        }))
    }
}
