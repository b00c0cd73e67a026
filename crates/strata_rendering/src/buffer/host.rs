//! Host-memory buffers with a write log. Used by tests and benches, and as a
//! staging target when no GPU is present.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::WriteGate;

use super::{AttributeBuffer, BufferAllocator};
use crate::error::RenderResult;

/// One `write` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// First element written.
    pub slot: usize,
    /// Elements written.
    pub count: usize,
}

struct HostStorage {
    data: Vec<u8>,
    log: Vec<WriteRecord>,
    bytes_written: u64,
}

/// A buffer in host memory.
pub struct HostBuffer {
    label: String,
    stride: usize,
    capacity: usize,
    storage: Mutex<HostStorage>,
    gate: WriteGate,
}

impl HostBuffer {
    /// Creates a zeroed buffer.
    #[must_use]
    pub fn new(label: &str, stride: usize, capacity: usize) -> Self {
        Self {
            label: label.to_string(),
            stride,
            capacity,
            storage: Mutex::new(HostStorage {
                data: vec![0u8; stride * capacity],
                log: Vec::new(),
                bytes_written: 0,
            }),
            gate: WriteGate::new(),
        }
    }

    /// Copy of the whole buffer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.storage.lock().data.clone()
    }

    /// Bytes of one element.
    #[must_use]
    pub fn element(&self, slot: usize) -> Vec<u8> {
        let storage = self.storage.lock();
        storage.data[slot * self.stride..(slot + 1) * self.stride].to_vec()
    }

    /// The buffer reinterpreted as `T` elements.
    #[must_use]
    pub fn elements<T: bytemuck::Pod>(&self) -> Vec<T> {
        let storage = self.storage.lock();
        storage
            .data
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Drains the write log, sorted by slot.
    pub fn take_write_log(&self) -> Vec<WriteRecord> {
        let mut log = std::mem::take(&mut self.storage.lock().log);
        log.sort_unstable_by_key(|r| r.slot);
        log
    }

    /// Total bytes written since creation.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.storage.lock().bytes_written
    }

    /// Whether a write session is open.
    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.gate.is_open()
    }
}

impl AttributeBuffer for HostBuffer {
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
        debug_assert_eq!(bytes.len() % self.stride, 0, "partial element write");
        let count = bytes.len() / self.stride;
        assert!(
            slot + count <= self.capacity,
            "{}: write of {count} elements at {slot} overflows capacity {}",
            self.label,
            self.capacity
        );

        let offset = slot * self.stride;
        let mut storage = self.storage.lock();
        storage.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        storage.log.push(WriteRecord { slot, count });
        storage.bytes_written += bytes.len() as u64;
    }

    fn end_write(&self) {
        self.gate.end();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Allocates [`HostBuffer`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostAllocator;

impl BufferAllocator for HostAllocator {
    fn allocate(&self, label: &str, stride: usize, capacity: usize) -> RenderResult<Arc<dyn AttributeBuffer>> {
        Ok(Arc::new(HostBuffer::new(label, stride, capacity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_log() {
        let buffer = HostBuffer::new("test", 4, 8);
        buffer.begin_write();
        buffer.write(2, bytemuck::cast_slice(&[7u32, 8u32]));
        buffer.write(0, bytemuck::bytes_of(&1u32));
        buffer.end_write();

        assert_eq!(buffer.elements::<u32>(), vec![1, 0, 7, 8, 0, 0, 0, 0]);
        assert_eq!(
            buffer.take_write_log(),
            vec![WriteRecord { slot: 0, count: 1 }, WriteRecord { slot: 2, count: 2 }]
        );
        assert!(buffer.take_write_log().is_empty());
        assert_eq!(buffer.bytes_written(), 12);
    }

    #[test]
    #[should_panic(expected = "overflows capacity")]
    fn test_overflow_panics() {
        let buffer = HostBuffer::new("test", 4, 2);
        buffer.begin_write();
        buffer.write(1, &[0u8; 8]);
    }

    #[test]
    #[should_panic(expected = "begin_write called while a write is outstanding")]
    fn test_double_begin_panics() {
        let buffer = HostBuffer::new("test", 4, 2);
        buffer.begin_write();
        buffer.begin_write();
    }

    #[test]
    fn test_allocator_downcast() {
        let buffer = HostAllocator.allocate("a", 16, 3).unwrap();
        assert_eq!(buffer.capacity(), 3);
        let host = buffer.as_any().downcast_ref::<HostBuffer>().unwrap();
        assert_eq!(host.snapshot().len(), 48);
    }
}
