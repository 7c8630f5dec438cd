//! Ring buffer for per-draw uniform data.
//!
//! Every draw copies the uniform blocks of its program into consecutive,
//! 256-byte aligned regions of one large uniform buffer and binds them with
//! dynamic offsets. The CPU-side copy is uploaded in one write right before the
//! commands that reference it are submitted, after which the ring starts over.

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::error::{RenderError, RenderResult};

/// A sub-allocation from the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAllocation {
    /// Byte offset into the ring buffer, usable as a dynamic offset.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

impl RingAllocation {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

pub struct UniformRing {
    buffer: BufferHandle,
    capacity: u64,
    write_offset: u64,
    staging: Vec<u8>,
    /// Incremented every time the ring is flushed; allocations from older epochs are stale
    epoch: u64,
}

impl UniformRing {
    /// Minimum uniform buffer offset alignment guaranteed by every adapter.
    pub const ALIGNMENT: u64 = 256;

    pub fn new<B: GraphicsBackend>(backend: &mut B, capacity: u64) -> RenderResult<Self> {
        let capacity = align_up(capacity.max(Self::ALIGNMENT), Self::ALIGNMENT);
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("uniform_ring".into()),
            size: capacity,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        Ok(Self {
            buffer,
            capacity,
            write_offset: 0,
            staging: Vec::with_capacity(capacity as usize),
            epoch: 0,
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.write_offset
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Copy `data` into the next aligned region.
    pub fn push(&mut self, data: &[u8]) -> RenderResult<RingAllocation> {
        let offset = align_up(self.write_offset, Self::ALIGNMENT);
        let size = data.len() as u64;
        if offset + size > self.capacity {
            return Err(RenderError::UniformRingExhausted {
                requested: size,
                capacity: self.capacity,
            });
        }
        self.staging.resize(offset as usize, 0);
        self.staging.extend_from_slice(data);
        self.write_offset = offset + size;
        Ok(RingAllocation { offset, size })
    }

    /// Upload everything pushed since the last flush and start a new epoch.
    pub fn flush<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if !self.staging.is_empty() {
            backend.write_buffer(self.buffer, 0, &self.staging);
        }
        self.staging.clear();
        self.write_offset = 0;
        self.epoch += 1;
    }
}

/// Align a value up to the given power-of-two alignment.
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_push_is_aligned() {
        let mut backend = RecordingBackend::default();
        let mut ring = UniformRing::new(&mut backend, 4096).unwrap();

        let a = ring.push(&[1u8; 64]).unwrap();
        let b = ring.push(&[2u8; 16]).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 256);
        assert_eq!(ring.used(), 272);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut backend = RecordingBackend::default();
        let mut ring = UniformRing::new(&mut backend, 512).unwrap();

        ring.push(&[0u8; 256]).unwrap();
        ring.push(&[0u8; 256]).unwrap();
        assert!(matches!(
            ring.push(&[0u8; 4]),
            Err(RenderError::UniformRingExhausted { .. })
        ));
    }

    #[test]
    fn test_flush_uploads_and_resets() {
        let mut backend = RecordingBackend::default();
        let mut ring = UniformRing::new(&mut backend, 1024).unwrap();

        ring.push(&[7u8; 8]).unwrap();
        ring.push(&[9u8; 8]).unwrap();
        ring.flush(&mut backend);

        let data = backend.buffer_data(ring.buffer()).unwrap();
        assert_eq!(&data[0..8], &[7u8; 8]);
        assert_eq!(&data[256..264], &[9u8; 8]);
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.epoch(), 1);
    }
}
