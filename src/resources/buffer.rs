//! Fixed-size vertex/index storage with append-only writes.
//!
//! A [`GpuBuffer`] holds an optional `u32` index region at its head followed by
//! planar vertex components: every component is written as one contiguous run of
//! `vertex_count` elements. The index region is reserved at construction, so
//! vector data always starts at [`GpuBuffer::index_end`] no matter in which order
//! indices and vectors are added.

use glam::{Vec2, Vec3};

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::context::GpuContext;
use crate::error::{RenderError, RenderResult};
use crate::resources::handle::Owned;

/// Bytes per vertex element (`f32`) and per index (`u32`).
pub const ELEMENT_SIZE: u64 = 4;

/// One component run written into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    pub offset: u64,
    /// Elements per vertex: 2 or 3
    pub width: u32,
}

impl BufferRegion {
    pub fn len(&self, vertex_count: u32) -> u64 {
        self.width as u64 * vertex_count as u64 * ELEMENT_SIZE
    }
}

/// Exact byte size of a buffer holding `widths` components for `vertex_count`
/// vertices plus `index_count` indices.
pub fn required_size(vertex_count: u32, widths: &[u32], index_count: u32) -> u64 {
    let vectors: u64 = widths.iter().map(|w| *w as u64).sum::<u64>() * vertex_count as u64;
    (vectors + index_count as u64) * ELEMENT_SIZE
}

pub struct GpuBuffer {
    label: String,
    buffer: Owned<BufferHandle>,
    size: u64,
    vertex_count: u32,
    component_count: u32,
    index_count: u32,
    index_end: u64,
    indices_written: bool,
    cursor: u64,
    regions: Vec<BufferRegion>,
}

impl GpuBuffer {
    /// Allocate `size_bytes` of uninitialized device storage.
    pub fn new<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        size_bytes: u64,
        vertex_count: u32,
        component_count: u32,
        index_count: u32,
    ) -> RenderResult<Self> {
        let index_end = index_count as u64 * ELEMENT_SIZE;
        if index_end > size_bytes {
            return Err(RenderError::BufferOverflow {
                label: label.to_string(),
                offset: 0,
                requested: index_end,
                capacity: size_bytes,
            });
        }
        let mut usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        if index_count > 0 {
            usage |= BufferUsage::INDEX;
        }
        let buffer = ctx.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: size_bytes,
            usage,
        })?;
        log::trace!(
            "Buffer '{}': {} bytes, {} vertices x {} components, {} indices",
            label,
            size_bytes,
            vertex_count,
            component_count,
            index_count
        );
        Ok(Self {
            label: label.to_string(),
            buffer,
            size: size_bytes,
            vertex_count,
            component_count,
            index_count,
            index_end,
            indices_written: false,
            cursor: index_end,
            regions: Vec::with_capacity(component_count as usize),
        })
    }

    /// Allocate a buffer sized exactly for the given component widths.
    pub fn with_components<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        vertex_count: u32,
        widths: &[u32],
        index_count: u32,
    ) -> RenderResult<Self> {
        let size = required_size(vertex_count, widths, index_count);
        Self::new(ctx, label, size, vertex_count, widths.len() as u32, index_count)
    }

    /// Write the index region at offset 0. Empty input is a no-op.
    pub fn add_indices<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        indices: &[u32],
    ) -> RenderResult<()> {
        if indices.is_empty() {
            return Ok(());
        }
        if indices.len() as u32 != self.index_count {
            return Err(RenderError::ElementCountMismatch {
                label: self.label.clone(),
                expected: self.index_count as usize,
                found: indices.len(),
            });
        }
        ctx.backend_mut()
            .write_buffer(self.buffer.handle(), 0, bytemuck::cast_slice(indices));
        self.indices_written = true;
        Ok(())
    }

    /// Append `vertex_count` three-component vectors. Returns where they landed.
    pub fn add_vectors3<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        data: &[Vec3],
    ) -> RenderResult<u64> {
        self.append(ctx, bytemuck::cast_slice(data), data.len(), 3)
    }

    /// Append `vertex_count` two-component vectors. Returns where they landed.
    pub fn add_vectors2<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        data: &[Vec2],
    ) -> RenderResult<u64> {
        self.append(ctx, bytemuck::cast_slice(data), data.len(), 2)
    }

    /// Append raw interleaved vertex data.
    pub fn add_interleaved<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        data: &[f32],
        widths: &[u32],
    ) -> RenderResult<u64> {
        let stride: u32 = widths.iter().sum();
        let expected = stride as usize * self.vertex_count as usize;
        if data.len() != expected {
            return Err(RenderError::ElementCountMismatch {
                label: self.label.clone(),
                expected,
                found: data.len(),
            });
        }
        let offset = self.write_at_cursor(ctx, bytemuck::cast_slice(data))?;
        self.regions.extend(widths.iter().map(|width| BufferRegion {
            offset,
            width: *width,
        }));
        Ok(offset)
    }

    fn append<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        bytes: &[u8],
        count: usize,
        width: u32,
    ) -> RenderResult<u64> {
        if count != self.vertex_count as usize {
            return Err(RenderError::ElementCountMismatch {
                label: self.label.clone(),
                expected: self.vertex_count as usize,
                found: count,
            });
        }
        let offset = self.write_at_cursor(ctx, bytes)?;
        self.regions.push(BufferRegion { offset, width });
        Ok(offset)
    }

    fn write_at_cursor<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        bytes: &[u8],
    ) -> RenderResult<u64> {
        let offset = self.cursor;
        let end = offset + bytes.len() as u64;
        if end > self.size {
            return Err(RenderError::BufferOverflow {
                label: self.label.clone(),
                offset,
                requested: bytes.len() as u64,
                capacity: self.size,
            });
        }
        ctx.backend_mut().write_buffer(self.buffer.handle(), offset, bytes);
        self.cursor = end;
        Ok(offset)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn component_count(&self) -> u32 {
        self.component_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }

    pub fn indices_written(&self) -> bool {
        self.indices_written
    }

    /// First byte after the index region; vertex data starts here.
    pub fn index_end(&self) -> u64 {
        self.index_end
    }

    /// Offset of the next append.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn regions(&self) -> &[BufferRegion] {
        &self.regions
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("label", &self.label)
            .field("handle", &self.buffer.handle())
            .field("size", &self.size)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn context() -> GpuContext<RecordingBackend> {
        GpuContext::new(RecordingBackend::default()).unwrap()
    }

    #[test]
    fn test_vectors_start_after_indices() {
        let mut ctx = context();
        let mut buffer = GpuBuffer::with_components(&mut ctx, "tri", 3, &[3, 2], 3).unwrap();
        assert_eq!(buffer.size(), (3 + 9 + 6) * 4);

        let positions = [Vec3::X, Vec3::Y, Vec3::Z];
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::Y];
        // Vectors first, indices last: the layout doesn't depend on call order.
        assert_eq!(buffer.add_vectors3(&mut ctx, &positions).unwrap(), 12);
        assert_eq!(buffer.add_vectors2(&mut ctx, &uvs).unwrap(), 48);
        buffer.add_indices(&mut ctx, &[0, 1, 2]).unwrap();
        assert_eq!(buffer.cursor(), buffer.size());

        let bytes = ctx.backend().buffer_data(buffer.handle()).unwrap();
        assert_eq!(&bytes[0..12], bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]));
        assert_eq!(&bytes[12..48], bytemuck::cast_slice::<Vec3, u8>(&positions));
        assert_eq!(&bytes[48..72], bytemuck::cast_slice::<Vec2, u8>(&uvs));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut ctx = context();
        let mut buffer = GpuBuffer::new(&mut ctx, "small", 24, 2, 1, 0).unwrap();
        buffer.add_vectors3(&mut ctx, &[Vec3::ONE, Vec3::ONE]).unwrap();
        let err = buffer.add_vectors2(&mut ctx, &[Vec2::ONE, Vec2::ONE]).unwrap_err();
        assert!(matches!(err, RenderError::BufferOverflow { offset: 24, requested: 16, .. }));
        // A failed write leaves the cursor alone.
        assert_eq!(buffer.cursor(), 24);
    }

    #[test]
    fn test_element_counts_are_checked() {
        let mut ctx = context();
        let mut buffer = GpuBuffer::with_components(&mut ctx, "quad", 4, &[3], 6).unwrap();
        assert!(matches!(
            buffer.add_vectors3(&mut ctx, &[Vec3::ZERO; 3]),
            Err(RenderError::ElementCountMismatch { expected: 4, found: 3, .. })
        ));
        assert!(matches!(
            buffer.add_indices(&mut ctx, &[0, 1, 2]),
            Err(RenderError::ElementCountMismatch { expected: 6, found: 3, .. })
        ));
        buffer.add_indices(&mut ctx, &[]).unwrap();
        assert!(!buffer.indices_written());
    }
}
