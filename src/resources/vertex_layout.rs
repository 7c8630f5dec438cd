//! Binding of buffer regions to vertex shader inputs.
//!
//! Component `i` of a buffer feeds `@location(i)`. The component at the texture
//! coordinate index is two floats wide, every other component three.

use crate::backend::{BufferHandle, GraphicsBackend, VertexAttribute, VertexBufferLayout, VertexFormat};
use crate::context::DrawRange;
use crate::error::{RenderError, RenderResult};
use crate::resources::buffer::{GpuBuffer, ELEMENT_SIZE};

/// Width in floats of component `index`.
pub fn component_width(index: u32, tex_coord_index: Option<u32>) -> u32 {
    if tex_coord_index == Some(index) {
        2
    } else {
        3
    }
}

/// Byte offsets of each planar component run, starting at `base`.
///
/// The last entry is the end of the final run, so the result has
/// `component_count + 1` entries.
pub fn planar_offsets(
    base: u64,
    vertex_count: u32,
    component_count: u32,
    tex_coord_index: Option<u32>,
) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(component_count as usize + 1);
    let mut offset = base;
    offsets.push(offset);
    for index in 0..component_count {
        offset += component_width(index, tex_coord_index) as u64 * vertex_count as u64 * ELEMENT_SIZE;
        offsets.push(offset);
    }
    offsets
}

/// How the components of a buffer are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// One binding point per component, each a contiguous run
    Planar,
    /// A single binding point with all components per vertex
    Interleaved,
}

/// Immutable vertex input description for one buffer.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    mode: LayoutMode,
    buffer: BufferHandle,
    layouts: Vec<VertexBufferLayout>,
    offsets: Vec<u64>,
    indexed: Option<u32>,
    vertex_count: u32,
    consumed: u64,
}

impl VertexLayout {
    /// One binding point per component.
    pub fn planar(buffer: &GpuBuffer, tex_coord_index: Option<u32>) -> RenderResult<Self> {
        let count = buffer.component_count();
        check_tex_coord_index(buffer, tex_coord_index);
        let bounds = planar_offsets(buffer.index_end(), buffer.vertex_count(), count, tex_coord_index);

        let layouts = (0..count)
            .map(|index| {
                let width = component_width(index, tex_coord_index);
                VertexBufferLayout {
                    array_stride: width as u64 * ELEMENT_SIZE,
                    attributes: vec![VertexAttribute {
                        location: index,
                        format: format_for(width),
                        offset: 0,
                    }],
                }
            })
            .collect();
        let consumed = bounds[bounds.len() - 1] - buffer.index_end();
        Self::finish(buffer, LayoutMode::Planar, layouts, bounds[..count as usize].to_vec(), consumed)
    }

    /// A single binding point; each vertex holds every component back to back.
    pub fn interleaved(buffer: &GpuBuffer, tex_coord_index: Option<u32>) -> RenderResult<Self> {
        let count = buffer.component_count();
        check_tex_coord_index(buffer, tex_coord_index);
        let mut attributes = Vec::with_capacity(count as usize);
        let mut stride = 0;
        for index in 0..count {
            let width = component_width(index, tex_coord_index);
            attributes.push(VertexAttribute {
                location: index,
                format: format_for(width),
                offset: stride,
            });
            stride += width as u64 * ELEMENT_SIZE;
        }
        let layouts = vec![VertexBufferLayout {
            array_stride: stride,
            attributes,
        }];
        let consumed = stride * buffer.vertex_count() as u64;
        Self::finish(buffer, LayoutMode::Interleaved, layouts, vec![buffer.index_end()], consumed)
    }

    fn finish(
        buffer: &GpuBuffer,
        mode: LayoutMode,
        layouts: Vec<VertexBufferLayout>,
        offsets: Vec<u64>,
        consumed: u64,
    ) -> RenderResult<Self> {
        let available = buffer.size() - buffer.index_end();
        if consumed > available {
            return Err(RenderError::BufferOverflow {
                label: buffer.label().to_string(),
                offset: buffer.index_end(),
                requested: consumed,
                capacity: buffer.size(),
            });
        }
        if consumed < available {
            log::warn!(
                "Vertex layout of '{}' leaves {} of {} bytes unused",
                buffer.label(),
                available - consumed,
                available
            );
        }
        Ok(Self {
            mode,
            buffer: buffer.handle(),
            layouts,
            offsets,
            indexed: buffer.is_indexed().then_some(buffer.index_count()),
            vertex_count: buffer.vertex_count(),
            consumed,
        })
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn buffer_layouts(&self) -> &[VertexBufferLayout] {
        &self.layouts
    }

    /// Starting byte offset of each binding point.
    pub fn binding_offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Vertex bytes the layout reads, excluding the index region.
    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
    }

    /// Range for drawing the whole buffer.
    pub fn draw_range(&self) -> DrawRange {
        match self.indexed {
            Some(count) => DrawRange::Indexed(count),
            None => DrawRange::Vertices(self.vertex_count),
        }
    }

    /// Set every binding point, and the index buffer if there is one.
    pub fn bind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        for (slot, offset) in self.offsets.iter().enumerate() {
            backend.set_vertex_buffer(slot as u32, self.buffer, *offset);
        }
        if self.indexed.is_some() {
            backend.set_index_buffer(self.buffer, 0);
        }
    }
}

fn format_for(width: u32) -> VertexFormat {
    VertexFormat::from_width(width).unwrap_or(VertexFormat::Float32x3)
}

fn check_tex_coord_index(buffer: &GpuBuffer, tex_coord_index: Option<u32>) {
    if let Some(index) = tex_coord_index {
        if index >= buffer.component_count() {
            log::warn!(
                "'{}' has {} components, texture coordinate index {} is ignored",
                buffer.label(),
                buffer.component_count(),
                index
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::context::GpuContext;

    #[test]
    fn test_planar_offsets() {
        // position, normal, uv for 4 vertices after 6 indices
        let offsets = planar_offsets(24, 4, 3, Some(2));
        assert_eq!(offsets, vec![24, 24 + 48, 24 + 96, 24 + 128]);
        assert_eq!(planar_offsets(0, 10, 1, None), vec![0, 120]);
    }

    #[test]
    fn test_interleaved_quad() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let buffer = GpuBuffer::with_components(&mut ctx, "screen", 4, &[3, 2], 0).unwrap();
        let layout = VertexLayout::interleaved(&buffer, Some(1)).unwrap();

        assert_eq!(layout.buffer_layouts().len(), 1);
        let attributes = &layout.buffer_layouts()[0].attributes;
        assert_eq!(layout.buffer_layouts()[0].array_stride, 20);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, VertexFormat::Float32x2);
        assert_eq!(layout.draw_range(), DrawRange::Vertices(4));
    }

    #[test]
    fn test_oversized_layout_is_rejected() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        // Sized for two 2-wide components but laid out as two 3-wide ones.
        let buffer = GpuBuffer::with_components(&mut ctx, "short", 3, &[2, 2], 0).unwrap();
        assert!(matches!(
            VertexLayout::planar(&buffer, None),
            Err(RenderError::BufferOverflow { .. })
        ));
    }
}
