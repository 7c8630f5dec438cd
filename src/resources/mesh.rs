//! Mesh data generation and upload.
//!
//! [`MeshData`] is plain CPU-side geometry, produced by the shape factories.
//! [`Mesh`] is the uploaded version: one [`GpuBuffer`] with the components laid
//! out planar (positions, then normals, then texture coordinates) and the
//! [`VertexLayout`] that feeds them to `@location(0..)`.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::backend::GraphicsBackend;
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::resources::buffer::GpuBuffer;
use crate::resources::vertex_layout::VertexLayout;
use crate::shader::ShaderProgram;

/// Outward normal, and two edge directions with `u x v == normal`, per cube face.
const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
];

/// CPU-side geometry. `normals` and `uvs` are either empty or one per position.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub label: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        if self.indices.is_empty() {
            self.vertex_count() / 3
        } else {
            self.index_count() / 3
        }
    }

    /// Component widths in upload order.
    pub fn component_widths(&self) -> Vec<u32> {
        let mut widths = vec![3];
        if !self.normals.is_empty() {
            widths.push(3);
        }
        if !self.uvs.is_empty() {
            widths.push(2);
        }
        widths
    }

    /// Component index of the texture coordinates, if there are any.
    pub fn tex_coord_index(&self) -> Option<u32> {
        (!self.uvs.is_empty()).then(|| self.component_widths().len() as u32 - 1)
    }

    /// Axis-aligned bounds of the positions.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.positions.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        )
    }

    /// Unit cube centered at the origin, 24 vertices with per-face normals.
    pub fn cube() -> Self {
        let mut mesh = MeshData::new("cube");
        let corners: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let uvs = [Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0)];

        for (face, (normal, u, v)) in CUBE_FACES.iter().enumerate() {
            for ((a, b), uv) in corners.iter().zip(uvs) {
                mesh.positions.push((*normal + *u * *a + *v * *b) * 0.5);
                mesh.normals.push(*normal);
                mesh.uvs.push(uv);
            }
            let base = face as u32 * 4;
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Unit sphere (radius 1).
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = MeshData::new("sphere");
        let segment_angle = 2.0 * PI / segments as f32;
        let ring_angle = PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let (ring_radius, y) = phi.sin_cos();
            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let position = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                mesh.positions.push(position);
                mesh.normals.push(position.normalize_or_zero());
                mesh.uvs.push(Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                ));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }
        mesh
    }

    /// Floor quad in the XZ plane spanning [-1, 1], facing +Y, texture tiled twice.
    pub fn quad() -> Self {
        let mut mesh = MeshData::new("quad");
        mesh.positions = vec![
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(-1.0, 0.0, -1.0),
        ];
        mesh.normals = vec![Vec3::Y; 4];
        mesh.uvs = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        mesh.indices = vec![0, 1, 2, 0, 2, 3];
        mesh
    }

    /// 36 position-only vertices of the [-1, 1] cube, for skyboxes and cube captures.
    pub fn skybox_cube() -> Self {
        let mut mesh = MeshData::new("skybox");
        let corners: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (normal, u, v) in CUBE_FACES {
            let quad: Vec<Vec3> = corners.iter().map(|(a, b)| normal + u * *a + v * *b).collect();
            for index in [0, 1, 2, 0, 2, 3] {
                mesh.positions.push(quad[index]);
            }
        }
        mesh
    }

    /// Clip-space quad with texture coordinates, `v` pointing down.
    pub fn screen_quad() -> Self {
        let mut mesh = MeshData::new("screen_quad");
        mesh.positions = vec![
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ];
        mesh.uvs = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
        ];
        mesh.indices = vec![0, 1, 2, 2, 1, 3];
        mesh
    }
}

/// Geometry uploaded to the GPU.
#[derive(Debug)]
pub struct Mesh {
    label: String,
    buffer: GpuBuffer,
    layout: VertexLayout,
    bounds: (Vec3, Vec3),
}

impl Mesh {
    /// Upload with one binding point per component.
    pub fn upload<B: GraphicsBackend>(ctx: &mut GpuContext<B>, data: &MeshData) -> RenderResult<Self> {
        let mut buffer = Self::allocate(ctx, data)?;
        buffer.add_indices(ctx, &data.indices)?;
        buffer.add_vectors3(ctx, &data.positions)?;
        if !data.normals.is_empty() {
            buffer.add_vectors3(ctx, &data.normals)?;
        }
        if !data.uvs.is_empty() {
            buffer.add_vectors2(ctx, &data.uvs)?;
        }
        let layout = VertexLayout::planar(&buffer, data.tex_coord_index())?;
        Ok(Self {
            label: data.label.clone(),
            buffer,
            layout,
            bounds: data.bounds(),
        })
    }

    /// Upload with every component of a vertex stored together.
    pub fn upload_interleaved<B: GraphicsBackend>(ctx: &mut GpuContext<B>, data: &MeshData) -> RenderResult<Self> {
        let mut buffer = Self::allocate(ctx, data)?;
        buffer.add_indices(ctx, &data.indices)?;

        let widths = data.component_widths();
        let mut interleaved = Vec::with_capacity(widths.iter().sum::<u32>() as usize * data.positions.len());
        for (index, position) in data.positions.iter().enumerate() {
            interleaved.extend_from_slice(&position.to_array());
            if let Some(normal) = data.normals.get(index) {
                interleaved.extend_from_slice(&normal.to_array());
            }
            if let Some(uv) = data.uvs.get(index) {
                interleaved.extend_from_slice(&uv.to_array());
            }
        }
        buffer.add_interleaved(ctx, &interleaved, &widths)?;
        let layout = VertexLayout::interleaved(&buffer, data.tex_coord_index())?;
        Ok(Self {
            label: data.label.clone(),
            buffer,
            layout,
            bounds: data.bounds(),
        })
    }

    fn allocate<B: GraphicsBackend>(ctx: &mut GpuContext<B>, data: &MeshData) -> RenderResult<GpuBuffer> {
        GpuBuffer::with_components(
            ctx,
            &data.label,
            data.vertex_count(),
            &data.component_widths(),
            data.index_count(),
        )
    }

    /// Draw the whole mesh with `program` and the current context state.
    pub fn draw<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, program: &ShaderProgram) -> RenderResult<()> {
        ctx.draw(program, Some(&self.layout), self.layout.draw_range())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Object-space (min, max) corners.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &MeshData) {
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[triangle[i] as usize]);
            let face_normal = (b - a).cross(c - a);
            if face_normal.length() < 1e-6 {
                continue;
            }
            let center = (a + b + c) / 3.0;
            assert!(face_normal.dot(center) > 0.0, "{}: inward triangle {:?}", mesh.label, triangle);
        }
    }

    #[test]
    fn test_cube() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.bounds(), (Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert_eq!(cube.tex_coord_index(), Some(2));
        assert_outward(&cube);
    }

    #[test]
    fn test_sphere_is_unit_and_outward() {
        let sphere = MeshData::sphere(16, 8);
        assert_eq!(sphere.vertex_count(), 17 * 9);
        for position in &sphere.positions {
            assert!((position.length() - 1.0).abs() < 1e-5);
        }
        assert_outward(&sphere);
    }

    #[test]
    fn test_skybox_cube() {
        let skybox = MeshData::skybox_cube();
        assert_eq!(skybox.vertex_count(), 36);
        assert!(skybox.indices.is_empty());
        assert!(skybox.normals.is_empty() && skybox.uvs.is_empty());
        assert_eq!(skybox.bounds(), (Vec3::NEG_ONE, Vec3::ONE));
        assert_eq!(skybox.component_widths(), vec![3]);
    }

    #[test]
    fn test_upload_layouts() {
        use crate::backend::RecordingBackend;
        use crate::context::DrawRange;
        use crate::resources::vertex_layout::LayoutMode;

        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let cube = Mesh::upload(&mut ctx, &MeshData::cube()).unwrap();
        assert_eq!(cube.layout().mode(), LayoutMode::Planar);
        assert_eq!(cube.layout().binding_offsets(), &[144, 144 + 288, 144 + 576]);
        assert_eq!(cube.layout().draw_range(), DrawRange::Indexed(36));
        assert_eq!(cube.buffer().cursor(), cube.buffer().size());

        let quad = Mesh::upload_interleaved(&mut ctx, &MeshData::screen_quad()).unwrap();
        assert_eq!(quad.layout().mode(), LayoutMode::Interleaved);
        assert_eq!(quad.layout().consumed_bytes(), 4 * 20);
    }
}
