//! Models: meshes paired with their materials.

use glam::Vec3;

use crate::backend::GraphicsBackend;
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::resources::material::{Material, MaterialParams};
use crate::resources::mesh::{Mesh, MeshData};
use crate::shader::ShaderProgram;

#[derive(Debug)]
pub struct Model {
    name: String,
    meshes: Vec<(Mesh, Material)>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meshes: Vec::new(),
        }
    }

    /// A model made of one uploaded mesh.
    pub fn from_mesh<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        data: &MeshData,
        material: Material,
    ) -> RenderResult<Self> {
        let mut model = Self::new(&data.label);
        model.add_mesh(Mesh::upload(ctx, data)?, material);
        Ok(model)
    }

    pub fn add_mesh(&mut self, mesh: Mesh, material: Material) {
        self.meshes.push((mesh, material));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().map(|(mesh, _)| mesh)
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.meshes.iter_mut().map(|(_, material)| material)
    }

    /// Object-space bounds of every mesh, `None` for an empty model.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.meshes()
            .map(Mesh::bounds)
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
    }

    /// Draw every mesh with its material bound.
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        program: &mut ShaderProgram,
        fallback: &MaterialParams,
    ) -> RenderResult<()> {
        for (mesh, material) in &self.meshes {
            material.apply(ctx, program, fallback);
            mesh.draw(ctx, program)?;
        }
        Ok(())
    }

    /// Draw geometry only, for depth passes. Materials are left untouched.
    pub fn draw_geometry<B: GraphicsBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        program: &ShaderProgram,
    ) -> RenderResult<()> {
        for mesh in self.meshes() {
            mesh.draw(ctx, program)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingBackend, TextureFormat};
    use crate::context::{DrawTarget, PipelineState, Sampling, TargetBinding};
    use crate::resources::material::ALBEDO_UNIT;
    use crate::resources::render_target::{BindKind, RenderTarget};
    use crate::resources::texture::{Texture, TextureData};

    #[test]
    fn test_draw_sets_material_flags() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let mut program = ShaderProgram::builtin(&mut ctx, "gbuffer.vert", "gbuffer.frag").unwrap();
        program.set_sampler("albedo_map", ALBEDO_UNIT);

        let albedo = Texture::from_data(&mut ctx, "red", &TextureData::solid([255, 0, 0, 255]), Sampling::repeat()).unwrap();
        let albedo_view = albedo.sampled();
        let model = Model::from_mesh(&mut ctx, &MeshData::cube(), Material::new().with_albedo_map(albedo)).unwrap();

        let mut target = RenderTarget::new("G-Buffer");
        let colors = (0..4)
            .map(|i| Texture::render_target(&mut ctx, &format!("g{i}"), 8, 8, TextureFormat::Rgba16Float).unwrap())
            .collect();
        target.attach_color_targets(colors);
        target.attach_depth_buffer(&mut ctx, 8, 8).unwrap();
        target.bind(&mut ctx, BindKind::Draw);
        ctx.set_state(PipelineState::opaque());
        model.draw(&mut ctx, &mut program, &MaterialParams::default()).unwrap();

        assert_eq!(ctx.texture_unit(ALBEDO_UNIT), Some(albedo_view));
        assert_eq!(program.uniform_data("material.has_albedo_map"), Some(&1u32.to_ne_bytes()[..]));
        assert_eq!(program.uniform_data("material.has_metallic_map"), Some(&0u32.to_ne_bytes()[..]));
        assert_eq!(ctx.stats().total_draws(), 1);
        assert!(matches!(ctx.draw_target(), DrawTarget::Offscreen(TargetBinding { .. })));
    }
}
