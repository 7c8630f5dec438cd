//! PBR surface parameters fed to the geometry pass.

use glam::Vec3;

use crate::backend::GraphicsBackend;
use crate::context::GpuContext;
use crate::resources::texture::Texture;
use crate::shader::ShaderProgram;

/// Texture unit of the albedo map during the geometry pass.
pub const ALBEDO_UNIT: u32 = 0;
/// Texture unit of the metallic map during the geometry pass.
pub const METALLIC_UNIT: u32 = 1;
/// Texture unit of the roughness map during the geometry pass.
pub const ROUGHNESS_UNIT: u32 = 2;

/// Scalar material factors, used where no map is present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            albedo: Vec3::splat(0.8),
            metallic: 0.0,
            roughness: 0.5,
            ao: 1.0,
        }
    }
}

/// Maps and optional factors of one mesh.
#[derive(Debug, Default)]
pub struct Material {
    /// `None` uses the renderer's fallback factors
    pub params: Option<MaterialParams>,
    pub albedo_map: Option<Texture>,
    pub metallic_map: Option<Texture>,
    pub roughness_map: Option<Texture>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: MaterialParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_albedo_map(mut self, texture: Texture) -> Self {
        self.albedo_map = Some(texture);
        self
    }

    pub fn with_metallic_map(mut self, texture: Texture) -> Self {
        self.metallic_map = Some(texture);
        self
    }

    pub fn with_roughness_map(mut self, texture: Texture) -> Self {
        self.roughness_map = Some(texture);
        self
    }

    /// Bind the maps to the material units and write `material.*` uniforms.
    pub fn apply<B: GraphicsBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        program: &mut ShaderProgram,
        fallback: &MaterialParams,
    ) {
        let params = self.params.as_ref().unwrap_or(fallback);
        program.set_vec3("material.albedo", params.albedo);
        program.set_float("material.metallic", params.metallic);
        program.set_float("material.roughness", params.roughness);
        program.set_float("material.ao", params.ao);

        let maps = [
            ("material.has_albedo_map", ALBEDO_UNIT, &self.albedo_map),
            ("material.has_metallic_map", METALLIC_UNIT, &self.metallic_map),
            ("material.has_roughness_map", ROUGHNESS_UNIT, &self.roughness_map),
        ];
        for (flag, unit, map) in maps {
            match map {
                Some(texture) => texture.bind(ctx, unit),
                None => ctx.unbind_texture_unit(unit),
            }
            program.set_bool(flag, map.is_some());
        }
    }
}
