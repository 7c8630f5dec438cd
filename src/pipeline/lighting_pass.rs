//! Lighting pass for deferred rendering
//!
//! Full-screen pass that reads the G-buffer and shades every pixel with the
//! directional light, the optional flashlight, the point lights and
//! image-based lighting. Writes the lit color to attachment 0 and the part
//! above the bloom threshold to attachment 1.

use glam::Mat4;

use crate::backend::{GraphicsBackend, TextureFormat};
use crate::context::{DrawRange, GpuContext, PipelineState, SampledView};
use crate::error::RenderResult;
use crate::pipeline::{
    BRDF_LUT_UNIT, G_ALBEDO_UNIT, G_METAL_ROUGH_AO_UNIT, G_NORMAL_UNIT, G_POSITION_UNIT, IRRADIANCE_UNIT,
    POINT_SHADOW_UNIT, PREFILTER_UNIT, SHADOW_MAP_UNIT,
};
use crate::resources::{Cubemap, CubemapStage, RenderTarget, Texture};
use crate::scene::{CameraState, Scene};
use crate::shader::ShaderProgram;

pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Everything the lighting pass samples besides the scene.
pub struct LightingInputs<'a> {
    pub gbuffer: &'a RenderTarget,
    pub light_space_matrix: Mat4,
    pub shadow_map: Option<SampledView>,
    pub point_shadow_maps: SampledView,
    pub brdf_lut: Option<&'a Texture>,
    pub ibl_enabled: bool,
    pub bloom_threshold: f32,
}

pub struct LightingPass {
    target: RenderTarget,
    program: ShaderProgram,
}

impl LightingPass {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<Self> {
        let mut program = ShaderProgram::builtin(ctx, "fullscreen.vert", "lighting.frag")?;
        let samplers = [
            ("g_position", G_POSITION_UNIT),
            ("g_normal", G_NORMAL_UNIT),
            ("g_albedo", G_ALBEDO_UNIT),
            ("g_metal_rough_ao", G_METAL_ROUGH_AO_UNIT),
            ("shadow_map", SHADOW_MAP_UNIT),
            ("point_shadow_maps", POINT_SHADOW_UNIT),
            ("irradiance_map", IRRADIANCE_UNIT),
            ("prefilter_map", PREFILTER_UNIT),
            ("brdf_lut", BRDF_LUT_UNIT),
        ];
        for (name, unit) in samplers {
            program.try_set_sampler(name, unit)?;
        }
        Ok(Self {
            target: Self::create_target(ctx, width, height)?,
            program,
        })
    }

    fn create_target<B: GraphicsBackend>(ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<RenderTarget> {
        let mut target = RenderTarget::new("Lighting");
        let color = Texture::render_target(ctx, "HDR Color", width, height, HDR_FORMAT)?;
        let bright = Texture::render_target(ctx, "Bright Color", width, height, HDR_FORMAT)?;
        target.attach_color_targets(vec![color, bright]);
        target.attach_depth_buffer(ctx, width, height)?;
        target.check();
        Ok(target)
    }

    pub fn resize<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<()> {
        self.target = Self::create_target(ctx, width, height)?;
        Ok(())
    }

    pub fn execute<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        inputs: &LightingInputs<'_>,
        scene: &Scene,
        camera: &CameraState,
    ) -> RenderResult<()> {
        ctx.set_pass_label("Lighting");
        ctx.set_state(PipelineState::fullscreen());
        ctx.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        self.target.clear(ctx)?;

        let gbuffer_units = [G_POSITION_UNIT, G_NORMAL_UNIT, G_ALBEDO_UNIT, G_METAL_ROUGH_AO_UNIT];
        for (index, unit) in gbuffer_units.into_iter().enumerate() {
            inputs.gbuffer.bind_color_attachment(ctx, index, unit)?;
        }
        match inputs.shadow_map {
            Some(view) => ctx.bind_texture_unit(SHADOW_MAP_UNIT, view),
            None => ctx.unbind_texture_unit(SHADOW_MAP_UNIT),
        }
        ctx.bind_texture_unit(POINT_SHADOW_UNIT, inputs.point_shadow_maps);
        let ibl = inputs.ibl_enabled && self.bind_ibl(ctx, &scene.cubemap, inputs.brdf_lut);

        let program = &mut self.program;
        program.try_set("light_space_matrix", inputs.light_space_matrix)?;
        program.try_set("view_position", camera.position)?;
        program.try_set("point_light_count", scene.point_lights().len() as u32)?;

        let sun = &scene.directional_light;
        program.try_set("dir_light.direction", sun.direction.normalize_or_zero())?;
        program.try_set("dir_light.color", sun.color)?;
        program.try_set("dir_light.intensity", sun.intensity)?;

        match scene.spot_light {
            Some(mut spot) => {
                spot.follow(camera);
                program.try_set("spot_light.position", spot.position)?;
                program.try_set("spot_light.direction", spot.direction)?;
                program.try_set("spot_light.color", spot.color)?;
                program.try_set("spot_light.intensity", spot.intensity)?;
                program.try_set("spot_light.cut_off", spot.cut_off)?;
                program.try_set("spot_light.outer_cut_off", spot.outer_cut_off)?;
                program.try_set("spot_light.enabled", true)?;
            }
            None => program.try_set("spot_light.enabled", false)?,
        }

        program.try_set_bytes("point_lights", bytemuck::cast_slice(scene.point_lights()))?;
        program.try_set("ibl_enabled", ibl)?;
        program.try_set("bloom_threshold", inputs.bloom_threshold)?;
        program.try_set("max_reflection_lod", scene.cubemap.max_reflection_lod())?;

        ctx.draw(&self.program, None, DrawRange::Vertices(3))
    }

    /// Bind the irradiance, prefilter and BRDF maps. Returns false, leaving
    /// the units on their fallbacks, when any of them is missing.
    fn bind_ibl<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, cubemap: &Cubemap, brdf_lut: Option<&Texture>) -> bool {
        let maps = match (cubemap.stage(), cubemap.irradiance(), cubemap.prefilter(), brdf_lut) {
            (CubemapStage::SpecularPrefiltered, Some(irradiance), Some(prefilter), Some(brdf)) => {
                Some((irradiance, prefilter, brdf))
            }
            _ => None,
        };
        match maps {
            Some((irradiance, prefilter, brdf)) => {
                irradiance.bind(ctx, IRRADIANCE_UNIT);
                prefilter.bind(ctx, PREFILTER_UNIT);
                brdf.bind(ctx, BRDF_LUT_UNIT);
                true
            }
            None => {
                for unit in [IRRADIANCE_UNIT, PREFILTER_UNIT, BRDF_LUT_UNIT] {
                    ctx.unbind_texture_unit(unit);
                }
                false
            }
        }
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Lit scene color.
    pub fn color(&self) -> Option<&Texture> {
        self.target.color_attachment(0)
    }

    /// Color above the bloom threshold.
    pub fn bright(&self) -> Option<&Texture> {
        self.target.color_attachment(1)
    }
}
