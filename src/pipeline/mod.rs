//! Deferred rendering pipeline
//!
//! Every frame runs the same eight steps:
//! 1. Directional shadow map
//! 2. Point light shadow cubes
//! 3. G-Buffer pass - geometry into four color targets and depth
//! 4. Lighting pass - fullscreen shading from the G-buffer into an HDR target
//! 5. Depth copy from the G-buffer into the HDR target
//! 6. Skybox behind the lit geometry
//! 7. Bloom blur of the bright attachment
//! 8. Tone mapping onto the display
//!
//! The steps are declared in a [`FrameGraph`] with the resources they read and
//! write; the renderer runs them in the compiled order.

pub mod gbuffer_pass;
pub mod ibl;
pub mod lighting_pass;
pub mod postprocess;
pub mod shadow;
pub mod skybox_pass;

pub use gbuffer_pass::GBufferPass;
pub use ibl::IblPrecompute;
pub use lighting_pass::{LightingInputs, LightingPass};
pub use postprocess::{BloomPass, PostPass};
pub use shadow::ShadowPass;
pub use skybox_pass::SkyboxPass;

use crate::backend::GraphicsBackend;
use crate::context::{GpuContext, DEFAULT_RING_CAPACITY};
use crate::error::{RenderError, RenderResult};
use crate::render_graph::FrameGraph;
use crate::resources::{BindKind, Cubemap, MaterialParams, Texture};
use crate::scene::{CameraState, Scene};

// Texture units, fixed for the lifetime of the renderer. Units 0-2 belong to
// the material maps.
pub const G_POSITION_UNIT: u32 = 3;
pub const G_NORMAL_UNIT: u32 = 4;
pub const G_ALBEDO_UNIT: u32 = 5;
pub const G_METAL_ROUGH_AO_UNIT: u32 = 6;
pub const SHADOW_MAP_UNIT: u32 = 7;
pub const POINT_SHADOW_UNIT: u32 = 8;
pub const IRRADIANCE_UNIT: u32 = 9;
pub const PREFILTER_UNIT: u32 = 10;
pub const BRDF_LUT_UNIT: u32 = 11;
pub const SKYBOX_UNIT: u32 = 12;
pub const BLUR_UNIT: u32 = 13;
pub const SCENE_UNIT: u32 = 14;
pub const BLOOM_UNIT: u32 = 15;

/// Size of the point light array in the lighting uniforms.
pub const MAX_POINT_LIGHTS: usize = 16;

/// Sizes of the image-based lighting maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblConfig {
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mips: u32,
    pub brdf_size: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 2048,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mips: 5,
            brdf_size: 512,
        }
    }
}

/// Configuration fixed when the renderer is built
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Number of point lights every rendered scene must have
    pub point_lights: usize,
    pub shadow_size: u32,
    pub point_shadow_size: u32,
    pub ibl: IblConfig,
    pub bloom_iterations: u32,
    /// Luminance above which the lighting pass writes to the bright attachment
    pub bloom_threshold: f32,
    /// Bytes in the uniform ring of the context
    pub ring_capacity: u64,
    /// Runtime knobs the renderer starts with
    pub settings: RenderSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            point_lights: 2,
            shadow_size: 2048,
            point_shadow_size: 1024,
            ibl: IblConfig::default(),
            bloom_iterations: 10,
            bloom_threshold: 1.0,
            ring_capacity: DEFAULT_RING_CAPACITY,
            settings: RenderSettings::default(),
        }
    }
}

/// Knobs that can change between frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub exposure: f32,
    /// Material for meshes that carry no parameters of their own
    pub material: MaterialParams,
    /// Overrides the directional light's shadow far plane
    pub shadow_far_plane: Option<f32>,
    pub ibl_enabled: bool,
    pub bloom_enabled: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            material: MaterialParams::default(),
            shadow_far_plane: None,
            ibl_enabled: true,
            bloom_enabled: true,
        }
    }
}

/// One step of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStep {
    DirectionalShadow,
    PointShadows,
    Geometry,
    Lighting,
    DepthBlit,
    Skybox,
    Bloom,
    Post,
}

/// The frame's steps with the resources each one reads and writes.
pub fn frame_graph() -> FrameGraph<FrameStep> {
    let mut graph = FrameGraph::new();
    graph.import("scene");
    graph.import("environment");

    graph.add_pass("Directional Shadow", FrameStep::DirectionalShadow, &["scene"], &["shadow_map"]);
    graph.add_pass("Point Shadows", FrameStep::PointShadows, &["scene"], &["point_shadow_maps"]);
    graph.add_pass("Geometry", FrameStep::Geometry, &["scene"], &["gbuffer", "gbuffer_depth"]);
    graph.add_pass(
        "Lighting",
        FrameStep::Lighting,
        &["gbuffer", "shadow_map", "point_shadow_maps", "environment"],
        &["hdr_color", "bright_color"],
    );
    graph.add_pass("Depth Blit", FrameStep::DepthBlit, &["gbuffer_depth"], &["lighting_depth"]);
    graph.add_pass(
        "Skybox",
        FrameStep::Skybox,
        &["environment", "lighting_depth", "hdr_color", "bright_color"],
        &["hdr_color", "bright_color"],
    );
    graph.add_pass("Bloom", FrameStep::Bloom, &["bright_color"], &["bloom_blur"]);
    graph.add_pass("Post", FrameStep::Post, &["hdr_color", "bloom_blur"], &["display"]);
    graph
}

/// Owns every pass, program and target of the deferred pipeline.
pub struct Renderer {
    config: RendererConfig,
    settings: RenderSettings,
    size: (u32, u32),
    schedule: Vec<FrameStep>,
    shadows: ShadowPass,
    gbuffer: GBufferPass,
    lighting: LightingPass,
    skybox: SkyboxPass,
    bloom: BloomPass,
    post: PostPass,
    ibl: IblPrecompute,
}

impl Renderer {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>, config: RendererConfig) -> RenderResult<Self> {
        if config.point_lights > MAX_POINT_LIGHTS {
            return Err(RenderError::TooManyPointLights {
                requested: config.point_lights,
                max: MAX_POINT_LIGHTS,
            });
        }

        let graph = frame_graph();
        let compiled = graph.compile()?;
        let schedule: Vec<FrameStep> = compiled
            .pass_order
            .iter()
            .filter_map(|id| graph.pass(*id))
            .map(|node| node.payload)
            .collect();
        log::debug!("Frame schedule: {:?}", schedule);

        let (width, height) = (config.width.max(1), config.height.max(1));
        let renderer = Self {
            shadows: ShadowPass::new(ctx, config.shadow_size, config.point_shadow_size, config.point_lights)?,
            gbuffer: GBufferPass::new(ctx, width, height)?,
            lighting: LightingPass::new(ctx, width, height)?,
            skybox: SkyboxPass::new(ctx)?,
            bloom: BloomPass::new(ctx, width, height, config.bloom_iterations)?,
            post: PostPass::new(ctx)?,
            ibl: IblPrecompute::new(ctx)?,
            settings: config.settings,
            size: (width, height),
            schedule,
            config,
        };
        log::info!(
            "Renderer ready: {}x{}, {} point lights",
            width,
            height,
            renderer.config.point_lights
        );
        Ok(renderer)
    }

    /// Run the IBL precompute for `cubemap`. Call once after loading it.
    pub fn precompute_ibl<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, cubemap: &mut Cubemap) -> RenderResult<()> {
        self.ibl.run(ctx, cubemap, &self.config.ibl)
    }

    /// Render and present one frame of `scene` seen from `camera`.
    pub fn begin_draw<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        scene: &Scene,
        camera: &CameraState,
    ) -> RenderResult<()> {
        self.check_scene(scene)?;
        ctx.begin_frame()?;
        let rendered = self.render(ctx, scene, camera);
        let ended = ctx.end_frame();
        rendered.and(ended)
    }

    /// Record every step of the frame. A frame must be in flight.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        scene: &Scene,
        camera: &CameraState,
    ) -> RenderResult<()> {
        self.check_scene(scene)?;
        for step in self.schedule.clone() {
            log::trace!("Frame step {:?}", step);
            self.execute(ctx, step, scene, camera)?;
        }
        Ok(())
    }

    fn check_scene(&self, scene: &Scene) -> RenderResult<()> {
        let found = scene.point_lights().len();
        if found != self.config.point_lights {
            return Err(RenderError::PointLightCountMismatch {
                expected: self.config.point_lights,
                found,
            });
        }
        Ok(())
    }

    fn execute<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        step: FrameStep,
        scene: &Scene,
        camera: &CameraState,
    ) -> RenderResult<()> {
        let projection = camera.projection_matrix(self.aspect());
        match step {
            FrameStep::DirectionalShadow => {
                self.shadows.render_directional(ctx, scene, self.settings.shadow_far_plane)
            }
            FrameStep::PointShadows => self.shadows.render_points(ctx, scene),
            FrameStep::Geometry => {
                self.gbuffer
                    .execute(ctx, scene, camera.view_matrix(), projection, &self.settings.material)
            }
            FrameStep::Lighting => {
                let inputs = LightingInputs {
                    gbuffer: self.gbuffer.target(),
                    light_space_matrix: self.shadows.light_space_matrix(),
                    shadow_map: self.shadows.shadow_map(),
                    point_shadow_maps: self.shadows.point_shadow_maps(),
                    brdf_lut: self.ibl.brdf_lut(),
                    ibl_enabled: self.settings.ibl_enabled,
                    bloom_threshold: self.config.bloom_threshold,
                };
                self.lighting.execute(ctx, &inputs, scene, camera)
            }
            FrameStep::DepthBlit => {
                self.gbuffer.target().bind(ctx, BindKind::Read);
                self.lighting.target().bind(ctx, BindKind::Draw);
                ctx.blit_depth()
            }
            FrameStep::Skybox => self.skybox.execute(
                ctx,
                self.lighting.target(),
                &scene.cubemap,
                camera.rotation_only_view(),
                projection,
                self.config.bloom_threshold,
            ),
            FrameStep::Bloom => {
                if !self.settings.bloom_enabled {
                    return Ok(());
                }
                let bright = lit_attachment(&self.lighting, 1)?;
                self.bloom.execute(ctx, bright)
            }
            FrameStep::Post => {
                let bloom = if self.settings.bloom_enabled {
                    Some(self.bloom.output(lit_attachment(&self.lighting, 1)?)?)
                } else {
                    None
                };
                let color = lit_attachment(&self.lighting, 0)?;
                self.post.execute(ctx, color, bloom, self.settings.exposure)
            }
        }
    }

    /// Rebuild the screen-sized targets. A zero-sized window is ignored.
    pub fn resize<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 || (width, height) == self.size {
            return Ok(());
        }
        log::debug!("Resizing renderer to {}x{}", width, height);
        ctx.resize(width, height);
        self.gbuffer.resize(ctx, width, height)?;
        self.lighting.resize(ctx, width, height)?;
        self.bloom.resize(ctx, width, height)?;
        self.size = (width, height);
        Ok(())
    }

    fn aspect(&self) -> f32 {
        self.size.0 as f32 / self.size.1 as f32
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    /// Steps in the order they run.
    pub fn schedule(&self) -> &[FrameStep] {
        &self.schedule
    }

    pub fn shadows(&self) -> &ShadowPass {
        &self.shadows
    }

    pub fn gbuffer(&self) -> &GBufferPass {
        &self.gbuffer
    }

    pub fn lighting(&self) -> &LightingPass {
        &self.lighting
    }

    pub fn brdf_lut(&self) -> Option<&Texture> {
        self.ibl.brdf_lut()
    }
}

fn lit_attachment(lighting: &LightingPass, index: usize) -> RenderResult<&Texture> {
    lighting
        .target()
        .color_attachment(index)
        .ok_or_else(|| RenderError::MissingAttachment {
            label: lighting.target().label().to_string(),
            index,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_follows_declaration_order() {
        let graph = frame_graph();
        let compiled = graph.compile().unwrap();
        let steps: Vec<FrameStep> = compiled
            .pass_order
            .iter()
            .map(|id| graph.pass(*id).unwrap().payload)
            .collect();
        assert_eq!(
            steps,
            vec![
                FrameStep::DirectionalShadow,
                FrameStep::PointShadows,
                FrameStep::Geometry,
                FrameStep::Lighting,
                FrameStep::DepthBlit,
                FrameStep::Skybox,
                FrameStep::Bloom,
                FrameStep::Post,
            ]
        );
    }

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.bloom_iterations, 10);
        assert_eq!(config.ibl.prefilter_mips, 5);
        assert!(config.point_lights <= MAX_POINT_LIGHTS);
        assert_eq!(config.settings, RenderSettings::default());
    }
}
