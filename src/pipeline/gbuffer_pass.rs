//! G-Buffer pass for deferred rendering
//!
//! Renders scene geometry to multiple render targets:
//! - Position (world-space, RGBA16F)
//! - Normal (world-space, RGBA16F)
//! - Albedo (RGBA16F)
//! - Metallic, roughness, ambient occlusion (RGBA16F)
//! - Depth

use glam::Mat4;

use crate::backend::{GraphicsBackend, TextureFormat};
use crate::context::{GpuContext, PipelineState};
use crate::error::RenderResult;
use crate::resources::material::{ALBEDO_UNIT, METALLIC_UNIT, ROUGHNESS_UNIT};
use crate::resources::{MaterialParams, RenderTarget, Texture};
use crate::scene::Scene;
use crate::shader::ShaderProgram;

pub const GBUFFER_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Attachment labels in output location order.
pub const GBUFFER_ATTACHMENTS: [&str; 4] = ["Position", "Normal", "Albedo", "Metal Rough AO"];

/// G-Buffer pass that renders geometry data
pub struct GBufferPass {
    target: RenderTarget,
    program: ShaderProgram,
}

impl GBufferPass {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<Self> {
        let mut program = ShaderProgram::builtin(ctx, "gbuffer.vert", "gbuffer.frag")?;
        program.try_set_sampler("albedo_map", ALBEDO_UNIT)?;
        program.try_set_sampler("metallic_map", METALLIC_UNIT)?;
        program.try_set_sampler("roughness_map", ROUGHNESS_UNIT)?;
        Ok(Self {
            target: Self::create_target(ctx, width, height)?,
            program,
        })
    }

    fn create_target<B: GraphicsBackend>(ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<RenderTarget> {
        let mut target = RenderTarget::new("G-Buffer");
        let colors = GBUFFER_ATTACHMENTS
            .iter()
            .map(|name| Texture::render_target(ctx, &format!("G-Buffer {name}"), width, height, GBUFFER_FORMAT))
            .collect::<RenderResult<Vec<_>>>()?;
        target.attach_color_targets(colors);
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
        scene: &Scene,
        view: Mat4,
        projection: Mat4,
        material: &MaterialParams,
    ) -> RenderResult<()> {
        ctx.set_pass_label("Geometry");
        ctx.set_state(PipelineState::opaque());
        // Zero normals mark pixels no geometry covered.
        ctx.set_clear_color([0.0; 4]);
        self.target.clear(ctx)?;

        self.program.try_set("view", view)?;
        self.program.try_set("projection", projection)?;
        for (model, transform) in scene.objects() {
            self.program.try_set("model", transform.matrix())?;
            self.program.try_set("normal_matrix", transform.normal_matrix())?;
            model.draw(ctx, &mut self.program, material)?;
        }
        Ok(())
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }
}
