//! Skybox drawn behind the lit scene

use glam::Mat4;

use crate::backend::{CompareFunction, GraphicsBackend};
use crate::context::{GpuContext, PipelineState};
use crate::error::RenderResult;
use crate::pipeline::SKYBOX_UNIT;
use crate::resources::{BindKind, Cubemap, CubemapStage, RenderTarget};
use crate::shader::ShaderProgram;

pub struct SkyboxPass {
    program: ShaderProgram,
}

impl SkyboxPass {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>) -> RenderResult<Self> {
        let mut program = ShaderProgram::builtin(ctx, "skybox.vert", "skybox.frag")?;
        program.try_set_sampler("environment_map", SKYBOX_UNIT)?;
        Ok(Self { program })
    }

    /// Draw the sky into `target` wherever its depth is still at the far plane.
    ///
    /// `view` must carry rotation only.
    pub fn execute<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        target: &RenderTarget,
        cubemap: &Cubemap,
        view: Mat4,
        projection: Mat4,
        bloom_threshold: f32,
    ) -> RenderResult<()> {
        if cubemap.stage() == CubemapStage::Unloaded {
            log::debug!("No environment loaded, skipping skybox");
            return Ok(());
        }
        ctx.set_pass_label("Skybox");
        target.bind(ctx, BindKind::Draw);
        ctx.set_state(PipelineState {
            depth_test: true,
            depth_write: false,
            depth_compare: CompareFunction::LessEqual,
            ..Default::default()
        });
        self.program.try_set("view", view)?;
        self.program.try_set("projection", projection)?;
        self.program.try_set("bloom_threshold", bloom_threshold)?;
        cubemap.draw(ctx, &self.program, SKYBOX_UNIT)
    }
}
