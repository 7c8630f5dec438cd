//! Image-based lighting precompute
//!
//! Runs once at setup, after the environment is loaded: environment capture,
//! irradiance convolution, specular prefilter, then the BRDF lookup table.

use crate::backend::{GraphicsBackend, TextureFormat};
use crate::context::{GpuContext, PipelineState};
use crate::error::RenderResult;
use crate::resources::{Cubemap, CubemapPrograms, Mesh, MeshData, RenderTarget, Texture};
use crate::shader::ShaderProgram;

use super::IblConfig;

pub const BRDF_LUT_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

pub struct IblPrecompute {
    capture: RenderTarget,
    programs: CubemapPrograms,
    brdf_program: ShaderProgram,
    quad: Mesh,
    brdf_lut: Option<Texture>,
}

impl IblPrecompute {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>) -> RenderResult<Self> {
        Ok(Self {
            capture: RenderTarget::new("IBL Capture"),
            programs: CubemapPrograms::new(ctx)?,
            brdf_program: ShaderProgram::builtin(ctx, "brdf.vert", "brdf.frag")?,
            quad: Mesh::upload_interleaved(ctx, &MeshData::screen_quad())?,
            brdf_lut: None,
        })
    }

    /// Derive every IBL map of `cubemap` and submit the work.
    pub fn run<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        cubemap: &mut Cubemap,
        config: &IblConfig,
    ) -> RenderResult<()> {
        log::info!("Precomputing image-based lighting");
        cubemap.capture_environment(ctx, &mut self.capture, &mut self.programs, config.environment_size)?;
        cubemap.irradiance_convolution(ctx, &mut self.capture, &mut self.programs, config.irradiance_size)?;
        cubemap.specular_prefilter(
            ctx,
            &mut self.capture,
            &mut self.programs,
            config.prefilter_size,
            config.prefilter_mips,
        )?;
        self.integrate_brdf(ctx, config.brdf_size)?;
        ctx.submit();
        Ok(())
    }

    /// Render the split-sum BRDF table: scale and bias of F0 indexed by
    /// (n.v, roughness).
    pub fn integrate_brdf<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, size: u32) -> RenderResult<()> {
        let lut = Texture::render_target(ctx, "BRDF LUT", size, size, BRDF_LUT_FORMAT)?;
        ctx.set_pass_label("BRDF Integration");
        ctx.set_state(PipelineState::fullscreen());
        self.capture.attach_color_face(&lut, 0, 0)?;
        self.capture.resize(ctx, size, size)?;
        self.capture.is_complete()?;
        ctx.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        self.capture.clear(ctx)?;
        self.quad.draw(ctx, &self.brdf_program)?;

        log::info!("Integrated BRDF lookup table ({}x{})", size, size);
        self.brdf_lut = Some(lut);
        Ok(())
    }

    pub fn brdf_lut(&self) -> Option<&Texture> {
        self.brdf_lut.as_ref()
    }
}
