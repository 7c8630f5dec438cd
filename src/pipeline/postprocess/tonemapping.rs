//! Tonemapping and the final composite onto the display

use glam::Vec3;

use crate::backend::GraphicsBackend;
use crate::context::{DrawRange, GpuContext, PipelineState, SampledView};
use crate::error::RenderResult;
use crate::pipeline::{BLOOM_UNIT, SCENE_UNIT};
use crate::resources::Texture;
use crate::shader::ShaderProgram;

/// Exposure tone mapping, `1 - exp(-hdr * exposure)` per channel.
pub fn tonemap(hdr: Vec3, exposure: f32) -> Vec3 {
    let decay = |c: f32| 1.0 - (-c * exposure).exp();
    Vec3::new(decay(hdr.x), decay(hdr.y), decay(hdr.z))
}

/// Adds the bloom to the HDR scene, tone maps it and writes the display.
///
/// The only pass drawn with sRGB encoding on.
pub struct PostPass {
    program: ShaderProgram,
}

impl PostPass {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>) -> RenderResult<Self> {
        let mut program = ShaderProgram::builtin(ctx, "fullscreen.vert", "post.frag")?;
        program.try_set_sampler("scene", SCENE_UNIT)?;
        program.try_set_sampler("bloom_blur", BLOOM_UNIT)?;
        Ok(Self { program })
    }

    pub fn execute<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        scene: &Texture,
        bloom: Option<SampledView>,
        exposure: f32,
    ) -> RenderResult<()> {
        ctx.set_pass_label("Post");
        ctx.bind_display_target();
        ctx.set_state(PipelineState {
            srgb: true,
            ..PipelineState::fullscreen()
        });
        ctx.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        ctx.clear()?;

        scene.bind(ctx, SCENE_UNIT);
        match bloom {
            Some(view) => ctx.bind_texture_unit(BLOOM_UNIT, view),
            None => ctx.unbind_texture_unit(BLOOM_UNIT),
        }
        self.program.try_set("exposure", exposure)?;
        self.program.try_set("bloom_enabled", bloom.is_some())?;
        ctx.draw(&self.program, None, DrawRange::Vertices(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonemap_bounds() {
        assert_eq!(tonemap(Vec3::ZERO, 1.0), Vec3::ZERO);
        let bright = tonemap(Vec3::splat(1000.0), 1.0);
        assert!(bright.max_element() <= 1.0 && bright.min_element() > 0.99);
    }

    #[test]
    fn test_tonemap_is_monotonic_in_exposure() {
        let hdr = Vec3::new(0.2, 1.0, 4.0);
        let mut previous = tonemap(hdr, 0.1);
        for step in 2..20 {
            let current = tonemap(hdr, step as f32 * 0.1);
            assert!(current.cmpgt(previous).all());
            previous = current;
        }
    }
}
