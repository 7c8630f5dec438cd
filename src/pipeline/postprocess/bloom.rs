//! Bloom: separable Gaussian blur of the bright-pass image

use crate::backend::{GraphicsBackend, TextureFormat};
use crate::context::{DrawRange, GpuContext, PipelineState, SampledView};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::BLUR_UNIT;
use crate::resources::{RenderTarget, Texture};
use crate::shader::ShaderProgram;

/// Center tap first, then the taps one to four texels out on each side.
pub const GAUSSIAN_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

/// Bloom pass: blurs the bright image back and forth between two targets,
/// horizontally on even iterations and vertically on odd ones.
pub struct BloomPass {
    program: ShaderProgram,
    ping_pong: [RenderTarget; 2],
    iterations: u32,
}

impl BloomPass {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        width: u32,
        height: u32,
        iterations: u32,
    ) -> RenderResult<Self> {
        let mut program = ShaderProgram::builtin(ctx, "fullscreen.vert", "blur.frag")?;
        program.try_set_sampler("image", BLUR_UNIT)?;
        let weights: Vec<[f32; 4]> = GAUSSIAN_WEIGHTS.iter().map(|&w| [w, 0.0, 0.0, 0.0]).collect();
        program.try_set_bytes("weights", bytemuck::cast_slice(&weights))?;

        let ping_pong = [
            Self::create_target(ctx, "Bloom Ping", width, height)?,
            Self::create_target(ctx, "Bloom Pong", width, height)?,
        ];
        Ok(Self {
            program,
            ping_pong,
            iterations,
        })
    }

    fn create_target<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        width: u32,
        height: u32,
    ) -> RenderResult<RenderTarget> {
        let mut target = RenderTarget::new(label);
        let color = Texture::render_target(ctx, label, width, height, TextureFormat::Rgba16Float)?;
        target.attach_color_targets(vec![color]);
        target.check();
        Ok(target)
    }

    pub fn resize<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<()> {
        self.ping_pong = [
            Self::create_target(ctx, "Bloom Ping", width, height)?,
            Self::create_target(ctx, "Bloom Pong", width, height)?,
        ];
        Ok(())
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Blur `bright` for the configured number of iterations.
    pub fn execute<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, bright: &Texture) -> RenderResult<()> {
        ctx.set_pass_label("Bloom");
        ctx.set_state(PipelineState::fullscreen());
        for i in 0..self.iterations {
            let horizontal = i % 2 == 0;
            let source = match i {
                0 => bright.sampled(),
                _ => self.blurred(i - 1)?,
            };
            ctx.bind_texture_unit(BLUR_UNIT, source);
            self.program.try_set("horizontal", horizontal)?;

            // Each iteration gets its own pass so it can sample the previous one.
            ctx.set_clear_color([0.0, 0.0, 0.0, 1.0]);
            self.ping_pong[(i % 2) as usize].clear(ctx)?;
            ctx.draw(&self.program, None, DrawRange::Vertices(3))?;
        }
        Ok(())
    }

    /// The blurred image, or `bright` itself when bloom runs no iterations.
    pub fn output(&self, bright: &Texture) -> RenderResult<SampledView> {
        match self.iterations {
            0 => Ok(bright.sampled()),
            n => self.blurred(n - 1),
        }
    }

    fn blurred(&self, iteration: u32) -> RenderResult<SampledView> {
        let target = &self.ping_pong[(iteration % 2) as usize];
        target
            .color_attachment(0)
            .map(Texture::sampled)
            .ok_or_else(|| RenderError::MissingAttachment {
                label: target.label().to_string(),
                index: 0,
            })
    }
}

/// CPU version of the blur on one channel, sampling clamped to the edge.
pub fn blur_reference(image: &[f32], width: usize, height: usize, iterations: u32) -> Vec<f32> {
    let mut current = image.to_vec();
    let mut next = vec![0.0; current.len()];
    for i in 0..iterations {
        let horizontal = i % 2 == 0;
        for y in 0..height {
            for x in 0..width {
                let sample = |offset: isize| {
                    let (sx, sy) = if horizontal {
                        ((x as isize + offset).clamp(0, width as isize - 1) as usize, y)
                    } else {
                        (x, (y as isize + offset).clamp(0, height as isize - 1) as usize)
                    };
                    current[sy * width + sx]
                };
                let mut value = sample(0) * GAUSSIAN_WEIGHTS[0];
                for (tap, weight) in GAUSSIAN_WEIGHTS.iter().enumerate().skip(1) {
                    value += (sample(tap as isize) + sample(-(tap as isize))) * weight;
                }
                next[y * width + x] = value;
            }
        }
        std::mem::swap(&mut current, &mut next);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let total = GAUSSIAN_WEIGHTS[0] + 2.0 * GAUSSIAN_WEIGHTS[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let image = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(blur_reference(&image, 2, 2, 0), image);
    }
}
