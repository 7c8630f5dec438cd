//! Shadow map passes
//!
//! The directional light renders one orthographic depth map framed on the
//! scene's bounding sphere. Every point light renders the six faces of its own
//! layer range in a depth cube array, storing distance to the light divided by
//! the light radius.

use glam::Mat4;

use crate::backend::{CullMode, GraphicsBackend};
use crate::context::{GpuContext, PipelineState, SampledView};
use crate::error::RenderResult;
use crate::resources::cubemap::{cube_projection, face_views};
use crate::resources::{RenderTarget, Texture};
use crate::scene::Scene;
use crate::shader::ShaderProgram;

/// Near plane of the point light cube projections.
pub const POINT_SHADOW_NEAR: f32 = 0.1;

pub struct ShadowPass {
    directional: RenderTarget,
    directional_program: ShaderProgram,
    light_space_matrix: Mat4,
    point_maps: Texture,
    point_target: RenderTarget,
    point_program: ShaderProgram,
    light_count: usize,
}

impl ShadowPass {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        shadow_size: u32,
        point_shadow_size: u32,
        light_count: usize,
    ) -> RenderResult<Self> {
        let mut directional = RenderTarget::new("Directional Shadow");
        directional.attach_depth_buffer(ctx, shadow_size, shadow_size)?;
        directional.check();

        let point_maps = Texture::depth_cube_array(ctx, "Point Shadow Maps", point_shadow_size, light_count as u32)?;

        Ok(Self {
            directional,
            directional_program: ShaderProgram::builtin(ctx, "shadow_depth.vert", "shadow_depth.frag")?,
            light_space_matrix: Mat4::IDENTITY,
            point_maps,
            point_target: RenderTarget::new("Point Shadow"),
            point_program: ShaderProgram::builtin(ctx, "point_shadow.vert", "point_shadow.frag")?,
            light_count,
        })
    }

    /// Render the directional shadow map. `far_plane` overrides the light's own.
    pub fn render_directional<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        scene: &Scene,
        far_plane: Option<f32>,
    ) -> RenderResult<()> {
        let mut light = scene.directional_light;
        if let Some(far) = far_plane {
            light.shadow_far_plane = far;
        }
        let (center, radius) = scene.bounding_sphere();
        self.light_space_matrix = light.light_space_matrix(center, radius);

        ctx.set_pass_label("Directional Shadow");
        ctx.set_state(PipelineState::opaque());
        self.directional.clear(ctx)?;
        self.directional_program
            .try_set("light_space_matrix", self.light_space_matrix)?;
        for (model, transform) in scene.objects() {
            self.directional_program.try_set("model", transform.matrix())?;
            model.draw_geometry(ctx, &self.directional_program)?;
        }
        Ok(())
    }

    /// Render six faces per point light into the cube array.
    pub fn render_points<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, scene: &Scene) -> RenderResult<()> {
        ctx.set_pass_label("Point Shadows");
        ctx.set_state(PipelineState {
            cull_mode: CullMode::None,
            ..PipelineState::opaque()
        });
        for (index, light) in scene.point_lights().iter().take(self.light_count).enumerate() {
            let projection = cube_projection(POINT_SHADOW_NEAR, light.radius);
            self.point_program.try_set("light_position", light.position())?;
            self.point_program.try_set("far_plane", light.radius)?;

            for (face, view) in face_views(light.position()).into_iter().enumerate() {
                self.point_target
                    .attach_depth_face(&self.point_maps, (index * 6 + face) as u32)?;
                self.point_target.clear(ctx)?;
                self.point_program.try_set("shadow_matrix", projection * view)?;
                for (model, transform) in scene.objects() {
                    self.point_program.try_set("model", transform.matrix())?;
                    model.draw_geometry(ctx, &self.point_program)?;
                }
            }
        }
        Ok(())
    }

    pub fn light_space_matrix(&self) -> Mat4 {
        self.light_space_matrix
    }

    pub fn shadow_map(&self) -> Option<SampledView> {
        self.directional.depth_texture().map(Texture::sampled)
    }

    pub fn point_shadow_maps(&self) -> SampledView {
        self.point_maps.sampled()
    }

    pub fn light_count(&self) -> usize {
        self.light_count
    }

    pub fn directional_target(&self) -> &RenderTarget {
        &self.directional
    }
}
