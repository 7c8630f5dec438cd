//! Shared setup for the renderer integration tests.
//!
//! Everything runs on the recording backend, so tests inspect the passes,
//! draws and copies the renderer would have submitted.

#![allow(dead_code)]

use glam::Vec3;

use deferred_renderer::backend::{RecordingBackend, TextureFormat};
use deferred_renderer::context::GpuContext;
use deferred_renderer::resources::{Cubemap, Material, MeshData, Model, TextureData};
use deferred_renderer::scene::{CameraState, PointLight, Transform};
use deferred_renderer::{IblConfig, RenderResult, RendererConfig, Scene};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 90;

/// Light positions used by the four-light scenes.
pub const CORNER_LIGHTS: [Vec3; 4] = [
    Vec3::new(-10.0, 10.0, 10.0),
    Vec3::new(10.0, 10.0, 10.0),
    Vec3::new(-10.0, -10.0, 10.0),
    Vec3::new(10.0, -10.0, 10.0),
];

// ============================================================================
// Context and configuration
// ============================================================================

pub fn context() -> GpuContext<RecordingBackend> {
    GpuContext::new(RecordingBackend::new(WIDTH, HEIGHT)).unwrap()
}

/// Renderer configuration with every map shrunk so the precompute stays cheap.
pub fn small_config(point_lights: usize) -> RendererConfig {
    RendererConfig {
        width: WIDTH,
        height: HEIGHT,
        point_lights,
        shadow_size: 64,
        point_shadow_size: 16,
        ibl: IblConfig {
            environment_size: 16,
            irradiance_size: 4,
            prefilter_size: 16,
            prefilter_mips: 3,
            brdf_size: 8,
        },
        bloom_iterations: 4,
        ..Default::default()
    }
}

// ============================================================================
// Scene builders
// ============================================================================

/// A small equirectangular environment of constant radiance.
pub fn hdr_environment(width: u32, height: u32, radiance: f32) -> TextureData {
    let texel = [radiance, radiance, radiance, 1.0].map(half::f16::from_f32);
    let texels: Vec<half::f16> = std::iter::repeat(texel)
        .take((width * height) as usize)
        .flatten()
        .collect();
    TextureData {
        width,
        height,
        format: TextureFormat::Rgba16Float,
        data: bytemuck::cast_slice(&texels).to_vec(),
    }
}

/// A unit sphere at the origin lit by one point light per position, with an
/// HDR environment loaded but not yet precomputed.
pub fn sphere_scene(ctx: &mut GpuContext<RecordingBackend>, lights: &[Vec3]) -> RenderResult<Scene> {
    let mut cubemap = Cubemap::new(ctx)?;
    cubemap.load_hdr_data(ctx, &hdr_environment(8, 4, 2.0))?;

    let mut scene = Scene::new(cubemap);
    let sphere = Model::from_mesh(ctx, &MeshData::sphere(16, 8), Material::new())?;
    scene.add_model(sphere, Transform::new());
    for position in lights {
        scene.add_point_light(PointLight::new(*position, Vec3::splat(300.0), 1.0, 25.0));
    }
    Ok(scene)
}

pub fn front_camera() -> CameraState {
    CameraState::looking_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO)
}
