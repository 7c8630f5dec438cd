//! End-to-end frames through the deferred pipeline on the recording backend.
//!
//! ```bash
//! cargo test --test renderer_tests
//! ```

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{context, front_camera, small_config, sphere_scene, CORNER_LIGHTS, HEIGHT, WIDTH};
use deferred_renderer::backend::{BindGroupEntry, LoadOp, TextureFormat};
use deferred_renderer::pipeline::gbuffer_pass::{GBUFFER_ATTACHMENTS, GBUFFER_FORMAT};
use deferred_renderer::pipeline::lighting_pass::HDR_FORMAT;
use deferred_renderer::pipeline::{FrameStep, MAX_POINT_LIGHTS};
use deferred_renderer::resources::{Cubemap, CubemapStage};
use deferred_renderer::scene::PointLight;
use deferred_renderer::{RenderError, Renderer, Scene};

// ============================================================================
// Full frame
// ============================================================================

#[test]
fn test_frame_draw_counts() {
    let mut ctx = context();
    let mut scene = sphere_scene(&mut ctx, &CORNER_LIGHTS).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(4)).unwrap();
    renderer.precompute_ibl(&mut ctx, &mut scene.cubemap).unwrap();
    assert_eq!(scene.cubemap.stage(), CubemapStage::SpecularPrefiltered);
    assert!(renderer.brdf_lut().is_some());

    ctx.backend_mut().clear_events();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    let stats = ctx.stats();
    // Six faces per light, one model.
    assert_eq!(stats.draws_in("Point Shadows"), 24);
    assert_eq!(stats.draws_in("Directional Shadow"), 1);
    assert_eq!(stats.draws_in("Geometry"), 1);
    assert_eq!(stats.draws_in("Lighting"), 1);
    assert_eq!(stats.draws_in("Skybox"), 1);
    assert_eq!(stats.draws_in("Bloom"), 4);
    assert_eq!(stats.draws_in("Post"), 1);
    assert_eq!(stats.copies, 1);
    assert_eq!(ctx.backend().presented_frames(), 1);
}

#[test]
fn test_shadow_and_geometry_passes_clear_their_targets() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(4)).unwrap();
    ctx.backend_mut().clear_events();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    let backend = ctx.backend();
    let shadow = backend.passes_labeled("Directional Shadow").next().unwrap();
    assert!(shadow.descriptor.color_attachments.is_empty());
    let depth = shadow.descriptor.depth_stencil_attachment.as_ref().unwrap();
    assert!(matches!(depth.depth_load_op, LoadOp::Clear(_)));
    assert_eq!(depth.depth_clear_value, 1.0);
    assert_eq!(backend.view_format(depth.view), Some(TextureFormat::Depth32Float));
    assert!(shadow.draws.iter().all(|draw| draw.call.element_count() > 0));

    let geometry = backend.passes_labeled("Geometry").next().unwrap();
    assert_eq!(geometry.descriptor.color_attachments.len(), GBUFFER_ATTACHMENTS.len());
    for attachment in &geometry.descriptor.color_attachments {
        assert_eq!(backend.view_format(attachment.view), Some(GBUFFER_FORMAT));
    }
    assert!(geometry.descriptor.depth_stencil_attachment.is_some());
}

#[test]
fn test_albedo_is_cleared_and_drawn_before_lighting_samples_it() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(4)).unwrap();
    ctx.backend_mut().clear_events();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    let backend = ctx.backend();
    let albedo_index = GBUFFER_ATTACHMENTS.iter().position(|name| *name == "Albedo").unwrap();
    let labels: Vec<&str> = backend.passes().map(|pass| pass.label()).collect();
    let geometry_at = labels.iter().position(|label| *label == "Geometry").unwrap();
    let lighting_at = labels.iter().position(|label| *label == "Lighting").unwrap();
    assert!(geometry_at < lighting_at, "{labels:?}");

    let geometry = backend.passes_labeled("Geometry").next().unwrap();
    let albedo = &geometry.descriptor.color_attachments[albedo_index];
    assert!(matches!(albedo.load_op, LoadOp::Clear(_)));
    let albedo_texture = backend.view_source(albedo.view).map(|(texture, _)| *texture).unwrap();
    let geometry_draws: usize = backend.passes_labeled("Geometry").map(|pass| pass.draws.len()).sum();
    assert!(geometry_draws > 0);

    let lighting = backend.passes_labeled("Lighting").next().unwrap();
    let samples_albedo = lighting.draws.iter().any(|draw| {
        draw.bind_groups.values().any(|(group, _)| {
            backend.bind_group_entries(*group).map_or(false, |entries| {
                entries.iter().any(|(_, entry)| match entry {
                    BindGroupEntry::Texture(view) => {
                        backend.view_source(*view).map(|(texture, _)| *texture) == Some(albedo_texture)
                    }
                    _ => false,
                })
            })
        })
    });
    assert!(samples_albedo);
}

#[test]
fn test_only_the_display_pass_encodes_srgb() {
    let mut ctx = context();
    let mut scene = sphere_scene(&mut ctx, &CORNER_LIGHTS).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(4)).unwrap();
    renderer.precompute_ibl(&mut ctx, &mut scene.cubemap).unwrap();
    ctx.backend_mut().clear_events();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    let backend = ctx.backend();
    let mut display_passes = 0;
    for pass in backend.passes() {
        for attachment in &pass.descriptor.color_attachments {
            let srgb = backend.view_format(attachment.view).map_or(false, |f| f.is_srgb());
            let swapchain = backend.is_swapchain_view(attachment.view);
            if pass.label() == "Post" {
                assert!(srgb && swapchain, "post pass must draw to the sRGB swapchain view");
                display_passes += 1;
            } else {
                assert!(!srgb, "{} writes an sRGB attachment", pass.label());
                assert!(!swapchain, "{} writes the display", pass.label());
            }
        }
    }
    assert_eq!(display_passes, 1);
}

#[test]
fn test_intermediate_targets_are_floating_point() {
    let mut ctx = context();
    let renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    assert_eq!(renderer.gbuffer().target().color_formats(), vec![GBUFFER_FORMAT; 4]);
    assert_eq!(renderer.lighting().target().color_formats(), vec![HDR_FORMAT; 2]);
    assert_eq!(renderer.gbuffer().target().size(), (WIDTH, HEIGHT));
}

#[test]
fn test_frames_without_environment_or_ibl() {
    let mut ctx = context();
    let mut scene = Scene::new(Cubemap::new(&mut ctx).unwrap());
    scene.add_point_light(PointLight::new(Vec3::new(0.0, 5.0, 5.0), Vec3::ONE, 1.0, 25.0));

    let mut renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    assert!(renderer.brdf_lut().is_none());
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    let stats = ctx.stats();
    assert_eq!(stats.draws_in("Skybox"), 0);
    assert_eq!(stats.draws_in("Geometry"), 0);
    assert_eq!(stats.draws_in("Lighting"), 1);
    assert_eq!(stats.draws_in("Post"), 1);
}

#[test]
fn test_disabled_bloom_skips_blur() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS[..2]).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(2)).unwrap();
    renderer.settings_mut().bloom_enabled = false;
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();

    assert_eq!(ctx.stats().passes_labeled("Bloom"), 0);
    assert_eq!(ctx.stats().draws_in("Post"), 1);
}

#[test]
fn test_configured_settings_apply_from_the_first_frame() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS[..2]).unwrap();
    let mut config = small_config(2);
    config.settings.exposure = 2.5;
    config.settings.bloom_enabled = false;
    let mut renderer = Renderer::new(&mut ctx, config).unwrap();
    assert_eq!(renderer.settings().exposure, 2.5);

    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();
    assert_eq!(ctx.stats().passes_labeled("Bloom"), 0);
    assert_eq!(ctx.stats().draws_in("Post"), 1);
}

#[test]
fn test_consecutive_frames_reset_stats() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS[..1]).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    ctx.backend_mut().clear_events();

    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();
    let first = ctx.stats().clone();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();
    assert_eq!(ctx.stats(), &first);
    assert_eq!(ctx.backend().presented_frames(), 2);
}

// ============================================================================
// Schedule
// ============================================================================

#[test]
fn test_schedule_runs_every_step_in_order() {
    let mut ctx = context();
    let renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    assert_eq!(
        renderer.schedule(),
        &[
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

// ============================================================================
// Point light count
// ============================================================================

#[rstest]
#[case::one_missing(4, 3)]
#[case::one_extra(2, 3)]
#[case::none(1, 0)]
fn test_point_light_count_must_match(#[case] configured: usize, #[case] present: usize) {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS[..present]).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(configured)).unwrap();
    ctx.backend_mut().clear_events();

    let result = renderer.begin_draw(&mut ctx, &scene, &front_camera());
    assert!(matches!(
        result,
        Err(RenderError::PointLightCountMismatch { expected, found })
            if expected == configured && found == present
    ));
    // The frame never began.
    assert_eq!(ctx.backend().presented_frames(), 0);
    assert_eq!(ctx.backend().passes().count(), 0);
}

#[rstest]
#[case::one_over(MAX_POINT_LIGHTS + 1)]
#[case::far_over(64)]
fn test_point_light_cap(#[case] requested: usize) {
    let mut ctx = context();
    let result = Renderer::new(&mut ctx, small_config(requested));
    assert!(matches!(
        result,
        Err(RenderError::TooManyPointLights { requested: r, max })
            if r == requested && max == MAX_POINT_LIGHTS
    ));
}

#[test]
fn test_point_light_cap_is_inclusive() {
    let mut ctx = context();
    let lights: Vec<Vec3> = (0..MAX_POINT_LIGHTS)
        .map(|i| Vec3::new(i as f32 - 8.0, 4.0, 6.0))
        .collect();
    let scene = sphere_scene(&mut ctx, &lights).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(MAX_POINT_LIGHTS)).unwrap();
    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();
    assert_eq!(ctx.stats().draws_in("Point Shadows"), 6 * MAX_POINT_LIGHTS);
}

// ============================================================================
// Resize
// ============================================================================

#[rstest]
#[case::zero_width(0, 50)]
#[case::zero_height(50, 0)]
#[case::unchanged(WIDTH, HEIGHT)]
fn test_resize_ignores_degenerate_sizes(#[case] width: u32, #[case] height: u32) {
    let mut ctx = context();
    let mut renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    renderer.resize(&mut ctx, width, height).unwrap();
    assert_eq!(renderer.size(), (WIDTH, HEIGHT));
}

#[test]
fn test_resize_rebuilds_screen_targets() {
    let mut ctx = context();
    let scene = sphere_scene(&mut ctx, &CORNER_LIGHTS[..1]).unwrap();
    let mut renderer = Renderer::new(&mut ctx, small_config(1)).unwrap();
    renderer.resize(&mut ctx, 320, 180).unwrap();

    assert_eq!(renderer.size(), (320, 180));
    assert_eq!(renderer.gbuffer().target().size(), (320, 180));
    assert_eq!(renderer.lighting().target().size(), (320, 180));
    assert_eq!(renderer.lighting().target().depth_size(), Some((320, 180)));
    // Shadow maps keep their configured size.
    assert_eq!(renderer.shadows().directional_target().size(), (64, 64));

    renderer.begin_draw(&mut ctx, &scene, &front_camera()).unwrap();
    assert_eq!(ctx.stats().copies, 1);
}
