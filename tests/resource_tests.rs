//! Buffer packing, vertex layouts, render targets and cube face conventions.

mod common;

use glam::{Vec2, Vec3};
use rstest::rstest;

use common::{context, HEIGHT, WIDTH};
use deferred_renderer::context::DrawRange;
use deferred_renderer::pipeline::gbuffer_pass::GBUFFER_ATTACHMENTS;
use deferred_renderer::resources::buffer::required_size;
use deferred_renderer::resources::cubemap::{cube_projection, face_views, CUBE_FACES};
use deferred_renderer::resources::vertex_layout::{component_width, planar_offsets};
use deferred_renderer::resources::{GpuBuffer, VertexLayout};
use deferred_renderer::{GpuContext, RecordingBackend, Renderer, RendererConfig};

// ============================================================================
// Planar buffers
// ============================================================================

/// Fill a planar buffer the way a mesh upload does and return it with the
/// offset each component landed at.
fn planar_buffer(
    ctx: &mut GpuContext<RecordingBackend>,
    vertex_count: u32,
    component_count: u32,
    tex_coord_index: Option<u32>,
    index_count: u32,
) -> (GpuBuffer, Vec<u64>) {
    let widths: Vec<u32> = (0..component_count)
        .map(|i| component_width(i, tex_coord_index))
        .collect();
    let mut buffer = GpuBuffer::with_components(ctx, "Planar", vertex_count, &widths, index_count).unwrap();
    let indices: Vec<u32> = (0..index_count).map(|i| i % vertex_count).collect();
    buffer.add_indices(ctx, &indices).unwrap();

    let mut offsets = Vec::new();
    for (component, width) in widths.iter().enumerate() {
        let offset = if *width == 2 {
            let data: Vec<Vec2> = (0..vertex_count).map(|v| Vec2::new(v as f32, component as f32)).collect();
            buffer.add_vectors2(ctx, &data).unwrap()
        } else {
            let data: Vec<Vec3> = (0..vertex_count)
                .map(|v| Vec3::new(v as f32, component as f32, 1.0))
                .collect();
            buffer.add_vectors3(ctx, &data).unwrap()
        };
        offsets.push(offset);
    }
    (buffer, offsets)
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    words(bytes).into_iter().map(f32::from_bits).collect()
}

#[rstest]
#[case::positions_only(3, 1, None, 0)]
#[case::position_normal(4, 2, None, 6)]
#[case::textured(4, 3, Some(2), 6)]
#[case::uv_first(8, 3, Some(0), 36)]
fn test_components_follow_indices(
    #[case] vertex_count: u32,
    #[case] component_count: u32,
    #[case] tex_coord_index: Option<u32>,
    #[case] index_count: u32,
) {
    let mut ctx = context();
    let (buffer, offsets) = planar_buffer(&mut ctx, vertex_count, component_count, tex_coord_index, index_count);

    let expected = planar_offsets(index_count as u64 * 4, vertex_count, component_count, tex_coord_index);
    assert_eq!(offsets, expected[..component_count as usize]);
    assert_eq!(buffer.index_end(), index_count as u64 * 4);
    assert_eq!(buffer.cursor(), buffer.size());

    let widths: Vec<u32> = (0..component_count)
        .map(|i| component_width(i, tex_coord_index))
        .collect();
    assert_eq!(buffer.size(), required_size(vertex_count, &widths, index_count));
    assert_eq!(expected[component_count as usize], buffer.size());
}

#[test]
fn test_written_bytes_land_at_returned_offsets() {
    let mut ctx = context();
    let (buffer, offsets) = planar_buffer(&mut ctx, 3, 3, Some(2), 3);
    let data = ctx.backend().buffer_data(buffer.handle()).unwrap();

    assert_eq!(words(&data[..12]), vec![0, 1, 2]);

    // Second vertex of the normal run: (1, 1, 1).
    let normal_start = offsets[1] as usize + 12;
    assert_eq!(floats(&data[normal_start..normal_start + 12]), vec![1.0, 1.0, 1.0]);

    // Last vertex of the texture coordinate run: (2, 2).
    let uv_start = offsets[2] as usize + 2 * 8;
    assert_eq!(floats(&data[uv_start..uv_start + 8]), vec![2.0, 2.0]);
}

#[rstest]
#[case::indexed(4, 3, Some(2), 6, DrawRange::Indexed(6))]
#[case::unindexed(3, 2, None, 0, DrawRange::Vertices(3))]
fn test_planar_layout_reads_the_data_region(
    #[case] vertex_count: u32,
    #[case] component_count: u32,
    #[case] tex_coord_index: Option<u32>,
    #[case] index_count: u32,
    #[case] range: DrawRange,
) {
    let mut ctx = context();
    let (buffer, offsets) = planar_buffer(&mut ctx, vertex_count, component_count, tex_coord_index, index_count);
    let layout = VertexLayout::planar(&buffer, tex_coord_index).unwrap();

    assert_eq!(layout.binding_offsets(), offsets.as_slice());
    assert_eq!(layout.consumed_bytes(), buffer.size() - buffer.index_end());
    assert_eq!(layout.draw_range(), range);
}

// ============================================================================
// Render targets
// ============================================================================

#[test]
fn test_gbuffer_attachments_keep_their_order() {
    let mut ctx = context();
    let renderer = Renderer::new(
        &mut ctx,
        RendererConfig {
            width: WIDTH,
            height: HEIGHT,
            point_lights: 1,
            shadow_size: 32,
            point_shadow_size: 8,
            ..Default::default()
        },
    )
    .unwrap();
    let target = renderer.gbuffer().target();

    assert_eq!(target.color_count(), GBUFFER_ATTACHMENTS.len());
    for (index, name) in GBUFFER_ATTACHMENTS.iter().enumerate() {
        let texture = target.color_attachment(index).unwrap();
        assert_eq!(texture.label(), format!("G-Buffer {name}"));
    }
    assert!(target.color_attachment(GBUFFER_ATTACHMENTS.len()).is_none());
    assert_eq!(target.depth_size(), Some((WIDTH, HEIGHT)));
    assert!(target.is_complete().is_ok());
}

// ============================================================================
// Cube faces
// ============================================================================

#[rstest]
#[case::origin(Vec3::ZERO)]
#[case::light(Vec3::new(10.0, -10.0, 10.0))]
fn test_face_views_look_down_each_axis(#[case] eye: Vec3) {
    let views = face_views(eye);
    for (view, (direction, up)) in views.iter().zip(CUBE_FACES) {
        let forward = view.transform_point3(eye + direction);
        assert!((forward - Vec3::NEG_Z).length() < 1e-5, "{direction} -> {forward}");
        let upward = view.transform_vector3(up);
        assert!((upward - Vec3::Y).length() < 1e-5, "{up} -> {upward}");
    }
}

#[test]
fn test_cube_projection_flips_rows() {
    let projection = cube_projection(0.1, 10.0);
    // A point above the face center lands in the lower half of clip space.
    let clip = projection * Vec3::new(0.0, 1.0, -2.0).extend(1.0);
    assert!(clip.y / clip.w < 0.0);
    // The 90 degree frustum edge maps to the clip boundary.
    let edge = projection * Vec3::new(2.0, 0.0, -2.0).extend(1.0);
    assert!((edge.x / edge.w - 1.0).abs() < 1e-5);
}
