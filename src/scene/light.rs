//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::{CameraState, Projection};

/// Near plane of the directional shadow projection.
const SHADOW_NEAR: f32 = 0.1;
/// Gap between the eye of the directional shadow projection and the scene bounds.
const SHADOW_MARGIN: f32 = 1.0;

/// The sun: parallel rays, one shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Depth range of the shadow projection
    pub shadow_far_plane: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(2.0, -4.0, 1.0),
            color: Vec3::ONE,
            intensity: 1.0,
            shadow_far_plane: 20.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            color,
            intensity,
            ..Default::default()
        }
    }

    /// Projection * view of the shadow map, framing a sphere of `radius` around `center`.
    ///
    /// The eye sits just outside the sphere, looking along the light direction.
    /// `shadow_far_plane` only extends the depth range; it never cuts into the sphere.
    pub fn light_space_matrix(&self, center: Vec3, radius: f32) -> Mat4 {
        let direction = self.direction.normalize_or_zero();
        let direction = if direction == Vec3::ZERO { Vec3::NEG_Y } else { direction };
        let radius = radius.max(0.01);
        let distance = radius + SHADOW_MARGIN;
        let eye = center - direction * distance;
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(eye, center, up);
        let far = self.shadow_far_plane.max(2.0 * distance);
        Projection::orthographic(2.0 * radius, 2.0 * radius, SHADOW_NEAR, far).matrix() * view
    }
}

/// A point light as laid out in the lighting uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// xyz = position, w unused
    pub position: Vec4,
    /// rgb = color, a unused
    pub color: Vec4,
    pub intensity: f32,
    /// Distance at which the light is cut off; also the far plane of its shadow cube
    pub radius: f32,
    pub padding: [f32; 2],
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position: position.extend(0.0),
            color: color.extend(1.0),
            intensity,
            radius,
            padding: [0.0; 2],
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position.truncate()
    }
}

/// A cone light, normally following the camera as a flashlight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Cosine of the inner cone half angle
    pub cut_off: f32,
    /// Cosine of the outer cone half angle
    pub outer_cut_off: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            color: Vec3::ONE,
            intensity: 2.0,
            cut_off: 12.5f32.to_radians().cos(),
            outer_cut_off: 15f32.to_radians().cos(),
        }
    }
}

impl SpotLight {
    /// Move the light to the camera, pointing where it looks.
    pub fn follow(&mut self, camera: &CameraState) {
        self.position = camera.position;
        self.direction = camera.front;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_point_light_matches_uniform_layout() {
        assert_eq!(std::mem::size_of::<PointLight>(), 48);
        let light = PointLight::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 10.0, 7.5);
        let bytes: &[u8] = bytemuck::bytes_of(&light);
        assert_eq!(&bytes[36..40], &7.5f32.to_ne_bytes());
        assert_eq!(light.position(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_light_space_matrix_keeps_center_in_view() {
        let light = DirectionalLight::default();
        let m = light.light_space_matrix(Vec3::ZERO, 5.0);
        let center = m.project_point3(Vec3::ZERO);
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5);
        assert!(center.z > 0.0 && center.z < 1.0);

        let edge = m.project_point3(Vec3::new(0.0, 0.0, 4.9));
        assert!(edge.x.abs() <= 1.0 && edge.y.abs() <= 1.0);
    }

    #[rstest]
    #[case(1.0, 20.0)]
    #[case(50.0, 20.0)]
    #[case(50.0, 5.0)]
    #[case(2.0, 500.0)]
    fn test_light_space_depth_covers_bounds(#[case] radius: f32, #[case] far_plane: f32) {
        let light = DirectionalLight {
            shadow_far_plane: far_plane,
            ..Default::default()
        };
        let center = Vec3::new(3.0, -1.0, 2.0);
        let m = light.light_space_matrix(center, radius);
        let direction = light.direction.normalize();
        for point in [center - direction * radius, center, center + direction * radius] {
            let depth = m.project_point3(point).z;
            assert!(depth > 0.0 && depth < 1.0, "radius {radius}, far {far_plane}: {depth}");
        }
        let near = m.project_point3(center - direction * radius).z;
        let far = m.project_point3(center + direction * radius).z;
        assert!(near < far);
    }

    #[test]
    fn test_straight_down_light_has_valid_view() {
        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0);
        let m = light.light_space_matrix(Vec3::ZERO, 1.0);
        assert!(m.is_finite());
    }

    #[test]
    fn test_spot_light_follows_camera() {
        let mut spot = SpotLight::default();
        let camera = CameraState::looking_at(Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 0.0));
        spot.follow(&camera);
        assert_eq!(spot.position, camera.position);
        assert_eq!(spot.direction, camera.front);
        assert!(spot.cut_off > spot.outer_cut_off);
    }
}
