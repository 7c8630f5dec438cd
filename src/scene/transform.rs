//! Model transforms

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Placement of a model in the world.
///
/// The model matrix applies scale first, then rotation, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Create transform from position, rotation (euler angles in radians), and scale
    pub fn from_components(position: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(EulerRot::XYZ, rotation_euler.x, rotation_euler.y, rotation_euler.z),
            scale,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// `T * R * S`
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of the upper 3x3, for transforming normals.
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.matrix()).inverse().transpose()
    }

    /// World-space bounds of an object-space box under this transform.
    pub fn transform_bounds(&self, (min, max): (Vec3, Vec3)) -> (Vec3, Vec3) {
        let matrix = self.matrix();
        (0..8)
            .map(|corner| {
                Vec3::new(
                    if corner & 1 == 0 { min.x } else { max.x },
                    if corner & 2 == 0 { min.y } else { max.y },
                    if corner & 4 == 0 { min.z } else { max.z },
                )
            })
            .map(|p| matrix.transform_point3(p))
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            })
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Rotate around an axis
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        self.rotation = Quat::from_axis_angle(axis, angle) * self.rotation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_applies_before_translation() {
        let transform = Transform::from_position_scale(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(0.5));
        let p = transform.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(2.5, 0.0, 0.0)).length() < 1e-6);

        // The other order would give (1.5, 0, 0).
        let reversed = Mat4::from_scale(Vec3::splat(0.5)) * Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
        assert!((reversed.transform_point3(Vec3::X) - p).length() > 0.1);
    }

    #[test]
    fn test_normal_matrix_under_non_uniform_scale() {
        let transform = Transform::from_position_scale(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let n = (transform.normal_matrix() * Vec3::new(1.0, 1.0, 0.0)).normalize();
        // Normals shrink along the stretched axis.
        assert!(n.x < n.y);
    }

    #[test]
    fn test_transform_bounds() {
        let transform = Transform::from_position_scale(Vec3::new(0.0, 1.0, 0.0), Vec3::splat(2.0));
        let (min, max) = transform.transform_bounds((Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert!((min - Vec3::new(-1.0, 0.0, -1.0)).length() < 1e-6);
        assert!((max - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-6);
    }
}
