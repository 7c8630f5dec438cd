//! Camera snapshots

use glam::{Mat3, Mat4, Vec3};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => *far,
        }
    }
}

/// Everything the renderer needs to know about the camera for one frame.
///
/// Input handling produces these; the renderer only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    /// Unit viewing direction
    pub front: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::looking_at(Vec3::new(0.0, 1.5, 4.0), Vec3::new(0.0, 1.5, 3.0))
    }
}

impl CameraState {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            front: (target - position).normalize(),
            up: Vec3::Y,
            fov_y: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// The view matrix with its translation removed, for drawing infinitely distant geometry.
    pub fn rotation_only_view(&self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.view_matrix()))
    }

    pub fn projection(&self, aspect: f32) -> Projection {
        Projection::perspective(self.fov_y, aspect, self.near, self.far)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection(aspect).matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_only_view_ignores_position() {
        let a = CameraState::looking_at(Vec3::ZERO, Vec3::NEG_Z);
        let b = CameraState::looking_at(Vec3::new(5.0, -3.0, 2.0), Vec3::new(5.0, -3.0, 1.0));
        assert!(a.rotation_only_view().abs_diff_eq(b.rotation_only_view(), 1e-6));
        assert_eq!(b.rotation_only_view().w_axis, glam::Vec4::W);
        assert!(!b.view_matrix().abs_diff_eq(b.rotation_only_view(), 1e-3));
    }

    #[test]
    fn test_view_sends_front_to_negative_z() {
        let camera = CameraState::looking_at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 2.0, 3.0));
        let p = camera.view_matrix().transform_point3(Vec3::new(5.0, 2.0, 3.0));
        assert!((p - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-5);
    }

    #[test]
    fn test_orthographic_depth_range() {
        let projection = Projection::orthographic(20.0, 20.0, 1.0, 21.0);
        let m = projection.matrix();
        assert!((m.project_point3(Vec3::new(0.0, 0.0, -1.0)).z).abs() < 1e-6);
        assert!((m.project_point3(Vec3::new(0.0, 0.0, -21.0)).z - 1.0).abs() < 1e-6);
        assert_eq!(projection.far(), 21.0);
    }
}
