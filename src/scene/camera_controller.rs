//! Free-fly camera driven by keyboard and mouse input
//!
//! The controller lives with the input layer and hands the renderer a
//! [`CameraState`] snapshot once per frame.

use glam::{Vec2, Vec3};

use super::CameraState;

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_PITCH: f32 = 0.0;
pub const DEFAULT_SPEED: f32 = 2.5;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
pub const DEFAULT_ZOOM: f32 = 45.0;

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, QE for up/down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Mouse delta since last frame, in pixels, y pointing up
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether mouse look is active (e.g., right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

/// One step of keyboard movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Free-fly camera controller (FPS-style)
///
/// - WASD: Move forward/backward/left/right
/// - QE: Move down/up along the world up axis
/// - Mouse: Look around (when mouse_look_active)
/// - Scroll: Zoom (narrows the field of view)
#[derive(Debug, Clone)]
pub struct FreeCamera {
    pub position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    /// Degrees
    pub yaw: f32,
    /// Degrees, within [-89, 89] while constrained
    pub pitch: f32,
    /// Units per second
    pub movement_speed: f32,
    /// Degrees per pixel
    pub mouse_sensitivity: f32,
    /// Vertical field of view in degrees, within [1, 45]
    pub zoom: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

impl FreeCamera {
    pub fn new(position: Vec3) -> Self {
        Self::with_angles(position, Vec3::Y, DEFAULT_YAW, DEFAULT_PITCH)
    }

    pub fn with_angles(position: Vec3, world_up: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: world_up,
            right: Vec3::X,
            world_up,
            yaw,
            pitch,
            movement_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
            zoom: DEFAULT_ZOOM,
            near: 0.1,
            far: 100.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn process_keyboard(&mut self, movement: CameraMovement, dt: f32) {
        let velocity = self.movement_speed * dt;
        match movement {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
            CameraMovement::Up => self.position += self.world_up * velocity,
            CameraMovement::Down => self.position -= self.world_up * velocity,
        }
    }

    /// Turn by a mouse offset in pixels. With `constrain_pitch` the camera
    /// never tips over the vertical.
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32, constrain_pitch: bool) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch += y_offset * self.mouse_sensitivity;
        if constrain_pitch {
            self.pitch = self.pitch.clamp(-89.0, 89.0);
        }
        self.update_vectors();
    }

    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.zoom = (self.zoom - y_offset).clamp(1.0, 45.0);
    }

    /// Apply one frame of accumulated input.
    pub fn update(&mut self, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            self.process_mouse_scroll(input.scroll_delta);
        }
        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            self.process_mouse_movement(input.mouse_delta.x, input.mouse_delta.y, true);
        }

        let keys = [
            (input.forward, CameraMovement::Forward),
            (input.backward, CameraMovement::Backward),
            (input.left, CameraMovement::Left),
            (input.right, CameraMovement::Right),
            (input.up, CameraMovement::Up),
            (input.down, CameraMovement::Down),
        ];
        for (pressed, movement) in keys {
            if pressed {
                self.process_keyboard(movement, dt);
            }
        }
    }

    /// Snapshot for the renderer.
    pub fn state(&self) -> CameraState {
        CameraState {
            position: self.position,
            front: self.front,
            up: self.up,
            fov_y: self.zoom,
            near: self.near,
            far: self.far,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::with_angles(self.position, self.world_up, DEFAULT_YAW, DEFAULT_PITCH);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = FreeCamera::new(Vec3::new(0.0, 1.5, 4.0));
        assert!((camera.front() - Vec3::NEG_Z).length() < 1e-6);
        assert!((camera.right() - Vec3::X).length() < 1e-6);
        assert_eq!(camera.state().fov_y, 45.0);
    }

    #[test]
    fn test_pitch_is_constrained() {
        let mut camera = FreeCamera::default();
        camera.process_mouse_movement(0.0, 10_000.0, true);
        assert_eq!(camera.pitch, 89.0);
        assert!(camera.front().y < 1.0);
        camera.process_mouse_movement(0.0, -20_000.0, true);
        assert_eq!(camera.pitch, -89.0);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = FreeCamera::default();
        camera.process_mouse_scroll(100.0);
        assert_eq!(camera.zoom, 1.0);
        camera.process_mouse_scroll(-100.0);
        assert_eq!(camera.zoom, 45.0);
    }

    #[test]
    fn test_update_moves_along_front() {
        let mut camera = FreeCamera::default();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        camera.update(&input, 2.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
        assert_eq!(camera.state().position, camera.position);
    }
}
