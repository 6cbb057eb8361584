//! Free-fly first person camera.
//!
//! Yaw and pitch are kept in degrees. Horizontal movement follows the view
//! direction projected onto the ground plane, vertical movement is along
//! world Y regardless of where the camera looks.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::math::{self, Mat4, Vec3};

pub const PITCH_LIMIT: f32 = 89.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keybinds {
    pub forwards: KeyCode,
    pub backwards: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub up: KeyCode,
    pub down: KeyCode,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            forwards: KeyCode::KeyW,
            backwards: KeyCode::KeyS,
            left: KeyCode::KeyA,
            right: KeyCode::KeyD,
            up: KeyCode::Space,
            down: KeyCode::ShiftLeft,
        }
    }
}

/// Anything that can answer "is this key held right now".
pub trait KeyState {
    fn is_down(&self, key: KeyCode) -> bool;
}

/// Held-key set fed from window keyboard events.
#[derive(Debug, Default)]
pub struct KeyboardState {
    held: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn handle_key_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.set(code, event.state == ElementState::Pressed);
        }
    }

    pub fn set(&mut self, key: KeyCode, down: bool) {
        if down {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    /// Forgets every held key, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
    }
}

impl KeyState for KeyboardState {
    fn is_down(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov_degrees: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    /// World units per millisecond.
    pub movement_speed: f32,
    /// Degrees per pixel of pointer motion.
    pub mouse_sensitivity: f32,
    pub keybinds: Keybinds,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(30.0, 30.0, 30.0),
            look_at: Vec3::zero(),
            fov_degrees: 60.0,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            movement_speed: 0.01,
            mouse_sensitivity: 0.1,
            keybinds: Keybinds::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    pub keybinds: Keybinds,
    fov_radians: f32,
    yaw: f32,
    pitch: f32,
}

impl Camera {
    pub fn new(settings: CameraSettings) -> Self {
        let mut camera = Self {
            position: settings.position,
            forward: Vec3::new(0.0, 0.0, -1.0),
            aspect_ratio: settings.aspect_ratio,
            near: settings.near,
            far: settings.far,
            movement_speed: settings.movement_speed,
            mouse_sensitivity: settings.mouse_sensitivity,
            keybinds: settings.keybinds,
            fov_radians: settings.fov_degrees.to_radians(),
            yaw: -90.0,
            pitch: 0.0,
        };

        if settings.look_at != settings.position {
            camera.look_at(settings.look_at);
        }

        camera
    }

    /// Moves the camera for every held movement key, scaled by the frame's
    /// elapsed milliseconds.
    pub fn check_keyboard_inputs(&mut self, keys: &impl KeyState, delta_time_ms: f32) {
        let step = self.movement_speed * delta_time_ms;

        let mut flat_forward = Vec3::new(self.forward.x, 0.0, self.forward.z);
        let can_walk = flat_forward.mag() >= math::NORMALISE_EPSILON;
        if can_walk {
            flat_forward /= flat_forward.mag();
        }
        let strafe = flat_forward.cross(Vec3::unit_y());

        if can_walk {
            if keys.is_down(self.keybinds.forwards) {
                self.position += flat_forward * step;
            }
            if keys.is_down(self.keybinds.backwards) {
                self.position -= flat_forward * step;
            }
            if keys.is_down(self.keybinds.left) {
                self.position -= strafe * step;
            }
            if keys.is_down(self.keybinds.right) {
                self.position += strafe * step;
            }
        }

        if keys.is_down(self.keybinds.up) {
            self.position.y += step;
        }
        if keys.is_down(self.keybinds.down) {
            self.position.y -= step;
        }
    }

    /// Applies relative pointer motion in pixels. Screen-space down is
    /// negative pitch.
    pub fn handle_pointer_motion(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.mouse_sensitivity;
        self.pitch = (self.pitch - dy * self.mouse_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        self.update_forward_vector();
    }

    pub fn update_forward_vector(&mut self) {
        let (sin_yaw, cos_yaw) = self.yaw.to_radians().sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.to_radians().sin_cos();

        self.forward = math::normalised(Vec3::new(cos_yaw * cos_pitch, sin_pitch, sin_yaw * cos_pitch));
    }

    /// Points the camera at `point` and re-derives yaw and pitch from the
    /// new view direction. Looking at the camera's own position is ignored.
    pub fn look_at(&mut self, point: Vec3) {
        let mut forward = point - self.position;
        if !math::normalise(&mut forward) {
            return;
        }

        self.forward = forward;
        self.yaw = forward.z.atan2(forward.x).to_degrees();
        self.pitch = forward
            .y
            .asin()
            .to_degrees()
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn perspective_matrix(&self) -> Mat4 {
        math::perspective(self.fov_radians, self.aspect_ratio, self.near, self.far)
    }

    pub fn view_matrix(&self) -> Mat4 {
        math::look_at(self.position, self.position + self.forward, Vec3::unit_y())
    }

    pub fn perspective_view_matrix(&self) -> Mat4 {
        self.perspective_matrix() * self.view_matrix()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_at_origin() -> Camera {
        Camera::new(CameraSettings {
            position: Vec3::zero(),
            look_at: Vec3::new(0.0, 0.0, -1.0),
            movement_speed: 1.0,
            ..Default::default()
        })
    }

    fn holding(keys: &[KeyCode]) -> KeyboardState {
        let mut state = KeyboardState::default();
        for &key in keys {
            state.set(key, true);
        }
        state
    }

    #[test]
    fn default_camera_looks_at_the_origin() {
        let camera = Camera::default();
        let expected = math::normalised(Vec3::new(-1.0, -1.0, -1.0));

        assert_relative_eq!(camera.forward.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(camera.forward.y, expected.y, epsilon = 1e-6);
        assert_relative_eq!(camera.forward.z, expected.z, epsilon = 1e-6);
        assert_relative_eq!(camera.fov_radians.to_degrees(), 60.0, epsilon = 1e-4);
    }

    #[test]
    fn look_at_and_angles_agree() {
        let mut camera = camera_at_origin();
        camera.look_at(Vec3::new(3.0, 4.0, -5.0));

        let looked = camera.forward;
        camera.update_forward_vector();

        assert_relative_eq!(camera.forward.x, looked.x, epsilon = 1e-5);
        assert_relative_eq!(camera.forward.y, looked.y, epsilon = 1e-5);
        assert_relative_eq!(camera.forward.z, looked.z, epsilon = 1e-5);
    }

    #[test]
    fn pitch_is_clamped_at_the_poles() {
        let mut camera = camera_at_origin();

        camera.handle_pointer_motion(0.0, -100_000.0);
        assert_eq!(camera.pitch, PITCH_LIMIT);
        assert!(camera.forward.y < 1.0);

        camera.handle_pointer_motion(0.0, 100_000.0);
        assert_eq!(camera.pitch, -PITCH_LIMIT);
        assert!(camera.forward.x.is_finite() && camera.forward.z.is_finite());
    }

    #[test]
    fn pointer_motion_turns_yaw() {
        let mut camera = camera_at_origin();
        let yaw = camera.yaw;

        camera.handle_pointer_motion(10.0, 0.0);

        assert_relative_eq!(camera.yaw, yaw + 1.0, epsilon = 1e-4);
    }

    #[test]
    fn forward_movement_stays_horizontal() {
        let mut camera = camera_at_origin();
        camera.look_at(Vec3::new(0.0, -1.0, -1.0));

        camera.check_keyboard_inputs(&holding(&[KeyCode::KeyW]), 2.0);

        assert_relative_eq!(camera.position.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position.z, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn strafing_is_perpendicular_to_view() {
        let mut camera = camera_at_origin();

        camera.check_keyboard_inputs(&holding(&[KeyCode::KeyD]), 1.0);
        assert_relative_eq!(camera.position.x, 1.0, epsilon = 1e-5);

        camera.check_keyboard_inputs(&holding(&[KeyCode::KeyA]), 3.0);
        assert_relative_eq!(camera.position.x, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn vertical_movement_uses_world_up() {
        let mut camera = camera_at_origin();
        camera.handle_pointer_motion(0.0, -300.0);

        camera.check_keyboard_inputs(&holding(&[KeyCode::Space]), 4.0);
        assert_relative_eq!(camera.position.y, 4.0, epsilon = 1e-6);

        camera.check_keyboard_inputs(&holding(&[KeyCode::ShiftLeft]), 1.0);
        assert_relative_eq!(camera.position.y, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn released_keys_stop_moving() {
        let mut camera = camera_at_origin();
        let mut keys = holding(&[KeyCode::KeyW]);
        keys.set(KeyCode::KeyW, false);

        camera.check_keyboard_inputs(&keys, 100.0);
        assert_eq!(camera.position, Vec3::zero());
    }

    #[test]
    fn view_matrix_maps_forward_to_negative_z() {
        let camera = Camera::default();
        let ahead = camera.position + camera.forward * 5.0;
        let in_view = camera.view_matrix().transform_point3(ahead);

        assert_relative_eq!(in_view.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(in_view.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(in_view.z, -5.0, epsilon = 1e-4);
    }
}
