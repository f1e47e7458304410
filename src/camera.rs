use glam::{Mat4, Vec3};
use std::f32::consts::FRAC_PI_2;

const ROTATE_SPEED: f32 = 0.005;
const ZOOM_SPEED: f32 = 0.1;
const PAN_SPEED: f32 = 0.001;
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Orbit camera around the volume: left-drag orbits, scroll zooms, right-drag pans.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Radians around +Y, 0 looks down -Z
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 2.0,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 75f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target + self.distance * Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    /// Pointer delta in pixels
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * ROTATE_SPEED;
        self.pitch = (self.pitch + dy * ROTATE_SPEED).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Positive scroll moves closer
    pub fn zoom(&mut self, scroll: f32) {
        self.distance = (self.distance * (1.0 - scroll * ZOOM_SPEED)).clamp(0.25, 20.0);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        let view = self.view();
        let right = view.row(0).truncate();
        let up = view.row(1).truncate();
        let scale = self.distance * PAN_SPEED;
        self.target += (-dx * right + dy * up) * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_pose_sits_on_positive_z() {
        let eye = OrbitCamera::default().eye();
        assert_relative_eq!(eye.x, 0.0);
        assert_relative_eq!(eye.z, 2.0);
    }

    #[test]
    fn orbiting_keeps_distance_and_clamps_pitch() {
        let mut camera = OrbitCamera::default();
        camera.orbit(300.0, 100_000.0);
        assert_relative_eq!(camera.eye().length(), 2.0, epsilon = 1e-5);
        assert!(camera.pitch <= PITCH_LIMIT);
    }

    #[test]
    fn zoom_is_bounded() {
        let mut camera = OrbitCamera::default();
        for _ in 0..100 {
            camera.zoom(5.0);
        }
        assert_eq!(camera.distance, 0.25);
    }
}
