//! Perspective camera and damped orbit controls.
//!
//! The controls keep the camera on a sphere around `target`. Pointer input
//! and auto-rotation feed angular and pan deltas; [`OrbitControls::update`]
//! eases them in over successive frames when damping is enabled.

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec2, Vec3};

const EPS: f32 = 1e-6;

/// Frame rate the damping factor is expressed against.
const REFERENCE_RATE: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl PerspectiveCamera {
    pub fn new(aspect: f32) -> Self {
        Self {
            fov: 30.0,
            aspect: aspect.max(0.01),
            near: 0.1,
            far: 100.0,
            position: Vec3::new(0.0, 1.0, -7.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection with a `0..1` depth range.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Camera-space right and up axes in world space.
    fn basis(&self) -> (Vec3, Vec3) {
        let back = (self.position - self.target).normalize_or_zero();
        let right = self.up.cross(back).normalize_or_zero();
        let up = back.cross(right);
        (right, up)
    }
}

/// Spherical coordinates with `Y` up: `theta` around the axis from `+Z`
/// towards `+X`, `phi` down from `+Y`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius <= EPS {
            return Self {
                radius: 0.0,
                theta: 0.0,
                phi: 0.0,
            };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    /// Fraction of the pending motion applied per frame at 60 Hz.
    pub damping_factor: f32,
    pub auto_rotate: bool,
    /// Revolutions per minute; negative values turn clockwise seen from above.
    pub auto_rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 0.75, 0.0),
            enable_damping: true,
            damping_factor: 0.05,
            auto_rotate: true,
            auto_rotate_speed: -1.0,
            min_distance: 3.0,
            max_distance: 10.0,
            min_polar_angle: 0.0,
            max_polar_angle: 2.5,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }
}

impl OrbitControls {
    /// Turns the camera around the vertical axis by `angle` radians.
    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    /// Tilts the camera towards the pole by `angle` radians.
    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    /// Pointer drag of `delta` pixels over a viewport `viewport_height` tall.
    pub fn rotate_by_pixels(&mut self, delta: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.rotate_left(TAU * delta.x / height * self.rotate_speed);
        self.rotate_up(TAU * delta.y / height * self.rotate_speed);
    }

    /// Moves the target so that the scene follows a pointer drag of `delta`
    /// pixels.
    pub fn pan_by_pixels(&mut self, camera: &PerspectiveCamera, delta: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        let distance = (camera.position - self.target).length() * (camera.fov.to_radians() / 2.0).tan();
        let (right, up) = camera.basis();
        let scale = 2.0 * distance / height * self.pan_speed;
        self.pan_offset += -right * delta.x * scale;
        self.pan_offset += up * delta.y * scale;
    }

    /// Wheel input: positive `delta_y` moves away from the target.
    pub fn dolly(&mut self, delta_y: f32) {
        if delta_y == 0.0 {
            return;
        }
        let factor = 0.95_f32.powf(self.zoom_speed * (delta_y * 0.01).abs());
        if delta_y < 0.0 {
            self.scale *= factor;
        } else {
            self.scale /= factor;
        }
    }

    /// Advances the controls by `dt` seconds and moves `camera`.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) {
        let dt = dt.max(0.0);
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        if self.auto_rotate {
            self.rotate_left(TAU / REFERENCE_RATE * self.auto_rotate_speed * dt);
        }

        let factor = self.frame_damping(dt);
        if self.enable_damping {
            spherical.theta += self.theta_delta * factor;
            spherical.phi += self.phi_delta * factor;
            self.target += self.pan_offset * factor;
        } else {
            spherical.theta += self.theta_delta;
            spherical.phi += self.phi_delta;
            self.target += self.pan_offset;
        }

        spherical.theta = wrap_angle(spherical.theta);
        spherical.phi = spherical
            .phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(EPS, PI - EPS);
        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        camera.position = self.target + spherical.to_offset();
        camera.look_at(self.target);

        if self.enable_damping {
            let keep = 1.0 - factor;
            self.theta_delta *= keep;
            self.phi_delta *= keep;
            self.pan_offset *= keep;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;
    }

    /// Damping fraction for a step of `dt` seconds, equivalent to applying
    /// `damping_factor` once per 60 Hz frame.
    fn frame_damping(&self, dt: f32) -> f32 {
        let factor = self.damping_factor.clamp(0.0, 1.0);
        1.0 - (1.0 - factor).powf(dt * REFERENCE_RATE)
    }

    /// Distance between the camera and the target it orbits.
    pub fn distance(&self, camera: &PerspectiveCamera) -> f32 {
        (camera.position - self.target).length()
    }

    /// Angle between the camera and the vertical axis through the target.
    pub fn polar_angle(&self, camera: &PerspectiveCamera) -> f32 {
        Spherical::from_offset(camera.position - self.target).phi
    }
}

fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undamped() -> OrbitControls {
        OrbitControls {
            enable_damping: false,
            auto_rotate: false,
            ..OrbitControls::default()
        }
    }

    #[test]
    fn auto_rotation_turns_once_per_minute() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls {
            enable_damping: false,
            ..OrbitControls::default()
        };
        controls.update(&mut camera, 0.0);
        let start = camera.position - controls.target;

        controls.update(&mut camera, 15.0);
        let quarter = camera.position - controls.target;
        assert!(quarter.z.abs() < 1e-3);
        assert!(quarter.x < 0.0);
        assert!((quarter.length() - start.length()).abs() < 1e-3);

        controls.update(&mut camera, 45.0);
        let full = camera.position - controls.target;
        assert!((full - start).length() < 1e-3);
    }

    #[test]
    fn distance_is_clamped() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = undamped();
        for _ in 0..200 {
            controls.dolly(-100.0);
            controls.update(&mut camera, 1.0 / 60.0);
        }
        assert!((controls.distance(&camera) - 3.0).abs() < 1e-4);
        for _ in 0..200 {
            controls.dolly(100.0);
            controls.update(&mut camera, 1.0 / 60.0);
        }
        assert!((controls.distance(&camera) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn polar_angle_is_clamped() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = undamped();
        controls.rotate_up(-10.0);
        controls.update(&mut camera, 1.0 / 60.0);
        assert!(controls.polar_angle(&camera) <= 2.5 + 1e-4);
        controls.rotate_up(10.0);
        controls.update(&mut camera, 1.0 / 60.0);
        assert!(controls.polar_angle(&camera) < 1e-2);
        assert!(camera.position.is_finite());
    }

    #[test]
    fn damping_eases_motion_in() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = OrbitControls {
            auto_rotate: false,
            ..OrbitControls::default()
        };
        controls.update(&mut camera, 1.0 / 60.0);
        let start = camera.position;
        controls.rotate_left(0.5);
        controls.update(&mut camera, 1.0 / 60.0);
        let first = (camera.position - start).length();
        let before = camera.position;
        controls.update(&mut camera, 1.0 / 60.0);
        let second = (camera.position - before).length();
        assert!(first > 0.0);
        assert!(second > 0.0 && second < first);
    }

    #[test]
    fn damping_does_not_depend_on_frame_rate() {
        let mut fast_camera = PerspectiveCamera::new(1.0);
        let mut slow_camera = PerspectiveCamera::new(1.0);
        let mut fast = OrbitControls {
            auto_rotate: false,
            ..OrbitControls::default()
        };
        let mut slow = fast.clone();
        fast.update(&mut fast_camera, 0.0);
        slow.update(&mut slow_camera, 0.0);

        fast.rotate_left(1.0);
        slow.rotate_left(1.0);
        for _ in 0..4 {
            fast.update(&mut fast_camera, 1.0 / 120.0);
        }
        for _ in 0..2 {
            slow.update(&mut slow_camera, 1.0 / 60.0);
        }
        assert!((fast_camera.position - slow_camera.position).length() < 1e-4);
    }

    #[test]
    fn pan_moves_the_target() {
        let mut camera = PerspectiveCamera::new(1.0);
        let mut controls = undamped();
        controls.update(&mut camera, 0.0);
        let target = controls.target;
        controls.pan_by_pixels(&camera, Vec2::new(0.0, 100.0), 800.0);
        controls.update(&mut camera, 1.0 / 60.0);
        assert!(controls.target.y > target.y);
        assert!((camera.target - controls.target).length() < 1e-6);
    }

    #[test]
    fn projection_uses_zero_to_one_depth() {
        let camera = PerspectiveCamera::new(16.0 / 9.0);
        let near = camera.projection().project_point3(Vec3::new(0.0, 0.0, -camera.near));
        let far = camera.projection().project_point3(Vec3::new(0.0, 0.0, -camera.far));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }
}
