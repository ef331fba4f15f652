use glam::{Mat4, Vec3};

pub const DEFAULT_FOV: f32 = 75.0;
/// World units per second.
pub const BASE_SPEED: f32 = 2.5;

pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 0.0, 3.0);
pub const FRONT: Vec3 = Vec3::new(0.0, 0.0, -1.0);
pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

pub const NEAR: f32 = 0.1;
pub const FAR: f32 = 100.0;

/// Viewport assumed by [`Camera::projection_default`].
pub const DEFAULT_VIEWPORT: (u32, u32) = (800, 600);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

/// First-person camera looking down a fixed front vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    fov: f32,
    position: Vec3,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION, DEFAULT_FOV)
    }
}

impl Camera {
    /// `fov` is the vertical field of view in degrees.
    pub fn new(position: Vec3, fov: f32) -> Self {
        let mut camera = Self {
            fov,
            position,
            view: Mat4::IDENTITY,
        };
        camera.redraw();
        camera
    }

    fn redraw(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.position + FRONT, UP);
        log::trace!("camera view recomputed at {:?} (fov={})", self.position, self.fov);
    }

    /// Moves `BASE_SPEED * dt` along the front vector or its horizontal normal.
    pub fn walk(&mut self, direction: Direction, dt: f32) {
        let speed = BASE_SPEED * dt;
        let side = FRONT.cross(UP).normalize();
        self.position += match direction {
            Direction::Forward => FRONT * speed,
            Direction::Backward => -FRONT * speed,
            Direction::Left => -side * speed,
            Direction::Right => side * speed,
        };
        self.redraw();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.redraw();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// Perspective projection for a `width` x `height` viewport.
    pub fn projection(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::perspective_rh(self.fov.to_radians(), aspect, NEAR, FAR)
    }

    /// Projection for [`DEFAULT_VIEWPORT`].
    pub fn projection_default(&self) -> Mat4 {
        self.projection(DEFAULT_VIEWPORT.0, DEFAULT_VIEWPORT.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_sits_behind_the_origin() {
        let cam = Camera::default();
        assert_eq!(cam.position(), DEFAULT_POSITION);
        assert_eq!(cam.fov(), DEFAULT_FOV);
        // the origin is 3 units in front
        let origin_in_view = cam.view().transform_point3(Vec3::ZERO);
        assert!(origin_in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -3.0), 1e-6));
    }

    #[test]
    fn forward_then_backward_round_trips() {
        let mut cam = Camera::default();
        cam.walk(Direction::Forward, 0.016);
        cam.walk(Direction::Backward, 0.016);
        assert!(cam.position().abs_diff_eq(DEFAULT_POSITION, 1e-6));
    }

    #[test]
    fn walking_moves_at_base_speed() {
        let mut cam = Camera::default();
        cam.walk(Direction::Forward, 1.0);
        assert!(cam.position().abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-6));

        cam.walk(Direction::Right, 2.0);
        assert!(cam.position().abs_diff_eq(Vec3::new(5.0, 0.0, 0.5), 1e-6));

        cam.walk(Direction::Left, 2.0);
        assert!(cam.position().abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-6));
    }

    #[test]
    fn view_is_recomputed_after_every_walk() {
        let mut cam = Camera::default();
        let before = cam.view();
        cam.walk(Direction::Left, 0.5);
        assert_ne!(cam.view(), before);
        assert_eq!(cam.view(), Camera::new(cam.position(), DEFAULT_FOV).view());
    }

    #[test]
    fn projection_uses_the_viewport_aspect() {
        let cam = Camera::default();
        let wide = cam.projection(1600, 900);
        let square = cam.projection(900, 900);
        // x scale is focal length / aspect
        assert!((square.x_axis.x / wide.x_axis.x - 1600.0 / 900.0).abs() < 1e-4);
        assert_eq!(cam.projection_default(), cam.projection(800, 600));
    }

    #[test]
    fn zero_height_viewport_does_not_divide_by_zero() {
        let m = Camera::default().projection(1280, 0);
        assert!(m.is_finite());
    }
}
