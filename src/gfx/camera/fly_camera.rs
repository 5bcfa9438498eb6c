//! Free-fly camera driven by yaw and pitch.

use cgmath::{perspective, Deg, InnerSpace, Matrix4, Point3, Vector3};

use crate::gfx::device::DepthRange;

/// Maps OpenGL clip depth (-1..1) to wgpu clip depth (0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

const PITCH_LIMIT: f32 = 89.0;
const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
pub struct FlyCamera {
    pub position: Point3<f32>,
    pub world_up: Vector3<f32>,
    front: Vector3<f32>,
    up: Vector3<f32>,
    right: Vector3<f32>,
    /// Degrees, -90 looks down -Z.
    pub yaw: f32,
    /// Degrees, clamped to +-89.
    pub pitch: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    /// Vertical field of view in degrees.
    pub zoom: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Point3::new(0.0, 0.0, 3.0))
    }
}

impl FlyCamera {
    pub fn new(position: Point3<f32>) -> Self {
        let mut camera = Self {
            position,
            world_up: Vector3::unit_y(),
            front: -Vector3::unit_z(),
            up: Vector3::unit_y(),
            right: Vector3::unit_x(),
            yaw: -90.0,
            pitch: 0.0,
            movement_speed: 4.0,
            mouse_sensitivity: 0.1,
            zoom: 45.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn front(&self) -> Vector3<f32> {
        self.front
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn right(&self) -> Vector3<f32> {
        self.right
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Perspective projection with the zoom as vertical field of view.
    pub fn projection_matrix(&self, aspect: f32, depth_range: DepthRange) -> Matrix4<f32> {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let projection = perspective(Deg(self.zoom), aspect, NEAR_PLANE, FAR_PLANE);
        match depth_range {
            DepthRange::NegativeOneToOne => projection,
            DepthRange::ZeroToOne => OPENGL_TO_WGPU_MATRIX * projection,
        }
    }

    pub fn process_keyboard(&mut self, direction: CameraMovement, delta_time: f32) {
        let velocity = self.movement_speed * delta_time;
        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
            CameraMovement::Up => self.position += self.world_up * velocity,
            CameraMovement::Down => self.position -= self.world_up * velocity,
        }
    }

    /// Applies a mouse delta in pixels. Positive `y_offset` looks up.
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32, constrain_pitch: bool) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch += y_offset * self.mouse_sensitivity;
        if constrain_pitch {
            self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        self.update_vectors();
    }

    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.zoom = (self.zoom - y_offset).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vector3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Transform, Vector4};

    fn assert_close(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).magnitude() < 1e-5, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = FlyCamera::default();
        assert_eq!(camera.position, Point3::new(0.0, 0.0, 3.0));
        assert_close(camera.front(), Vector3::new(0.0, 0.0, -1.0));
        assert_close(camera.right(), Vector3::new(1.0, 0.0, 0.0));
        assert_close(camera.up(), Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_pitch_and_zoom_are_clamped() {
        let mut camera = FlyCamera::default();
        camera.process_mouse_movement(0.0, 10_000.0, true);
        assert_eq!(camera.pitch, 89.0);

        camera.process_mouse_scroll(500.0);
        assert_eq!(camera.zoom, 1.0);
        camera.process_mouse_scroll(-500.0);
        assert_eq!(camera.zoom, 90.0);
    }

    #[test]
    fn test_movement_scales_with_time() {
        let mut camera = FlyCamera::default();
        camera.process_keyboard(CameraMovement::Forward, 0.5);
        assert_close(
            Vector3::new(camera.position.x, camera.position.y, camera.position.z),
            Vector3::new(0.0, 0.0, 1.0),
        );
        camera.process_keyboard(CameraMovement::Up, 0.25);
        assert!((camera.position.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_projection_depth_ranges() {
        let camera = FlyCamera::default();
        let near_point = Point3::new(0.0, 0.0, -NEAR_PLANE);

        let gl = camera.projection_matrix(1.0, DepthRange::NegativeOneToOne);
        let clip = gl * Vector4::new(near_point.x, near_point.y, near_point.z, 1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-4);

        let wgpu = camera.projection_matrix(1.0, DepthRange::ZeroToOne);
        let projected = wgpu.transform_point(near_point);
        assert!(projected.z.abs() < 1e-4);
    }
}
