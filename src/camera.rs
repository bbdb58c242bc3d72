//! Perspective camera.
//!
//! The camera is split the same way as a GPU renderer would split it: a
//! [`Camera`] for the eye pose (position, yaw, pitch) and a [`Projection`]
//! for the lens. Their product is the view-projection matrix the basic
//! pipeline uses to go from world space to wgpu clip space.

use std::f32::consts::FRAC_PI_2;

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};

const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// cgmath builds OpenGL projections (depth in `[-w, w]`); wgpu clips depth to `[0, w]`.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Default vertical field of view in degrees.
pub const DEFAULT_FOVY: f32 = 60.0;
pub const DEFAULT_ZNEAR: f32 = 0.1;
pub const DEFAULT_ZFAR: f32 = 1000.0;

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    /// Camera at the origin looking down -Z.
    pub fn origin() -> Self {
        Self::new((0.0, 0.0, 0.0), cgmath::Deg(-90.0), cgmath::Deg(0.0))
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Point3::new(x, y, z);
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    /// Turn the camera towards `target`. Does nothing if the target is the
    /// camera position itself.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let dir = target - self.position;
        if dir.magnitude2() == 0.0 {
            return;
        }
        let dir = dir.normalize();
        self.yaw = Rad(dir.z.atan2(dir.x));
        self.pitch = Rad(dir.y.asin().clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2));
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::origin()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// wgpu clip space: visible depth maps to `[0, w]`.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}
