//! Local transforms for scene nodes.
//!
//! An [`Instance`] is a decomposed affine transform (translation, rotation,
//! non-uniform scale). Node transforms compose parent-first with `*`.

use std::ops::Mul;

use cgmath::{Deg, Matrix, One, Rad, Rotation3, SquareMatrix};

/// Position, rotation (as quaternion), and scale of a node relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Inverse-transpose of the linear part, for transforming normals under
    /// non-uniform scale. Falls back to the rotation when the scale is singular.
    pub fn to_normal_matrix(&self) -> cgmath::Matrix3<f32> {
        let m = self.to_matrix();
        let linear = cgmath::Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());
        match linear.invert() {
            Some(inv) => inv.transpose(),
            None => cgmath::Matrix3::from(self.rotation),
        }
    }

    /// Rotate about the world Y axis. The rotation is premultiplied, so it
    /// applies after whatever orientation the instance already has.
    pub fn rotate_y(&mut self, angle: impl Into<Rad<f32>>) {
        self.rotation = cgmath::Quaternion::from_angle_y(angle) * self.rotation;
    }

    /// Convenience for degree-based callers.
    pub fn rotate_y_deg(&mut self, degrees: f32) {
        self.rotate_y(Deg(degrees));
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}
