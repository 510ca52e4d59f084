//! Affine placement of simulations, modifiers and emitters in world space.

use super::vec3::Vec3;
use nalgebra::{Matrix4, Point3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Local-to-world affine transform with its cached inverse
///
/// Built from translation, rotation and (possibly non-uniform) scale. A
/// transform with a zero scale axis has no inverse; in that case the
/// inverse collapses every point onto the origin so callers never divide
/// by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    local_to_world: Matrix4<f32>,
    world_to_local: Matrix4<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Identity placement at the world origin
    #[must_use]
    pub fn identity() -> Self {
        Self {
            local_to_world: Matrix4::identity(),
            world_to_local: Matrix4::identity(),
        }
    }

    /// Pure translation
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_matrix(Matrix4::new_translation(&translation))
    }

    /// Translation, rotation about Y (degrees) and scale
    ///
    /// # Arguments
    ///
    /// * `translation` - World position of the local origin
    /// * `yaw_degrees` - Rotation about the world Y axis
    /// * `scale` - Per-axis scale applied before rotation
    #[must_use]
    pub fn from_yaw(translation: Vec3, yaw_degrees: f32, scale: Vec3) -> Self {
        let rotation = UnitQuaternion::from_euler_angles(0.0, yaw_degrees.to_radians(), 0.0);
        Self::new(translation, rotation, scale)
    }

    /// Full translation-rotation-scale constructor
    #[must_use]
    pub fn new(translation: Vec3, rotation: UnitQuaternion<f32>, scale: Vec3) -> Self {
        let matrix = Matrix4::new_translation(&translation)
            * rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&scale);
        Self::from_matrix(matrix)
    }

    /// Wrap an arbitrary affine matrix
    #[must_use]
    pub fn from_matrix(local_to_world: Matrix4<f32>) -> Self {
        let world_to_local = local_to_world.try_inverse().unwrap_or_else(Matrix4::zeros);
        Self {
            local_to_world,
            world_to_local,
        }
    }

    /// Local-to-world matrix
    #[must_use]
    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.local_to_world
    }

    /// World-to-local matrix
    #[must_use]
    pub fn inverse_matrix(&self) -> &Matrix4<f32> {
        &self.world_to_local
    }

    /// Map a local point into world space
    #[must_use]
    pub fn transform_point(&self, local: &Vec3) -> Vec3 {
        self.local_to_world
            .transform_point(&Point3::from(*local))
            .coords
    }

    /// Map a world point into local space
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Vec3) -> Vec3 {
        self.world_to_local
            .transform_point(&Point3::from(*world))
            .coords
    }

    /// Map a local direction into world space (scale included)
    #[must_use]
    pub fn transform_vector(&self, local: &Vec3) -> Vec3 {
        self.local_to_world.transform_vector(local)
    }

    /// Map a world direction into local space (scale included)
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vec3) -> Vec3 {
        self.world_to_local.transform_vector(world)
    }

    /// World position of the local origin
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.transform_point(&Vec3::zeros())
    }

    /// Unit world direction of the local +Z axis
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.transform_vector(&Vec3::z())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::z)
    }

    /// Unit world direction of the local +X axis
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.transform_vector(&Vec3::x())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::x)
    }

    /// World length of one local Y unit
    #[must_use]
    pub fn vertical_scale(&self) -> f32 {
        self.transform_vector(&Vec3::y()).norm()
    }

    /// Compose `self * local`, so `local` is applied first
    #[must_use]
    pub fn then_local(&self, local: &Matrix4<f32>) -> Self {
        Self::from_matrix(self.local_to_world * local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_point() {
        let t = Transform::from_yaw(Vec3::new(5.0, 1.0, -2.0), 30.0, Vec3::new(2.0, 1.0, 0.5));
        let p = Vec3::new(1.0, 2.0, 3.0);
        let back = t.inverse_transform_point(&t.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-4);
    }

    #[test]
    fn test_yaw_rotates_forward() {
        let t = Transform::from_yaw(Vec3::zeros(), 90.0, Vec3::new(1.0, 1.0, 1.0));
        let forward = t.forward();
        assert_relative_eq!(forward.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_scale_has_zero_inverse() {
        let t = Transform::from_yaw(Vec3::new(1.0, 2.0, 3.0), 0.0, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(t.inverse_transform_point(&Vec3::new(9.0, 9.0, 9.0)), Vec3::zeros());
    }
}
