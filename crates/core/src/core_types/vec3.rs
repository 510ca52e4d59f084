//! Vector type aliases for positions, directions and planar flow.

use nalgebra::{Vector2, Vector3};

/// 3D vector type for positions, velocities, and directions.
///
/// This is a simple alias for `nalgebra::Vector3<f32>`, used throughout
/// the simulation for world positions, particle velocities, and surface normals.
pub type Vec3 = Vector3<f32>;

/// 2D vector type for horizontal (XZ) quantities.
///
/// The first component maps to world X and the second to world Z.
pub type Vec2 = Vector2<f32>;

/// Horizontal distance between two points, ignoring Y.
#[inline]
pub fn distance_xz(a: &Vec3, b: &Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}
