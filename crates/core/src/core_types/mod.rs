//! Core math and material types shared by every subsystem

pub mod fluid;
pub mod texel;
pub mod transform;
pub mod vec3;

pub use fluid::{FluidMaterial, Rgba};
pub use texel::Texel;
pub use transform::Transform;
pub use vec3::{distance_xz, Vec2, Vec3};
