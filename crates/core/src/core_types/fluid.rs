//! Fluid material description carried by add-fluid modifiers, emitters and particles.

use serde::{Deserialize, Serialize};

/// RGBA color with lanes in [0, 1]
pub type Rgba = [f32; 4];

/// Appearance and flow properties of one kind of fluid
///
/// The simulation stores these per column and mixes them by volume as
/// fluid moves, so two fluids poured into the same basin blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluidMaterial {
    /// Surface color
    pub color: Rgba,
    /// Emission strength (0-1)
    pub emission: f32,
    /// Surface smoothness (0-1)
    pub smoothness: f32,
    /// Metallic factor (0-1)
    pub metallic: f32,
    /// Viscosity (0-1); higher values bleed outflow faster
    pub viscosity: f32,
    /// Optional user data lanes, stored when the simulation enables custom data
    pub custom: [f32; 3],
}

impl Default for FluidMaterial {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            emission: 0.0,
            smoothness: 0.0,
            metallic: 0.0,
            viscosity: 0.1,
            custom: [0.0; 3],
        }
    }
}

impl FluidMaterial {
    /// Fully transparent, inviscid material used when clearing a grid
    #[must_use]
    pub const fn clear() -> Self {
        Self {
            color: [0.0; 4],
            emission: 0.0,
            smoothness: 0.0,
            metallic: 0.0,
            viscosity: 0.0,
            custom: [0.0; 3],
        }
    }

    /// Default material tinted with `color`
    #[must_use]
    pub fn with_color(color: Rgba) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Material lanes packed as `(emission, smoothness, metallic, viscosity)`
    #[must_use]
    pub fn material_lanes(&self) -> [f32; 4] {
        [self.emission, self.smoothness, self.metallic, self.viscosity]
    }

    /// Foam and custom lanes packed as `(foam, custom0, custom1, custom2)`
    #[must_use]
    pub fn foam_lanes(&self, foam: f32) -> [f32; 4] {
        [foam, self.custom[0], self.custom[1], self.custom[2]]
    }

    /// Rebuild a material from packed column lanes
    #[must_use]
    pub fn from_lanes(color: Rgba, material: [f32; 4], foam: [f32; 4]) -> Self {
        Self {
            color,
            emission: material[0],
            smoothness: material[1],
            metallic: material[2],
            viscosity: material[3],
            custom: [foam[1], foam[2], foam[3]],
        }
    }
}
