//! Activation settings for a fluid simulation
//!
//! Everything a simulation needs to derive its geometry, allocate its
//! buffers and rasterise the ground lives here. Geometry settings are read
//! once at activation; the remaining switches (simulating, wetness, rates)
//! take effect on the next tick.

use crate::core_types::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage precision for channel groups holding unbounded values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FloatPrecision {
    /// 16-bit float equivalent
    Half,
    /// 32-bit float
    #[default]
    Full,
}

/// Storage precision for channel groups holding values in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitPrecision {
    /// 8-bit normalised equivalent (1/255 steps)
    #[default]
    Byte,
    /// 16-bit float equivalent
    Half,
    /// 32-bit float
    Full,
}

/// Number of custom scalar lanes stored alongside foam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CustomDataType {
    /// Foam only
    #[default]
    None,
    /// Foam plus one custom lane
    One,
    /// Foam plus three custom lanes
    Three,
}

impl CustomDataType {
    /// Number of stored custom lanes
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Self::None => 0,
            Self::One => 1,
            Self::Three => 3,
        }
    }
}

/// Per-channel-group storage precision
///
/// Group letters follow the buffer layout: A ground/wet, B outflow,
/// C depth, D color, E material, F foam and custom lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferPrecision {
    pub a: FloatPrecision,
    pub b: FloatPrecision,
    pub c: FloatPrecision,
    pub d: UnitPrecision,
    pub e: UnitPrecision,
    pub f: UnitPrecision,
}

impl BufferPrecision {
    /// Every group at full 32-bit precision
    #[must_use]
    pub const fn full() -> Self {
        Self {
            a: FloatPrecision::Full,
            b: FloatPrecision::Full,
            c: FloatPrecision::Full,
            d: UnitPrecision::Full,
            e: UnitPrecision::Full,
            f: UnitPrecision::Full,
        }
    }
}

/// Reasons a simulation refuses to activate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridConfigError {
    #[error("simulation size must be positive on X and Z, got {x} x {z}")]
    NonPositiveSize { x: f32, z: f32 },
    #[error("column separation must be positive, got {0}")]
    NonPositiveSeparation(f32),
    #[error("resolution multiplier must be positive, got {0}")]
    NonPositiveResolution(f32),
    #[error("height range is inverted: min {min} > max {max}")]
    InvertedHeightRange { min: f32, max: f32 },
    #[error("column count {x} x {z} is degenerate; both axes need more than one column")]
    DegenerateColumnCount { x: u32, z: u32 },
    #[error("buffer of {width} x {height} columns cannot be allocated")]
    AllocationFailed { width: usize, height: usize },
}

/// Geometry, rasterisation and solver settings of one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Local extent of the simulated area (Y is ignored)
    pub size: Vec3,
    /// Distance between columns in local units
    pub separation: f32,
    /// Column density multiplier; 4 doubles the columns per axis
    pub resolution: f32,
    /// Center the bounds on the local origin instead of starting there
    pub center: bool,
    /// Stretch the separation so the columns exactly span `size`
    pub stretch: bool,
    /// Run the force and transport passes
    pub simulating: bool,
    /// Track ground wetness
    pub wetness: bool,
    /// Depth of the water table below ground that dry columns settle to
    pub table_depth: f32,
    /// Rate in m/s at which wetness drains toward the water table
    pub dry_rate: f32,
    /// Layer mask passed to the ground source
    pub height_layers: u32,
    /// Lowest ground height; missed raycasts resolve to this
    pub height_min: f32,
    /// Highest ground height; raycasts start here
    pub height_max: f32,
    /// Raycast radius as a fraction of the column separation (0 for thin rays)
    pub height_radius: f32,
    /// Largest horizontal flow speed reported to samples (m/s)
    pub speed: f32,
    /// Foam removed per second (0-1)
    pub foam_clear_rate: f32,
    /// Allocate the particle subsystem
    pub particles: bool,
    /// Ring buffer capacity for particles
    pub particle_limit: usize,
    /// Atmospheric drag rate applied to particles
    pub particle_drag: f32,
    /// Custom lanes stored with foam
    pub custom_data: CustomDataType,
    /// Storage precision per channel group
    pub precision: BufferPrecision,
    /// Largest column count allowed on either axis
    pub max_dimension: u32,
    /// Gravitational acceleration (m/s²)
    pub gravity: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            size: Vec3::new(100.0, 0.0, 100.0),
            separation: 1.0,
            resolution: 1.0,
            center: false,
            stretch: true,
            simulating: true,
            wetness: false,
            table_depth: 1.0,
            dry_rate: 1.0,
            height_layers: u32::MAX,
            height_min: -100.0,
            height_max: 100.0,
            height_radius: 0.0,
            speed: 10.0,
            foam_clear_rate: 0.5,
            particles: false,
            particle_limit: 1024,
            particle_drag: 0.9,
            custom_data: CustomDataType::None,
            precision: BufferPrecision::default(),
            max_dimension: 16384,
            gravity: 9.81,
        }
    }
}

impl SimulationConfig {
    /// Square grid of `size` metres with the given separation
    #[must_use]
    pub fn square(size: f32, separation: f32) -> Self {
        Self {
            size: Vec3::new(size, 0.0, size),
            separation,
            ..Self::default()
        }
    }

    /// Check the settings that would make geometry meaningless
    ///
    /// Column count degeneracy is checked separately by the geometry,
    /// because it also depends on clamping.
    ///
    /// # Errors
    ///
    /// Returns the first offending setting found.
    pub fn validate(&self) -> Result<(), GridConfigError> {
        if !(is_positive(self.size.x) && is_positive(self.size.z)) {
            return Err(GridConfigError::NonPositiveSize {
                x: self.size.x,
                z: self.size.z,
            });
        }
        if !is_positive(self.separation) {
            return Err(GridConfigError::NonPositiveSeparation(self.separation));
        }
        if !is_positive(self.resolution) {
            return Err(GridConfigError::NonPositiveResolution(self.resolution));
        }
        if self.height_min > self.height_max {
            return Err(GridConfigError::InvertedHeightRange {
                min: self.height_min,
                max: self.height_max,
            });
        }
        Ok(())
    }
}

/// True for finite values above zero
fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = SimulationConfig::square(10.0, 0.0);
        assert_eq!(
            config.validate(),
            Err(GridConfigError::NonPositiveSeparation(0.0))
        );

        config.separation = 1.0;
        config.height_min = 5.0;
        config.height_max = -5.0;
        assert!(matches!(
            config.validate(),
            Err(GridConfigError::InvertedHeightRange { .. })
        ));

        config = SimulationConfig::square(-1.0, 1.0);
        assert!(matches!(
            config.validate(),
            Err(GridConfigError::NonPositiveSize { .. })
        ));
    }

    #[test]
    fn test_custom_lanes() {
        assert_eq!(CustomDataType::None.lanes(), 0);
        assert_eq!(CustomDataType::Three.lanes(), 3);
    }
}
