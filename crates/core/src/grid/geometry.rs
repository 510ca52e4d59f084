//! Column layout of an activated simulation
//!
//! Derives column counts and spacing from [`SimulationConfig`] and maps
//! between world space, local space and fractional column ("pixel")
//! coordinates. A geometry is fixed once its simulation activates.

use super::config::{GridConfigError, SimulationConfig};
use crate::core_types::{Transform, Vec2, Vec3};

/// Estimate the column count along X and Z
///
/// Uses `ceil(size / separation * sqrt(resolution)) + 1` per axis, clamped
/// to `[1, max_dimension]`. Settings that make the estimate meaningless
/// (non-positive separation or resolution) yield a single column.
///
/// # Arguments
///
/// * `config` - Simulation settings
///
/// # Returns
///
/// Tuple of `(columns_x, columns_z)`
#[must_use]
pub fn estimate_column_count(config: &SimulationConfig) -> (u32, u32) {
    let axis = |size: f32| -> u32 {
        let valid = config.separation > 0.0 && config.resolution > 0.0 && size.is_finite();
        if !valid {
            return 1;
        }
        let steps = (size / config.separation * config.resolution.sqrt()).ceil();
        let max = config.max_dimension.max(1);
        // Negative or huge estimates clamp before the integer cast
        (steps.clamp(0.0, max as f32) as u32).saturating_add(1).clamp(1, max)
    };
    (axis(config.size.x), axis(config.size.z))
}

/// Finalised column layout of one simulation
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    columns: (u32, u32),
    column_min: Vec3,
    column_max: Vec3,
    separation: Vec2,
    transform: Transform,
}

impl GridGeometry {
    /// Finalise the layout for activation
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation settings
    /// * `transform` - Local-to-world placement of the simulation
    ///
    /// # Errors
    ///
    /// Returns an error when the settings are invalid or either axis ends up
    /// with a single column.
    pub fn from_config(
        config: &SimulationConfig,
        transform: Transform,
    ) -> Result<Self, GridConfigError> {
        config.validate()?;

        let (cx, cz) = estimate_column_count(config);
        if cx <= 1 || cz <= 1 {
            return Err(GridConfigError::DegenerateColumnCount { x: cx, z: cz });
        }

        let step = config.separation / config.resolution.sqrt();
        let extent = if config.stretch {
            Vec2::new(config.size.x, config.size.z)
        } else {
            Vec2::new((cx - 1) as f32 * step, (cz - 1) as f32 * step)
        };
        let origin = if config.center {
            -extent * 0.5
        } else {
            Vec2::zeros()
        };

        let column_min = Vec3::new(origin.x, config.height_min, origin.y);
        let column_max = Vec3::new(origin.x + extent.x, config.height_max, origin.y + extent.y);
        let separation = Vec2::new(extent.x / (cx - 1) as f32, extent.y / (cz - 1) as f32);

        Ok(Self {
            columns: (cx, cz),
            column_min,
            column_max,
            separation,
            transform,
        })
    }

    /// Columns along X and Z
    #[must_use]
    pub fn column_count(&self) -> (u32, u32) {
        self.columns
    }

    /// Columns along X
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.0 as usize
    }

    /// Columns along Z
    #[must_use]
    pub fn height(&self) -> usize {
        self.columns.1 as usize
    }

    /// Local position of column (0, 0), with Y at the lowest ground height
    #[must_use]
    pub fn column_min(&self) -> Vec3 {
        self.column_min
    }

    /// Local position of the last column, with Y at the highest ground height
    #[must_use]
    pub fn column_max(&self) -> Vec3 {
        self.column_max
    }

    /// Local center of the column bounds
    #[must_use]
    pub fn local_center(&self) -> Vec3 {
        (self.column_min + self.column_max) * 0.5
    }

    /// Local distance between neighbouring columns along X and Z
    #[must_use]
    pub fn separation(&self) -> Vec2 {
        self.separation
    }

    /// Horizontal area covered by one column
    #[must_use]
    pub fn column_area(&self) -> f32 {
        self.separation.x * self.separation.y
    }

    /// Placement of the simulation
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Move the simulation; the column layout itself stays fixed
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Local position of a column at local height `y`
    #[must_use]
    pub fn local_column_position(&self, px: f32, pz: f32, y: f32) -> Vec3 {
        Vec3::new(
            self.column_min.x + px * self.separation.x,
            y,
            self.column_min.z + pz * self.separation.y,
        )
    }

    /// World position of a fractional column at world height `world_y`
    #[must_use]
    pub fn pixel_to_world(&self, px: f32, pz: f32, world_y: f32) -> Vec3 {
        let mut world = self
            .transform
            .transform_point(&self.local_column_position(px, pz, 0.0));
        world.y = world_y;
        world
    }

    /// Fractional column coordinates of a world point
    #[must_use]
    pub fn world_to_pixel(&self, world: &Vec3) -> Vec2 {
        let local = self.transform.inverse_transform_point(world);
        Vec2::new(
            (local.x - self.column_min.x) / self.separation.x,
            (local.z - self.column_min.z) / self.separation.y,
        )
    }

    /// World point normalised to `[0, 1]` across the grid
    #[must_use]
    pub fn world_to_coord(&self, world: &Vec3) -> Vec2 {
        let pixel = self.world_to_pixel(world);
        Vec2::new(
            pixel.x / (self.columns.0 - 1) as f32,
            pixel.y / (self.columns.1 - 1) as f32,
        )
    }

    /// Nearest column to a world point, if the point lies over the grid
    #[must_use]
    pub fn nearest_column(&self, world: &Vec3) -> Option<(usize, usize)> {
        let pixel = self.world_to_pixel(world);
        let x = pixel.x.round();
        let z = pixel.y.round();
        let last_x = (self.columns.0 - 1) as f32;
        let last_z = (self.columns.1 - 1) as f32;
        if x < 0.0 || z < 0.0 || x > last_x || z > last_z {
            return None;
        }
        Some((x as usize, z as usize))
    }

    /// Whether a world point lies within the column bounds on X and Z
    #[must_use]
    pub fn contains_xz(&self, world: &Vec3) -> bool {
        let local = self.transform.inverse_transform_point(world);
        local.x >= self.column_min.x
            && local.x <= self.column_max.x
            && local.z >= self.column_min.z
            && local.z <= self.column_max.z
    }

    /// Distance on X and Z from a local point to the column bounds (0 inside)
    #[must_use]
    pub fn local_distance_xz(&self, local: &Vec3) -> f32 {
        let cx = local.x.clamp(self.column_min.x, self.column_max.x);
        let cz = local.z.clamp(self.column_min.z, self.column_max.z);
        ((local.x - cx).powi(2) + (local.z - cz).powi(2)).sqrt()
    }
}
