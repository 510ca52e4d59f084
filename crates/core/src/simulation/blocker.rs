//! Moving solids that invalidate the ground under them

use super::registry::SimulationRegistry;
use crate::core_types::Vec3;
use serde::{Deserialize, Serialize};

/// Footprint of a moving solid object
///
/// The blocker remembers the footprint it last reported. Whenever the
/// footprint changes, or the blocker is enabled or disabled, both the old
/// and the new footprint are dirtied in every active simulation so the
/// ground under them is re-cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundBlocker {
    center: Vec3,
    radius: f32,
    enabled: bool,
    reported: Option<(Vec3, f32)>,
    dirty: bool,
}

impl GroundBlocker {
    /// Enabled blocker; its footprint is reported on the first sync
    #[must_use]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius,
            enabled: true,
            reported: None,
            dirty: true,
        }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_center(&mut self, center: Vec3) {
        if center != self.center {
            self.center = center;
            self.dirty = true;
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius != self.radius {
            self.radius = radius;
            self.dirty = true;
        }
    }

    /// Force a re-cast on the next sync even if nothing moved
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.dirty = true;
        }
    }

    pub fn disable(&mut self) {
        if self.enabled {
            self.enabled = false;
            self.dirty = true;
        }
    }

    /// Dirty the old and new footprints if anything changed
    ///
    /// # Returns
    ///
    /// Number of chunks newly queued across all simulations
    pub fn sync(&mut self, registry: &mut SimulationRegistry) -> usize {
        if !self.dirty {
            return 0;
        }
        self.dirty = false;

        let mut queued = 0;
        if let Some((center, radius)) = self.reported.take() {
            queued += registry.dirty_region(&center, radius);
        }
        if self.enabled {
            queued += registry.dirty_region(&self.center, self.radius);
            self.reported = Some((self.center, self.radius));
        }
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Transform;
    use crate::grid::{HeightField, SimulationConfig};
    use crate::simulation::{FluidSimulation, SimulationId};

    fn registry() -> SimulationRegistry {
        let mut registry = SimulationRegistry::new();
        let mut sim =
            FluidSimulation::new(SimulationConfig::square(200.0, 1.0), Transform::identity());
        assert!(sim.activate(&HeightField::flat(10.0, 10.0, 1.0, 0.0)));
        registry.insert(sim);
        registry
    }

    fn pending(registry: &SimulationRegistry) -> usize {
        registry.get(SimulationId(0)).map_or(0, FluidSimulation::dirty_chunk_count)
    }

    #[test]
    fn test_move_dirties_old_and_new_footprint() {
        let mut registry = registry();
        let mut blocker = GroundBlocker::new(Vec3::new(10.0, 0.0, 10.0), 2.0);
        assert_eq!(blocker.sync(&mut registry), 1);
        assert_eq!(blocker.sync(&mut registry), 0);

        let flat = HeightField::flat(10.0, 10.0, 1.0, 0.0);
        registry.get_mut(SimulationId(0)).unwrap().rasterize_all(&flat);
        blocker.set_center(Vec3::new(150.0, 0.0, 150.0));
        assert_eq!(blocker.sync(&mut registry), 2);
        assert_eq!(pending(&registry), 2);
    }

    #[test]
    fn test_disable_dirties_last_footprint_only() {
        let mut registry = registry();
        let mut blocker = GroundBlocker::new(Vec3::new(10.0, 0.0, 10.0), 2.0);
        blocker.sync(&mut registry);
        let flat = HeightField::flat(10.0, 10.0, 1.0, 0.0);
        registry.get_mut(SimulationId(0)).unwrap().rasterize_all(&flat);

        blocker.disable();
        assert_eq!(blocker.sync(&mut registry), 1);
        blocker.set_center(Vec3::new(150.0, 0.0, 150.0));
        assert_eq!(blocker.sync(&mut registry), 0);
    }
}
