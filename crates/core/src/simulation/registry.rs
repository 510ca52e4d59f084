//! Explicit set of simulations owned by a world
//!
//! Handles are stable for the life of the registry; removed slots are not
//! reused.

use super::fluid_simulation::FluidSimulation;
use crate::core_types::{distance_xz, Vec3};
use serde::{Deserialize, Serialize};

/// Handle of a simulation inside a [`SimulationRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimulationId(pub u32);

/// Simulations addressable by handle, in insertion order
#[derive(Debug, Default)]
pub struct SimulationRegistry {
    slots: Vec<Option<FluidSimulation>>,
}

impl SimulationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a simulation
    pub fn insert(&mut self, simulation: FluidSimulation) -> SimulationId {
        let id = SimulationId(self.slots.len() as u32);
        self.slots.push(Some(simulation));
        id
    }

    /// Give a simulation back to the caller
    pub fn remove(&mut self, id: SimulationId) -> Option<FluidSimulation> {
        self.slots.get_mut(id.0 as usize)?.take()
    }

    #[must_use]
    pub fn get(&self, id: SimulationId) -> Option<&FluidSimulation> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SimulationId) -> Option<&mut FluidSimulation> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    /// Number of simulations held, active or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every simulation with its handle
    pub fn simulations(&self) -> impl Iterator<Item = (SimulationId, &FluidSimulation)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SimulationId(i as u32), s)))
    }

    /// Every simulation, mutably
    pub fn simulations_mut(
        &mut self,
    ) -> impl Iterator<Item = (SimulationId, &mut FluidSimulation)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (SimulationId(i as u32), s)))
    }

    /// Activated simulations only
    pub fn iter_active(&self) -> impl Iterator<Item = (SimulationId, &FluidSimulation)> {
        self.simulations().filter(|(_, s)| s.is_activated())
    }

    /// Activated simulations only, mutably
    pub fn iter_active_mut(
        &mut self,
    ) -> impl Iterator<Item = (SimulationId, &mut FluidSimulation)> {
        self.simulations_mut().filter(|(_, s)| s.is_activated())
    }

    /// Simulation best suited to serve a world point
    ///
    /// An active `preferred` simulation wins outright. Otherwise the active
    /// simulation with the smallest distance from the point to its column
    /// bounds on X and Z is chosen, with that local distance rescaled into
    /// world units by the ratio of the point's world and local distances to
    /// the simulation's center.
    ///
    /// # Arguments
    ///
    /// * `point` - World position
    /// * `preferred` - Simulation to use whenever it is active
    #[must_use]
    pub fn find_nearest(
        &self,
        point: &Vec3,
        preferred: Option<SimulationId>,
    ) -> Option<SimulationId> {
        if let Some(id) = preferred {
            if self.get(id).is_some_and(FluidSimulation::is_activated) {
                return Some(id);
            }
        }

        self.iter_active()
            .filter_map(|(id, sim)| {
                let geometry = sim.geometry()?;
                let local_center = geometry.local_center();
                let world_center = geometry.transform().transform_point(&local_center);
                let local_point = geometry.transform().inverse_transform_point(point);

                let world_sep = distance_xz(&world_center, point);
                let local_sep = distance_xz(&local_center, &local_point);
                let mut distance = geometry.local_distance_xz(&local_point);
                if local_sep > 0.0 {
                    distance *= world_sep / local_sep;
                }
                Some((id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Queue ground re-casts under a world-space square on every active simulation
    ///
    /// # Returns
    ///
    /// Total number of chunks newly queued
    pub fn dirty_region(&mut self, center: &Vec3, radius: f32) -> usize {
        self.iter_active_mut()
            .map(|(_, sim)| sim.mark_dirty(center, radius))
            .sum()
    }
}
