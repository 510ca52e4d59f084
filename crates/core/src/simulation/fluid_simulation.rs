//! One column-grid fluid simulation and its pass state machine
//!
//! A simulation is created from settings and a placement, and does nothing
//! until [`FluidSimulation::activate`] derives its geometry, allocates its
//! buffers and casts the ground. Passes then alternate force and transport
//! under a phase guard so a transport never runs without a force pass
//! before it, whatever cadence the stepper uses.

use crate::core_types::{FluidMaterial, Transform, Vec3};
use crate::grid::{
    chunks_in_region, estimate_column_count, ground, ChannelUpdate, ColumnState, DirtyChunkQueue,
    Field, GridBuffers, GridGeometry, GridSnapshot, GroundSource, SimulationConfig,
};
use crate::modifier::{composite, Modifier};
use crate::particles::ParticleSystem;
use crate::sampling::{evaluate_texels, FluidSample};
use crate::solver::{
    step_forces_cpu, step_transport_cpu, step_wetness_cpu, ForceParams, PassTimer, PixelCounter,
    TransportInput, TransportParams, WetnessParams,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a simulation stands in its pass cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationPhase {
    /// No geometry or buffers; every operation is a no-op
    Inactive,
    /// Activated, no pass run yet
    Activated,
    /// Forces ran; transport is due
    ForcesApplied,
    /// Transport ran; forces are due
    TransportApplied,
}

/// Grid state that only exists while activated
#[derive(Debug)]
struct ActiveGrid {
    geometry: GridGeometry,
    buffers: GridBuffers,
    particles: Option<ParticleSystem>,
}

/// Shallow-water simulation over one rectangular column grid
#[derive(Debug)]
pub struct FluidSimulation {
    config: SimulationConfig,
    transform: Transform,
    phase: SimulationPhase,
    grid: Option<ActiveGrid>,
    dirty: DirtyChunkQueue,
    foam_counter: PixelCounter,
    dry_counter: PixelCounter,
}

impl FluidSimulation {
    /// Create an inactive simulation
    ///
    /// # Arguments
    ///
    /// * `config` - Activation settings
    /// * `transform` - Placement of the grid's local space in the world
    #[must_use]
    pub fn new(config: SimulationConfig, transform: Transform) -> Self {
        Self {
            config,
            transform,
            phase: SimulationPhase::Inactive,
            grid: None,
            dirty: DirtyChunkQueue::default(),
            foam_counter: PixelCounter::default(),
            dry_counter: PixelCounter::default(),
        }
    }

    /// Activation settings
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the settings; only possible while inactive
    ///
    /// # Returns
    ///
    /// `false` if the simulation is active and the settings were kept
    pub fn set_config(&mut self, config: SimulationConfig) -> bool {
        if self.is_activated() {
            return false;
        }
        self.config = config;
        true
    }

    /// Toggle the force and transport passes without deactivating
    pub fn set_simulating(&mut self, simulating: bool) {
        self.config.simulating = simulating;
    }

    /// Toggle the wetness pass
    pub fn set_wetness(&mut self, wetness: bool) {
        self.config.wetness = wetness;
    }

    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Move the simulation; the column layout is kept
    pub fn set_transform(&mut self, transform: Transform) {
        if let Some(grid) = &mut self.grid {
            grid.geometry.set_transform(transform.clone());
        }
        self.transform = transform;
    }

    #[must_use]
    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.grid.is_some()
    }

    /// Column count the current settings would produce
    #[must_use]
    pub fn estimated_column_count(&self) -> (u32, u32) {
        estimate_column_count(&self.config)
    }

    /// Column layout, while activated
    #[must_use]
    pub fn geometry(&self) -> Option<&GridGeometry> {
        self.grid.as_ref().map(|g| &g.geometry)
    }

    /// Currently published grid state, while activated
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<GridSnapshot>> {
        self.grid.as_ref().map(|g| g.buffers.snapshot())
    }

    /// Publish counter of the grid state (0 while inactive)
    #[must_use]
    pub fn version(&self) -> u64 {
        self.grid.as_ref().map_or(0, |g| g.buffers.version())
    }

    /// Particle ring buffer, when activated with particles enabled
    #[must_use]
    pub fn particles(&self) -> Option<&ParticleSystem> {
        self.grid.as_ref().and_then(|g| g.particles.as_ref())
    }

    /// Chunks waiting for a ground re-cast
    #[must_use]
    pub fn dirty_chunk_count(&self) -> usize {
        self.dirty.len()
    }

    /// Derive geometry, allocate buffers and cast the ground
    ///
    /// Invalid settings leave the simulation inactive with a warning.
    ///
    /// # Arguments
    ///
    /// * `ground` - Scene the ground heights are cast against
    ///
    /// # Returns
    ///
    /// Whether the simulation is activated afterwards
    pub fn activate(&mut self, ground: &dyn GroundSource) -> bool {
        if self.is_activated() {
            return true;
        }
        let _timer = PassTimer::new("activate");

        let geometry = match GridGeometry::from_config(&self.config, self.transform.clone()) {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!(error = %err, "Simulation not activated");
                return false;
            }
        };
        let buffers = match GridBuffers::allocate(
            geometry.width(),
            geometry.height(),
            self.config.precision,
            self.config.custom_data,
        ) {
            Ok(buffers) => buffers,
            Err(err) => {
                warn!(error = %err, "Simulation not activated");
                return false;
            }
        };

        let particles = self.config.particles.then(|| {
            ParticleSystem::new(
                self.config.particle_limit,
                self.config.particle_drag,
                Vec3::new(0.0, -self.config.gravity, 0.0),
            )
        });
        let (width, height) = (geometry.width(), geometry.height());
        self.grid = Some(ActiveGrid {
            geometry,
            buffers,
            particles,
        });
        self.phase = SimulationPhase::Activated;
        self.foam_counter = PixelCounter::default();
        self.dry_counter = PixelCounter::default();

        self.rasterize_all(ground);
        self.replace_fluids(&FluidMaterial::clear(), 0.0, 0.0);
        self.replace_outflow();

        info!(width, height, particles = self.config.particles, "Simulation activated");
        true
    }

    /// Release buffers and return to the inactive state
    ///
    /// # Returns
    ///
    /// `false` if the simulation was not active
    pub fn deactivate(&mut self) -> bool {
        let Some(grid) = self.grid.take() else {
            return false;
        };
        grid.buffers.release();
        self.dirty.clear();
        self.phase = SimulationPhase::Inactive;
        info!("Simulation deactivated");
        true
    }

    /// Force pass: outflow from surface slopes
    ///
    /// Runs only while simulating and when no transport is pending.
    ///
    /// # Returns
    ///
    /// Whether the pass ran
    pub fn update_fluid_forces(&mut self, dt: f32) -> bool {
        if !self.config.simulating
            || !matches!(
                self.phase,
                SimulationPhase::Activated | SimulationPhase::TransportApplied
            )
        {
            return false;
        }
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let _timer = PassTimer::new("fluid_forces");

        let snap = grid.buffers.snapshot();
        let (width, height) = (snap.width(), snap.height());
        let mut outflow = Field::new(width, height);
        step_forces_cpu(
            snap.ground.as_slice(),
            snap.depth.as_slice(),
            snap.material.as_slice(),
            snap.outflow.as_slice(),
            outflow.as_mut_slice(),
            width,
            height,
            ForceParams {
                dt,
                gravity: self.config.gravity,
                separation: grid.geometry.separation(),
            },
        );
        grid.buffers.swap(ChannelUpdate::Outflow(outflow));
        self.phase = SimulationPhase::ForcesApplied;
        true
    }

    /// Transport pass: move fluid and its properties along the outflow
    ///
    /// Runs only after a force pass.
    ///
    /// # Returns
    ///
    /// Whether the pass ran
    pub fn update_fluid_transport(&mut self, dt: f32) -> bool {
        if !self.config.simulating || self.phase != SimulationPhase::ForcesApplied {
            return false;
        }
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let _timer = PassTimer::new("fluid_transport");

        let foam_clear = self.foam_counter.advance(self.config.foam_clear_rate, dt);
        let snap = grid.buffers.snapshot();
        let out = step_transport_cpu(
            TransportInput {
                depth: &snap.depth,
                outflow: &snap.outflow,
                color: &snap.color,
                material: &snap.material,
                foam: &snap.foam,
            },
            TransportParams {
                dt,
                separation: grid.geometry.separation(),
                foam_clear,
            },
        );
        grid.buffers.swap_all([
            ChannelUpdate::Depth(out.depth),
            ChannelUpdate::Color(out.color),
            ChannelUpdate::Material(out.material),
            ChannelUpdate::Foam(out.foam),
        ]);
        self.phase = SimulationPhase::TransportApplied;
        true
    }

    /// Wetness pass: soak columns under fluid and dry the rest
    ///
    /// # Returns
    ///
    /// Whether the pass ran
    pub fn update_fluid_wetness(&mut self, dt: f32) -> bool {
        if !self.config.wetness {
            return false;
        }
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let _timer = PassTimer::new("fluid_wetness");

        let dry_amount = self.dry_counter.advance(self.config.dry_rate, dt);
        let snap = grid.buffers.snapshot();
        let mut ground = Field::new(snap.width(), snap.height());
        step_wetness_cpu(
            snap.ground.as_slice(),
            snap.depth.as_slice(),
            ground.as_mut_slice(),
            snap.width(),
            WetnessParams {
                dry_amount,
                table_depth: self.config.table_depth,
            },
        );
        grid.buffers.swap(ChannelUpdate::Ground(ground));
        true
    }

    /// Particle passes: contribute, then forces, then move
    ///
    /// # Returns
    ///
    /// Whether the particles were updated
    pub fn update_particles(&mut self, dt: f32) -> bool {
        if !self.config.simulating {
            return false;
        }
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let Some(particles) = &mut grid.particles else {
            return false;
        };

        let snap = grid.buffers.snapshot();
        if let Some(updates) = particles.contribute(&grid.geometry, &snap, dt) {
            grid.buffers.swap_all(updates);
        }
        particles.apply_forces(dt);
        particles.move_particles(dt);
        true
    }

    /// Apply one modifier against this simulation
    ///
    /// # Returns
    ///
    /// Whether the grid changed
    pub fn apply_modifier(&mut self, modifier: &Modifier, multiplier: f32) -> bool {
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let snap = grid.buffers.snapshot();
        match composite(modifier, &grid.geometry, &snap, multiplier) {
            Some(updates) => {
                grid.buffers.swap_all(updates);
                true
            }
            None => false,
        }
    }

    /// Set every column's ground height and wet offset
    pub fn replace_heights(&mut self, ground: f32, wet_offset: f32) {
        if let Some(grid) = &mut self.grid {
            let (w, h) = (grid.buffers.width(), grid.buffers.height());
            grid.buffers
                .swap(ChannelUpdate::Ground(Field::with_value(w, h, [ground, wet_offset])));
        }
    }

    /// Fill every column with `depth` meters of `fluid`
    pub fn replace_fluids(&mut self, fluid: &FluidMaterial, depth: f32, foam: f32) {
        if let Some(grid) = &mut self.grid {
            let (w, h) = (grid.buffers.width(), grid.buffers.height());
            grid.buffers.swap_all([
                ChannelUpdate::Depth(Field::with_value(w, h, depth.max(0.0))),
                ChannelUpdate::Color(Field::with_value(w, h, fluid.color)),
                ChannelUpdate::Material(Field::with_value(w, h, fluid.material_lanes())),
                ChannelUpdate::Foam(Field::with_value(w, h, fluid.foam_lanes(foam))),
            ]);
        }
    }

    /// Zero the outflow of every column
    pub fn replace_outflow(&mut self) {
        if let Some(grid) = &mut self.grid {
            let (w, h) = (grid.buffers.width(), grid.buffers.height());
            grid.buffers.swap(ChannelUpdate::Outflow(Field::new(w, h)));
        }
    }

    /// Re-cast the ground of the whole grid and forget pending chunks
    pub fn rasterize_all(&mut self, source: &dyn GroundSource) {
        let Some(grid) = &mut self.grid else {
            return;
        };
        let _timer = PassTimer::new("ground_full");
        let mut field = grid.buffers.current().ground.as_ref().clone();
        let (w, h) = (field.width, field.height);
        ground::rasterize_region(&mut field, &grid.geometry, &self.config, source, 0..w, 0..h);
        grid.buffers.swap(ChannelUpdate::Ground(field));
        self.dirty.clear();
    }

    /// Queue the chunks under a world-space square for re-casting
    ///
    /// # Returns
    ///
    /// Number of chunks newly queued
    pub fn mark_dirty(&mut self, center: &Vec3, radius: f32) -> usize {
        let Some(grid) = &self.grid else {
            return 0;
        };
        let queued = chunks_in_region(&grid.geometry, center, radius)
            .into_iter()
            .filter(|&chunk| self.dirty.push(chunk))
            .count();
        if queued > 0 {
            debug!(queued, pending = self.dirty.len(), "Ground chunks dirtied");
        }
        queued
    }

    /// Re-cast the oldest dirty chunk
    ///
    /// # Returns
    ///
    /// Whether a chunk was re-cast
    pub fn drain_dirty_chunk(&mut self, source: &dyn GroundSource) -> bool {
        let Some(grid) = &mut self.grid else {
            return false;
        };
        let Some(chunk) = self.dirty.pop() else {
            return false;
        };
        let _timer = PassTimer::new("ground_chunk");
        let mut field = grid.buffers.current().ground.as_ref().clone();
        ground::rasterize_chunk(&mut field, &grid.geometry, &self.config, source, chunk);
        grid.buffers.swap(ChannelUpdate::Ground(field));
        true
    }

    /// Whether a world point lies over the grid on X and Z
    #[must_use]
    pub fn overlap_xz(&self, world: &Vec3) -> bool {
        self.geometry().is_some_and(|g| g.contains_xz(world))
    }

    /// Overlap of a world-space disc with the grid on X and Z
    ///
    /// Reports 1 when the disc's center lies over the grid and 0 otherwise.
    #[must_use]
    pub fn overlap_xz_radius(&self, world: &Vec3, _radius: f32) -> f32 {
        if self.overlap_xz(world) {
            1.0
        } else {
            0.0
        }
    }

    /// Read the fluid at a world point immediately
    #[must_use]
    pub fn sample_at(&self, world: &Vec3) -> Option<FluidSample> {
        let grid = self.grid.as_ref()?;
        let texels = evaluate_texels(
            &grid.geometry,
            grid.buffers.current(),
            world,
            self.config.speed,
        );
        Some(FluidSample::from_texels(&texels, self.overlap_xz_radius(world, 0.0)))
    }

    /// Every channel of one column
    #[must_use]
    pub fn column(&self, x: usize, z: usize) -> Option<ColumnState> {
        self.grid.as_ref()?.buffers.current().column(x, z)
    }

    /// Fluid volume held by the grid in cubic meters
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.grid.as_ref().map_or(0.0, |g| {
            g.buffers.current().total_volume(g.geometry.column_area())
        })
    }

    /// Inject a particle
    ///
    /// # Returns
    ///
    /// `false` unless activated with particles enabled
    pub fn add_particle(
        &mut self,
        fluid: &FluidMaterial,
        depth: f32,
        position: Vec3,
        velocity: Vec3,
        life: f32,
        foam: f32,
    ) -> bool {
        let Some(particles) = self.grid.as_mut().and_then(|g| g.particles.as_mut()) else {
            return false;
        };
        particles.add(fluid, depth, position, velocity, life, foam);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HeightField;
    use approx::assert_relative_eq;

    fn ground() -> HeightField {
        HeightField::flat(40.0, 40.0, 1.0, 0.0)
    }

    fn active(size: f32) -> FluidSimulation {
        let mut sim =
            FluidSimulation::new(SimulationConfig::square(size, 1.0), Transform::identity());
        assert!(sim.activate(&ground()));
        sim
    }

    #[test]
    fn test_degenerate_config_stays_inactive() {
        let mut config = SimulationConfig::square(10.0, 1.0);
        config.size.x = -1.0;
        let mut sim = FluidSimulation::new(config, Transform::identity());
        assert!(!sim.activate(&ground()));
        assert_eq!(sim.phase(), SimulationPhase::Inactive);
        assert!(!sim.update_fluid_forces(0.1));
        assert!(sim.snapshot().is_none());
        assert!(sim.sample_at(&Vec3::zeros()).is_none());
    }

    #[test]
    fn test_activation_casts_ground_and_clears_fluid() {
        let sim = active(10.0);
        let column = sim.column(3, 4).unwrap();
        assert_relative_eq!(column.ground, 0.0);
        assert_relative_eq!(column.wet, -1.0);
        assert_eq!(column.depth, 0.0);
        assert_eq!(column.color, [0.0; 4]);
        assert!(sim.version() > 0);
    }

    #[test]
    fn test_phase_guard_alternates() {
        let mut sim = active(10.0);
        assert!(!sim.update_fluid_transport(0.1));
        assert!(sim.update_fluid_forces(0.1));
        assert!(!sim.update_fluid_forces(0.1));
        assert!(sim.update_fluid_transport(0.1));
        assert_eq!(sim.phase(), SimulationPhase::TransportApplied);
    }

    #[test]
    fn test_replace_fluids_then_sample() {
        let mut sim = active(10.0);
        let red = FluidMaterial::with_color([1.0, 0.0, 0.0, 1.0]);
        sim.replace_fluids(&red, 2.0, 0.0);
        let sample = sim.sample_at(&Vec3::new(3.3, 0.0, 7.1)).unwrap();
        assert_eq!(sample.depth, 2.0);
        assert_eq!(sample.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(sample.overlap, 1.0);
        assert_relative_eq!(sim.total_volume(), 2.0 * 121.0, epsilon = 1e-3);
    }

    #[test]
    fn test_dirty_chunks_drain_one_at_a_time() {
        let mut sim = active(100.0);
        assert_eq!(sim.mark_dirty(&Vec3::new(50.0, 0.0, 50.0), 40.0), 4);
        assert_eq!(sim.mark_dirty(&Vec3::new(50.0, 0.0, 50.0), 40.0), 0);
        assert!(sim.drain_dirty_chunk(&ground()));
        assert_eq!(sim.dirty_chunk_count(), 3);
        sim.rasterize_all(&ground());
        assert_eq!(sim.dirty_chunk_count(), 0);
    }

    #[test]
    fn test_particles_need_enabling() {
        let mut sim = active(10.0);
        let fluid = FluidMaterial::default();
        assert!(!sim.add_particle(&fluid, 1.0, Vec3::zeros(), Vec3::zeros(), 1.0, 0.0));

        let mut config = SimulationConfig::square(10.0, 1.0);
        config.particles = true;
        config.particle_limit = 4;
        let mut sim = FluidSimulation::new(config, Transform::identity());
        assert!(sim.activate(&ground()));
        let above = Vec3::new(5.0, 3.0, 5.0);
        assert!(sim.add_particle(&fluid, 1.0, above, Vec3::zeros(), 1.0, 0.0));
        assert!(sim.update_particles(0.1));
        assert_eq!(sim.particles().unwrap().live_count(), 1);
    }

    #[test]
    fn test_deactivate_releases() {
        let mut sim = active(10.0);
        assert!(sim.deactivate());
        assert!(!sim.is_activated());
        assert!(!sim.deactivate());
        assert_eq!(sim.total_volume(), 0.0);
    }
}
