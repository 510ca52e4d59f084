//! Per-tick pass ordering and update cadence

use super::registry::{SimulationId, SimulationRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How often the fluid passes run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Forces, modifiers and transport every tick
    #[default]
    EveryFrame,
    /// Forces on even ticks; modifiers and transport on odd ticks with a
    /// doubled delta. Particles still update every tick.
    EveryOtherFrame,
}

/// Which passes a tick runs, and with what delta
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    pub forces: bool,
    pub modifiers: bool,
    pub transport: bool,
    /// Delta used by the fluid passes and continuous modifiers
    pub step_dt: f32,
}

/// Outcome of one stepped tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Simulations whose force pass ran
    pub forces: Vec<SimulationId>,
    /// Simulations whose transport pass ran
    pub transport: Vec<SimulationId>,
    /// Simulations whose particles updated
    pub particles: Vec<SimulationId>,
    pub modifiers_ran: bool,
}

/// Drives the fluid passes of every active simulation in a fixed order
#[derive(Debug, Clone, Default)]
pub struct SimulationStepper {
    mode: UpdateMode,
    tick: u64,
}

impl SimulationStepper {
    #[must_use]
    pub fn new(mode: UpdateMode) -> Self {
        Self { mode, tick: 0 }
    }

    #[must_use]
    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: UpdateMode) {
        self.mode = mode;
    }

    /// Ticks stepped so far
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Passes due on the next tick
    #[must_use]
    pub fn plan(&self, dt: f32) -> StepPlan {
        match self.mode {
            UpdateMode::EveryFrame => StepPlan {
                forces: true,
                modifiers: true,
                transport: true,
                step_dt: dt,
            },
            UpdateMode::EveryOtherFrame => {
                let odd = self.tick % 2 == 1;
                StepPlan {
                    forces: !odd,
                    modifiers: odd,
                    transport: odd,
                    step_dt: dt * 2.0,
                }
            }
        }
    }

    /// Run one tick: forces, then modifiers, then transport, then particles
    ///
    /// # Arguments
    ///
    /// * `registry` - Simulations to step; inactive ones are skipped
    /// * `dt` - Tick length in seconds
    /// * `apply_modifiers` - Called between forces and transport with the
    ///   step delta, when modifiers are due
    pub fn step(
        &mut self,
        registry: &mut SimulationRegistry,
        dt: f32,
        mut apply_modifiers: impl FnMut(&mut SimulationRegistry, f32),
    ) -> StepReport {
        let plan = self.plan(dt);
        self.tick += 1;
        let mut report = StepReport::default();

        if plan.forces {
            for (id, sim) in registry.iter_active_mut() {
                if sim.update_fluid_forces(plan.step_dt) {
                    report.forces.push(id);
                }
            }
        }
        if plan.modifiers {
            apply_modifiers(registry, plan.step_dt);
            report.modifiers_ran = true;
        }
        if plan.transport {
            for (id, sim) in registry.iter_active_mut() {
                if sim.update_fluid_transport(plan.step_dt) {
                    report.transport.push(id);
                }
            }
        }
        for (id, sim) in registry.iter_active_mut() {
            if sim.update_particles(dt) {
                report.particles.push(id);
            }
        }

        debug!(
            tick = self.tick,
            forces = report.forces.len(),
            transport = report.transport.len(),
            particles = report.particles.len(),
            "Stepped simulations"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Transform;
    use crate::grid::{HeightField, SimulationConfig};
    use crate::simulation::FluidSimulation;

    fn registry() -> SimulationRegistry {
        let mut registry = SimulationRegistry::new();
        let mut sim =
            FluidSimulation::new(SimulationConfig::square(10.0, 1.0), Transform::identity());
        assert!(sim.activate(&HeightField::flat(20.0, 20.0, 1.0, 0.0)));
        registry.insert(sim);
        registry
    }

    #[test]
    fn test_every_frame_runs_all_passes() {
        let mut registry = registry();
        let mut stepper = SimulationStepper::new(UpdateMode::EveryFrame);
        let mut deltas = Vec::new();
        let report = stepper.step(&mut registry, 0.02, |_, dt| deltas.push(dt));
        assert_eq!(report.forces.len(), 1);
        assert_eq!(report.transport.len(), 1);
        assert!(report.modifiers_ran);
        assert_eq!(deltas, vec![0.02]);
    }

    #[test]
    fn test_every_other_frame_alternates() {
        let mut registry = registry();
        let mut stepper = SimulationStepper::new(UpdateMode::EveryOtherFrame);
        let mut deltas = Vec::new();

        let even = stepper.step(&mut registry, 0.02, |_, dt| deltas.push(dt));
        assert_eq!(even.forces.len(), 1);
        assert!(even.transport.is_empty());
        assert!(!even.modifiers_ran);

        let odd = stepper.step(&mut registry, 0.02, |_, dt| deltas.push(dt));
        assert!(odd.forces.is_empty());
        assert_eq!(odd.transport.len(), 1);
        assert_eq!(deltas, vec![0.04]);
        assert_eq!(stepper.tick_count(), 2);
    }
}
