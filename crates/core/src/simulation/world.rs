//! World root owning every simulation, edit source and query owner
//!
//! [`FlowWorld`] replaces process-wide managers: hosts create one, register
//! simulations, modifiers, emitters, probes and blockers with it, and call
//! [`FlowWorld::tick`] once per fixed physics step.

use super::blocker::GroundBlocker;
use super::events::{FlowEvent, FlowObserver, ObserverList};
use super::fluid_simulation::FluidSimulation;
use super::registry::{SimulationId, SimulationRegistry};
use super::stepper::{SimulationStepper, StepReport, UpdateMode};
use crate::grid::{GroundScene, GroundSource};
use crate::modifier::{ApplyCadence, Modifier, ModifierId};
use crate::particles::ParticleEmitter;
use crate::sampling::{AsyncSampler, FlowProbe, ReadbackMode, DEFAULT_BATCH_WIDTH};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// World-level settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Cadence of the fluid passes
    pub update_mode: UpdateMode,
    /// Texels per sampler batch
    pub sample_batch_width: usize,
    /// Readback strategy of the sampler
    pub readback: ReadbackMode,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::EveryFrame,
            sample_batch_width: DEFAULT_BATCH_WIDTH,
            readback: ReadbackMode::default(),
        }
    }
}

/// What one world tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    /// Passes run by the stepper
    pub step: StepReport,
    /// Particles injected by emitters
    pub emitted: usize,
    /// Modifier applications
    pub modifiers_applied: usize,
    /// Ground chunks re-cast
    pub chunks_drained: usize,
    /// Sample requests accepted this tick
    pub samples_requested: usize,
    /// Samples delivered to their owners this tick
    pub samples_delivered: usize,
}

/// Owns the simulations and everything that edits or queries them
pub struct FlowWorld<G: GroundSource = GroundScene> {
    config: WorldConfig,
    registry: SimulationRegistry,
    modifiers: Vec<(ModifierId, Modifier)>,
    next_modifier: u32,
    emitters: Vec<ParticleEmitter>,
    probes: Vec<Arc<Mutex<FlowProbe>>>,
    blockers: Vec<GroundBlocker>,
    sampler: AsyncSampler,
    stepper: SimulationStepper,
    ground: G,
    observers: ObserverList,
}

impl<G: GroundSource + std::fmt::Debug> std::fmt::Debug for FlowWorld<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowWorld")
            .field("config", &self.config)
            .field("simulations", &self.registry.len())
            .field("modifiers", &self.modifiers.len())
            .field("emitters", &self.emitters.len())
            .field("probes", &self.probes.len())
            .field("blockers", &self.blockers.len())
            .field("sampler", &self.sampler)
            .field("ground", &self.ground)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl<G: GroundSource> FlowWorld<G> {
    /// Empty world over `ground`
    #[must_use]
    pub fn new(config: WorldConfig, ground: G) -> Self {
        Self {
            config,
            registry: SimulationRegistry::new(),
            modifiers: Vec::new(),
            next_modifier: 0,
            emitters: Vec::new(),
            probes: Vec::new(),
            blockers: Vec::new(),
            sampler: AsyncSampler::new(config.sample_batch_width, config.readback),
            stepper: SimulationStepper::new(config.update_mode),
            ground,
            observers: ObserverList::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Change the pass cadence; the tick counter keeps running
    pub fn set_update_mode(&mut self, mode: UpdateMode) {
        self.config.update_mode = mode;
        self.stepper.set_mode(mode);
    }

    #[must_use]
    pub fn registry(&self) -> &SimulationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SimulationRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn simulation(&self, id: SimulationId) -> Option<&FluidSimulation> {
        self.registry.get(id)
    }

    pub fn simulation_mut(&mut self, id: SimulationId) -> Option<&mut FluidSimulation> {
        self.registry.get_mut(id)
    }

    #[must_use]
    pub fn ground(&self) -> &G {
        &self.ground
    }

    /// Edit the ground; pair with a blocker or [`SimulationRegistry::dirty_region`]
    /// so the simulations re-cast the changed area
    pub fn ground_mut(&mut self) -> &mut G {
        &mut self.ground
    }

    #[must_use]
    pub fn sampler(&self) -> &AsyncSampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut AsyncSampler {
        &mut self.sampler
    }

    /// Ticks run so far
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.stepper.tick_count()
    }

    /// Register a simulation and activate it against the world's ground
    ///
    /// # Returns
    ///
    /// Handle of the simulation, which stays registered even when activation
    /// is rejected
    pub fn add_simulation(&mut self, simulation: FluidSimulation) -> SimulationId {
        let id = self.registry.insert(simulation);
        self.activate_simulation(id);
        id
    }

    /// Activate a registered simulation
    pub fn activate_simulation(&mut self, id: SimulationId) -> bool {
        let Some(sim) = self.registry.get_mut(id) else {
            return false;
        };
        if !sim.activate(&self.ground) {
            return false;
        }
        self.observers.publish(&FlowEvent::SimulationActivated(id));
        true
    }

    /// Deactivate a registered simulation and release its buffers
    pub fn deactivate_simulation(&mut self, id: SimulationId) -> bool {
        let Some(sim) = self.registry.get_mut(id) else {
            return false;
        };
        if !sim.deactivate() {
            return false;
        }
        self.observers.publish(&FlowEvent::SimulationDeactivated(id));
        true
    }

    /// Deactivate and drop a simulation; its handle is never reused
    pub fn remove_simulation(&mut self, id: SimulationId) -> Option<FluidSimulation> {
        self.deactivate_simulation(id);
        self.registry.remove(id)
    }

    pub fn add_modifier(&mut self, modifier: Modifier) -> ModifierId {
        let id = ModifierId(self.next_modifier);
        self.next_modifier += 1;
        self.modifiers.push((id, modifier));
        id
    }

    pub fn remove_modifier(&mut self, id: ModifierId) -> Option<Modifier> {
        let index = self.modifiers.iter().position(|(m, _)| *m == id)?;
        Some(self.modifiers.remove(index).1)
    }

    #[must_use]
    pub fn modifier(&self, id: ModifierId) -> Option<&Modifier> {
        self.modifiers.iter().find(|(m, _)| *m == id).map(|(_, m)| m)
    }

    pub fn modifier_mut(&mut self, id: ModifierId) -> Option<&mut Modifier> {
        self.modifiers.iter_mut().find(|(m, _)| *m == id).map(|(_, m)| m)
    }

    /// Apply a modifier against every active simulation right away
    ///
    /// This is how `Manually` modifiers run, but any enabled modifier
    /// may be applied this way.
    ///
    /// # Returns
    ///
    /// Number of simulations whose grid was edited
    pub fn apply_modifier_now(&mut self, id: ModifierId, multiplier: f32) -> usize {
        let Some((_, modifier)) = self.modifiers.iter().find(|(m, _)| *m == id) else {
            return 0;
        };
        if !modifier.is_enabled() {
            return 0;
        }
        apply_to_all(&mut self.registry, &mut self.observers, id, modifier, multiplier)
    }

    pub fn add_emitter(&mut self, emitter: ParticleEmitter) -> usize {
        self.emitters.push(emitter);
        self.emitters.len() - 1
    }

    pub fn emitter_mut(&mut self, index: usize) -> Option<&mut ParticleEmitter> {
        self.emitters.get_mut(index)
    }

    /// Register a probe; the world samples it whenever the sampler is ready
    pub fn add_probe(&mut self, probe: FlowProbe) -> Arc<Mutex<FlowProbe>> {
        let probe = Arc::new(Mutex::new(probe));
        self.probes.push(Arc::clone(&probe));
        probe
    }

    /// Stop sampling a probe
    pub fn remove_probe(&mut self, probe: &Arc<Mutex<FlowProbe>>) -> bool {
        let before = self.probes.len();
        self.probes.retain(|p| !Arc::ptr_eq(p, probe));
        self.probes.len() != before
    }

    pub fn add_blocker(&mut self, blocker: GroundBlocker) -> usize {
        self.blockers.push(blocker);
        self.blockers.len() - 1
    }

    pub fn blocker_mut(&mut self, index: usize) -> Option<&mut GroundBlocker> {
        self.blockers.get_mut(index)
    }

    /// Receive [`FlowEvent`]s synchronously during ticks
    pub fn subscribe(&mut self, observer: impl FlowObserver + 'static) {
        self.observers.add(observer);
    }

    /// Advance every simulation by one fixed step
    ///
    /// Modifiers that scale with their movement are tracked first. Emitters
    /// and modifiers run between the force and transport passes.
    /// Wetness, ground re-casts, events and probe sampling follow.
    ///
    /// # Arguments
    ///
    /// * `dt` - Step length in seconds
    pub fn tick(&mut self, dt: f32) -> TickSummary {
        let mut summary = TickSummary::default();
        for (_, modifier) in &mut self.modifiers {
            modifier.track_motion(dt);
        }

        let emitters = &mut self.emitters;
        let modifiers = &mut self.modifiers;
        let observers = &mut self.observers;
        let mut emitted = 0;
        let mut applied = 0;
        summary.step = self.stepper.step(&mut self.registry, dt, |registry, step_dt| {
            emitted += run_emitters(emitters, registry, step_dt);
            for (id, modifier) in modifiers.iter_mut() {
                let multiplier = if modifier.take_once() {
                    1.0
                } else if modifier.is_enabled() && modifier.cadence == ApplyCadence::Continuously {
                    step_dt
                } else {
                    continue;
                };
                applied += apply_to_all(registry, observers, *id, modifier, multiplier);
            }
        });
        summary.emitted = emitted;
        summary.modifiers_applied = applied;

        let mut updated: Vec<SimulationId> = summary
            .step
            .forces
            .iter()
            .chain(&summary.step.transport)
            .copied()
            .collect();
        for (id, sim) in self.registry.iter_active_mut() {
            if sim.update_fluid_wetness(dt) {
                updated.push(id);
            }
        }

        for blocker in &mut self.blockers {
            blocker.sync(&mut self.registry);
        }
        for (id, sim) in self.registry.iter_active_mut() {
            if sim.drain_dirty_chunk(&self.ground) {
                summary.chunks_drained += 1;
                updated.push(id);
            }
        }

        updated.sort_unstable();
        updated.dedup();
        for id in updated {
            self.observers.publish(&FlowEvent::SimulationUpdated(id));
        }
        for &id in &summary.step.particles {
            self.observers.publish(&FlowEvent::ParticlesUpdated(id));
        }

        if self.sampler.is_ready() {
            summary.samples_requested = self.request_probe_samples();
        }
        summary.samples_delivered = self.sampler.update();

        debug!(
            tick = self.stepper.tick_count(),
            emitted = summary.emitted,
            modifiers = summary.modifiers_applied,
            chunks = summary.chunks_drained,
            delivered = summary.samples_delivered,
            "World tick"
        );
        summary
    }

    fn request_probe_samples(&mut self) -> usize {
        let mut requested = 0;
        for probe in &self.probes {
            let (position, preferred) = match probe.lock() {
                Ok(p) => (p.position, p.simulation),
                Err(_) => {
                    warn!("Probe lock poisoned, skipping sample request");
                    continue;
                }
            };
            let Some(sim) = self
                .registry
                .find_nearest(&position, preferred)
                .and_then(|id| self.registry.get(id))
            else {
                if let Ok(mut p) = probe.lock() {
                    p.clear();
                }
                continue;
            };
            if self.sampler.request_sample(sim, position, probe) {
                requested += 1;
            }
        }
        requested
    }
}

/// Let every emitter advance and inject into its simulation
fn run_emitters(
    emitters: &mut [ParticleEmitter],
    registry: &mut SimulationRegistry,
    dt: f32,
) -> usize {
    let mut emitted = 0;
    for emitter in emitters {
        let Some(emission) = emitter.update(dt) else {
            continue;
        };
        let Some(sim) = registry
            .find_nearest(&emission.position, emitter.simulation)
            .and_then(|id| registry.get_mut(id))
        else {
            continue;
        };
        let depth = emission.volume * sim.config().resolution;
        if sim.add_particle(
            &emitter.fluid,
            depth,
            emission.position,
            emission.velocity,
            emission.life,
            0.0,
        ) {
            emitted += 1;
        }
    }
    emitted
}

fn apply_to_all(
    registry: &mut SimulationRegistry,
    observers: &mut ObserverList,
    id: ModifierId,
    modifier: &Modifier,
    multiplier: f32,
) -> usize {
    if !modifier.would_apply(multiplier) {
        return 0;
    }
    let edited = registry
        .iter_active_mut()
        .map(|(_, sim)| sim.apply_modifier(modifier, multiplier))
        .filter(|changed| *changed)
        .count();
    observers.publish(&FlowEvent::ModifierApplied {
        modifier: id,
        multiplier,
    });
    edited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{FluidMaterial, Transform, Vec3};
    use crate::grid::{HeightField, SimulationConfig};
    use crate::modifier::ModifierOp;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world(mode: UpdateMode) -> (FlowWorld<HeightField>, SimulationId) {
        let config = WorldConfig {
            update_mode: mode,
            readback: ReadbackMode::Blocking,
            ..WorldConfig::default()
        };
        let mut world = FlowWorld::new(config, HeightField::flat(20.0, 20.0, 1.0, 0.0));
        let id = world.add_simulation(FluidSimulation::new(
            SimulationConfig::square(10.0, 1.0),
            Transform::identity(),
        ));
        (world, id)
    }

    fn fluid_box(cadence: ApplyCadence) -> Modifier {
        Modifier::new(
            ModifierOp::AddFluid {
                fluid: Some(FluidMaterial::default()),
            },
            Transform::from_translation(Vec3::new(5.0, 0.0, 5.0)),
        )
        .with_size(2.0, 2.0)
        .with_height_band(-10.0, 10.0)
        .with_cadence(cadence)
    }

    #[test]
    fn test_once_modifier_applies_a_single_time() {
        let (mut world, id) = world(UpdateMode::EveryFrame);
        world.add_modifier(fluid_box(ApplyCadence::Once));

        let first = world.tick(0.02);
        assert_eq!(first.modifiers_applied, 1);
        let volume = world.simulation(id).unwrap().total_volume();
        assert!(volume > 0.0);

        let second = world.tick(0.02);
        assert_eq!(second.modifiers_applied, 0);
    }

    #[test]
    fn test_manual_modifier_waits_for_host() {
        let (mut world, id) = world(UpdateMode::EveryFrame);
        let modifier = world.add_modifier(fluid_box(ApplyCadence::Manually));
        world.tick(0.02);
        assert_eq!(world.simulation(id).unwrap().total_volume(), 0.0);

        assert_eq!(world.apply_modifier_now(modifier, 1.0), 1);
        assert!(world.simulation(id).unwrap().total_volume() > 0.0);
        assert_eq!(world.apply_modifier_now(modifier, 0.0), 0);
    }

    #[test]
    fn test_events_are_delivered_in_the_same_tick() {
        let (mut world, id) = world(UpdateMode::EveryFrame);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        world.subscribe(move |e: &FlowEvent| sink.borrow_mut().push(*e));
        let modifier = world.add_modifier(fluid_box(ApplyCadence::Once));

        world.tick(0.02);
        let seen = seen.borrow();
        assert!(seen.contains(&FlowEvent::SimulationUpdated(id)));
        assert!(seen.contains(&FlowEvent::ModifierApplied {
            modifier,
            multiplier: 1.0
        }));
    }

    #[test]
    fn test_probe_without_simulation_is_cleared() {
        let (mut world, id) = world(UpdateMode::EveryFrame);
        let probe = world.add_probe(FlowProbe::new(Vec3::new(5.0, 0.0, 5.0)));
        world.tick(0.02);
        assert!(probe.lock().unwrap().is_sampled());

        assert!(world.deactivate_simulation(id));
        let summary = world.tick(0.02);
        assert_eq!(summary.samples_requested, 0);
        assert!(!probe.lock().unwrap().is_sampled());
    }

    #[test]
    fn test_probe_is_sampled_through_the_world() {
        let (mut world, _) = world(UpdateMode::EveryFrame);
        let probe = world.add_probe(FlowProbe::new(Vec3::new(5.0, 0.0, 5.0)));
        let summary = world.tick(0.02);
        assert_eq!(summary.samples_requested, 1);
        assert_eq!(summary.samples_delivered, 1);
        assert!(probe.lock().unwrap().is_sampled());
    }

    #[test]
    fn test_moving_modifier_scales_with_speed() {
        let (mut world, _) = world(UpdateMode::EveryFrame);
        let modifier = world.add_modifier(
            Modifier::new(
                ModifierOp::AddFoam,
                Transform::from_translation(Vec3::new(5.0, 0.0, 5.0)),
            )
            .with_motion_speed_scale(1.0)
                .with_cadence(ApplyCadence::Manually),
        );
        world.tick(0.5);
        assert_eq!(world.modifier(modifier).unwrap().effective_strength(), 0.0);

        world.modifier_mut(modifier).unwrap().transform =
            Transform::from_translation(Vec3::new(5.25, 0.0, 5.0));
        world.tick(0.5);
        assert!((world.modifier(modifier).unwrap().effective_strength() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_emitted_volume_scales_with_resolution() {
        let (mut world, _) = world(UpdateMode::EveryFrame);
        let mut config = SimulationConfig::square(10.0, 2.0);
        config.resolution = 3.0;
        config.particles = true;
        config.particle_limit = 8;
        let id = world.add_simulation(FluidSimulation::new(config, Transform::identity()));

        let mut emitter = ParticleEmitter::new(
            FluidMaterial::default(),
            Transform::from_translation(Vec3::new(5.0, 5.0, 5.0)),
        );
        emitter.simulation = Some(id);
        assert_eq!(run_emitters(&mut [emitter], world.registry_mut(), 1.0), 1);

        let particles = world.simulation(id).unwrap().particles().unwrap();
        let particle = particles.particles().iter().find(|p| p.is_alive()).unwrap();
        assert!((particle.depth - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_remove_simulation_publishes_deactivation() {
        let (mut world, id) = world(UpdateMode::EveryFrame);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        world.subscribe(move |e: &FlowEvent| sink.borrow_mut().push(*e));

        assert!(world.remove_simulation(id).is_some());
        assert_eq!(*seen.borrow(), vec![FlowEvent::SimulationDeactivated(id)]);
        assert!(world.simulation(id).is_none());
    }
}
