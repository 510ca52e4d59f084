//! Activation rules and lifecycle events

use flow_sim_core::{
    FlowEvent, FlowWorld, FluidSimulation, GroundBlocker, GroundScene, HeightField,
    SimulationConfig, SimulationPhase, SolidBlock, Transform, Vec3, WorldConfig,
};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn flat() -> HeightField {
    HeightField::flat(50.0, 50.0, 1.0, 0.0)
}

#[test]
fn test_activates_only_with_more_than_one_column_per_axis() {
    let mut thin = SimulationConfig::square(10.0, 1.0);
    thin.size = Vec3::new(0.5, 0.0, 10.0);
    let mut sim = FluidSimulation::new(thin, Transform::identity());
    assert_eq!(sim.estimated_column_count(), (2, 11));
    assert!(sim.activate(&flat()));

    let mut clamped = SimulationConfig::square(10.0, 1.0);
    clamped.max_dimension = 1;
    let mut sim = FluidSimulation::new(clamped, Transform::identity());
    assert_eq!(sim.estimated_column_count(), (1, 1));
    assert!(!sim.activate(&flat()));
    assert_eq!(sim.phase(), SimulationPhase::Inactive);

    let mut inverted = SimulationConfig::square(10.0, 1.0);
    inverted.height_min = 5.0;
    inverted.height_max = -5.0;
    let mut sim = FluidSimulation::new(inverted, Transform::identity());
    assert!(!sim.activate(&flat()));
}

#[test]
fn test_lifecycle_events_reach_observers() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let mut world = FlowWorld::new(WorldConfig::default(), flat());
    world.subscribe(move |e: &FlowEvent| sink.lock().unwrap().push(*e));

    let id = world.add_simulation(FluidSimulation::new(
        SimulationConfig::square(10.0, 1.0),
        Transform::identity(),
    ));
    assert!(world.deactivate_simulation(id));
    assert!(!world.deactivate_simulation(id));
    assert!(world.activate_simulation(id));

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            FlowEvent::SimulationActivated(id),
            FlowEvent::SimulationDeactivated(id),
            FlowEvent::SimulationActivated(id),
        ]
    );
}

#[test]
fn test_moving_block_recasts_ground_under_it() {
    let mut world = FlowWorld::new(WorldConfig::default(), GroundScene::new(flat()));
    let mut config = SimulationConfig::square(20.0, 1.0);
    config.height_min = -5.0;
    config.height_max = 10.0;
    let id = world.add_simulation(FluidSimulation::new(config, Transform::identity()));
    assert_eq!(world.simulation(id).unwrap().column(5, 5).unwrap().ground, 0.0);

    let block = SolidBlock {
        center: Vec3::new(5.0, 1.0, 5.0),
        half_extents: Vec3::new(1.0, 1.0, 1.0),
    };
    world.ground_mut().blocks.push(block);
    world.add_blocker(GroundBlocker::new(block.center, block.footprint_radius()));

    let summary = world.tick(0.02);
    assert_eq!(summary.chunks_drained, 1);
    let sim = world.simulation(id).unwrap();
    assert_eq!(sim.column(5, 5).unwrap().ground, 2.0);
    assert_eq!(sim.column(15, 15).unwrap().ground, 0.0);
}
