//! Modifier edits driven through a world tick

use approx::assert_abs_diff_eq;
use flow_sim_core::{
    ApplyCadence, FlowWorld, FluidMaterial, FluidSimulation, HeightField, Modifier, ModifierOp,
    ReadbackMode, SimulationConfig, Transform, Vec3, WorldConfig,
};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ten_by_ten() -> FluidSimulation {
    FluidSimulation::new(SimulationConfig::square(10.0, 1.0), Transform::identity())
}

fn lake(depth: f32) -> FluidSimulation {
    let mut sim = ten_by_ten();
    assert!(sim.activate(&HeightField::flat(20.0, 20.0, 1.0, 0.0)));
    sim.replace_fluids(&FluidMaterial::default(), depth, 0.0);
    sim
}

fn over_center(op: ModifierOp, y: f32) -> Modifier {
    Modifier::new(op, Transform::from_translation(Vec3::new(5.0, y, 5.0))).with_size(2.0, 2.0)
}

fn blocking_world() -> FlowWorld<HeightField> {
    let config = WorldConfig {
        readback: ReadbackMode::Blocking,
        ..WorldConfig::default()
    };
    FlowWorld::new(config, HeightField::flat(20.0, 20.0, 1.0, 0.0))
}

#[test]
fn test_once_add_fluid_fills_only_the_footprint() {
    let mut world = blocking_world();
    let id = world.add_simulation(ten_by_ten());

    let modifier = Modifier::new(
        ModifierOp::AddFluid {
            fluid: Some(FluidMaterial::default()),
        },
        Transform::from_translation(Vec3::new(5.0, 0.0, 5.0)),
    )
    .with_size(2.0, 2.0)
    .with_strength(1.0)
    .with_cadence(ApplyCadence::Once);
    world.add_modifier(modifier);

    world.tick(1.0 / 60.0);

    let sim = world.simulation(id).unwrap();
    for z in 0..11 {
        for x in 0..11 {
            let depth = sim.column(x, z).unwrap().depth;
            let inside = (4..=6).contains(&x) && (4..=6).contains(&z);
            if inside {
                assert!(depth > 0.0, "column ({x}, {z}) should hold fluid");
            } else {
                assert_eq!(depth, 0.0, "column ({x}, {z}) should stay dry");
            }
        }
    }
}

#[test]
fn test_add_fluid_without_material_is_a_no_op() {
    let mut world = blocking_world();
    let id = world.add_simulation(ten_by_ten());
    let modifier = world.add_modifier(
        Modifier::new(
            ModifierOp::AddFluid { fluid: None },
            Transform::from_translation(Vec3::new(5.0, 0.0, 5.0)),
        )
        .with_size(4.0, 4.0)
        .with_cadence(ApplyCadence::Manually),
    );

    assert_eq!(world.apply_modifier_now(modifier, 1.0), 0);
    world.tick(0.02);
    assert_eq!(world.simulation(id).unwrap().total_volume(), 0.0);
}

#[test]
fn test_foam_max_does_not_accumulate() {
    let mut sim = ten_by_ten();
    assert!(sim.activate(&HeightField::flat(20.0, 20.0, 1.0, 0.0)));

    let foam_max = over_center(ModifierOp::AddFoamMax, 0.0)
        .with_height_band(-1.0, 1.0)
        .with_strength(0.4);
    assert!(sim.apply_modifier(&foam_max, 3.0));
    assert!(sim.apply_modifier(&foam_max, 3.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().foam[0], 0.4, epsilon = 1.0 / 255.0);

    let foam = over_center(ModifierOp::AddFoam, 0.0)
        .with_height_band(-1.0, 1.0)
        .with_strength(0.4);
    assert!(sim.apply_modifier(&foam, 1.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().foam[0], 0.8, epsilon = 2.0 / 255.0);
    assert!(sim.apply_modifier(&foam, 1.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().foam[0], 1.0, epsilon = 1.0 / 255.0);
}

#[test]
fn test_remove_fluid_never_goes_negative() {
    let mut sim = ten_by_ten();
    assert!(sim.activate(&HeightField::flat(20.0, 20.0, 1.0, 0.0)));
    sim.replace_fluids(&FluidMaterial::default(), 0.25, 0.0);

    let remove = over_center(ModifierOp::RemoveFluid, 0.0).with_strength(1.0);
    assert!(sim.apply_modifier(&remove, 1.0));
    assert_eq!(sim.column(5, 5).unwrap().depth, 0.0);
    assert_abs_diff_eq!(sim.column(0, 0).unwrap().depth, 0.25);
}

#[test]
fn test_remove_fluid_drains_a_lake_deeper_than_its_band() {
    let mut sim = lake(3.0);
    let remove = over_center(ModifierOp::RemoveFluid, 0.0).with_strength(1.0);
    assert!(sim.apply_modifier(&remove, 1.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().depth, 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(sim.column(0, 0).unwrap().depth, 3.0, epsilon = 1e-2);
}

#[test]
fn test_add_fluid_reaches_ground_below_its_band() {
    let mut world = blocking_world();
    let id = world.add_simulation(ten_by_ten());
    let high = over_center(
        ModifierOp::AddFluid {
            fluid: Some(FluidMaterial::default()),
        },
        40.0,
    )
    .with_cadence(ApplyCadence::Manually);
    let modifier = world.add_modifier(high);

    assert_eq!(world.apply_modifier_now(modifier, 1.0), 1);
    assert!(world.simulation(id).unwrap().column(5, 5).unwrap().depth > 0.0);
}

#[test]
fn test_surface_ops_skip_columns_outside_their_band() {
    let mut sim = lake(3.0);
    let version = sim.version();

    let foam = over_center(ModifierOp::AddFoam, 0.0).with_height_band(10.0, 11.0);
    assert!(!sim.apply_modifier(&foam, 1.0));
    let color = over_center(
        ModifierOp::ChangeColor {
            color: [1.0, 0.0, 0.0, 1.0],
            channels: [1.0; 4],
        },
        0.0,
    )
    .with_height_band(-6.0, -5.0);
    assert!(!sim.apply_modifier(&color, 1.0));
    let force = over_center(ModifierOp::AddForceUniform { angle: 0.0 }, 0.0)
        .with_height_band(10.0, 11.0);
    assert!(!sim.apply_modifier(&force, 1.0));

    assert_eq!(sim.version(), version);
    let column = sim.column(5, 5).unwrap();
    assert_eq!(column.foam[0], 0.0);
    assert_eq!(column.outflow, [0.0; 4]);
}

#[test]
fn test_surface_ops_apply_inside_their_band() {
    let mut sim = lake(3.0);
    let foam = over_center(ModifierOp::AddFoam, 0.0)
        .with_height_band(2.0, 4.0)
        .with_strength(0.5);
    assert!(sim.apply_modifier(&foam, 1.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().foam[0], 0.5, epsilon = 1.0 / 255.0);
    assert_eq!(sim.column(0, 0).unwrap().foam[0], 0.0);

    // The band is modifier-local: [5, 6] at y = -2.5 spans world [2.5, 3.5]
    let lowered = over_center(ModifierOp::AddFoam, -2.5)
        .with_height_band(5.0, 6.0)
        .with_strength(0.25);
    assert!(sim.apply_modifier(&lowered, 1.0));
    assert_abs_diff_eq!(sim.column(5, 5).unwrap().foam[0], 0.75, epsilon = 2.0 / 255.0);
}
