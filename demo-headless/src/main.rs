use clap::{Parser, ValueEnum};
use flow_sim_core::{
    ApplyCadence, FlowProbe, FlowWorld, FluidMaterial, FluidSimulation, GroundScene, HeightField,
    Modifier, ModifierOp, ParticleEmitter, ParticleSystem, SimulationConfig, Transform, UpdateMode,
    Vec3, WorldConfig,
};
use nalgebra::UnitQuaternion;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Pass cadence as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Cadence {
    EveryFrame,
    EveryOtherFrame,
}

impl From<Cadence> for UpdateMode {
    fn from(cadence: Cadence) -> Self {
        match cadence {
            Cadence::EveryFrame => UpdateMode::EveryFrame,
            Cadence::EveryOtherFrame => UpdateMode::EveryOtherFrame,
        }
    }
}

/// Shallow-water dam break over a hill
#[derive(Parser, Debug)]
#[command(name = "flow-sim-demo")]
#[command(about = "Column-grid fluid simulation demo", long_about = None)]
struct Args {
    /// Grid extent in meters (square grid)
    #[arg(short, long, default_value_t = 64.0)]
    size: f32,

    /// Meters between columns
    #[arg(long, default_value_t = 1.0)]
    separation: f32,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 600)]
    ticks: u32,

    /// Tick length in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Pass cadence
    #[arg(short, long, value_enum, default_value_t = Cadence::EveryFrame)]
    mode: Cadence,

    /// Height of the water column released at the west edge, in meters
    #[arg(long, default_value_t = 2.0)]
    dam_height: f32,

    /// Height of the hill in the middle of the grid, in meters
    #[arg(long, default_value_t = 3.0)]
    hill_height: f32,

    /// Spray particles from above the hill
    #[arg(short, long)]
    particles: bool,

    /// Ticks between reports
    #[arg(short, long, default_value_t = 60)]
    report_interval: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let terrain = HeightField::single_hill(
        args.size,
        args.size,
        args.separation,
        0.0,
        args.hill_height,
        args.size * 0.15,
    );
    let world_config = WorldConfig {
        update_mode: args.mode.into(),
        ..WorldConfig::default()
    };
    let mut world = FlowWorld::new(world_config, GroundScene::new(terrain));

    let mut config = SimulationConfig::square(args.size, args.separation);
    config.wetness = true;
    config.particles = args.particles;
    config.height_min = -10.0;
    config.height_max = args.hill_height + args.dam_height + 10.0;
    let sim_id = world.add_simulation(FluidSimulation::new(config, Transform::identity()));

    let Some(sim) = world.simulation(sim_id) else {
        return;
    };
    if !sim.is_activated() {
        warn!("Simulation did not activate, check grid size and separation");
        return;
    }
    let (columns_x, columns_z) = sim.estimated_column_count();
    info!(columns_x, columns_z, "Simulation activated");

    // Dam: a column of water along the west quarter, released on the first tick
    let water = FluidMaterial::with_color([0.1, 0.3, 0.8, 1.0]);
    let dam = Modifier::new(
        ModifierOp::AddFluid { fluid: Some(water) },
        Transform::from_translation(Vec3::new(args.size * 0.125, -10.0, args.size * 0.5)),
    )
    .with_size(args.size * 0.25, args.size)
    .with_height_band(0.0, args.hill_height + args.dam_height + 20.0)
    .with_strength(args.dam_height)
    .with_cadence(ApplyCadence::Once);
    world.add_modifier(dam);

    if args.particles {
        let spray = Transform::new(
            Vec3::new(args.size * 0.5, args.hill_height + 4.0, args.size * 0.5),
            UnitQuaternion::from_euler_angles(-0.6, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        );
        let spray_fluid = FluidMaterial::with_color([0.9, 0.9, 1.0, 1.0]);
        let mut emitter = ParticleEmitter::new(spray_fluid, spray);
        emitter.simulation = Some(sim_id);
        emitter.volume_min = 0.05;
        emitter.volume_max = 0.1;
        world.add_emitter(emitter);
    }

    let probe = world.add_probe(FlowProbe::new(Vec3::new(args.size * 0.75, 0.0, args.size * 0.5)));

    println!("Tick  | Time(s) | Volume(m3) | Max depth(m) | Probe depth(m)");
    println!("------|---------|------------|--------------|---------------");

    for tick in 1..=args.ticks {
        world.tick(args.dt);
        if tick % args.report_interval.max(1) != 0 && tick != args.ticks {
            continue;
        }

        let Some(sim) = world.simulation(sim_id) else {
            break;
        };
        let volume = sim.total_volume();
        let max_depth = sim.snapshot().map_or(0.0, |s| s.depth.max_value());
        let probe_depth = probe.lock().map_or(0.0, |p| p.sample().depth);
        println!(
            "{:5} | {:7.2} | {:10.2} | {:12.3} | {:14.3}",
            tick,
            tick as f32 * args.dt,
            volume,
            max_depth,
            probe_depth
        );
    }

    if let Some(sim) = world.simulation(sim_id) {
        info!(
            volume = sim.total_volume(),
            particles = sim.particles().map_or(0, ParticleSystem::live_count),
            version = sim.version(),
            "Simulation complete"
        );
    }
    if let Ok(probe) = probe.lock() {
        let sample = probe.sample();
        info!(
            depth = sample.depth,
            ground = sample.ground_height,
            speed = sample.velocity.norm(),
            submersion = probe.own_submersion(),
            "Probe sample"
        );
    };
}
