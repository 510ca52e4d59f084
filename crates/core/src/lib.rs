//! Column-grid shallow-water fluid simulation
//!
//! A simulation lays a rectangular grid of columns over the terrain and
//! tracks, per column, the ground height, a wet offset, the fluid depth,
//! the outflow toward each neighbour and the color, material and foam the
//! fluid carries. Every physics tick runs a fixed pipeline:
//!
//! 1. forces: outflow responds to surface slopes (virtual pipes)
//! 2. modifiers: localised edits add, remove, push, foam or recolor fluid
//! 3. transport: volume and its properties move along the outflow
//! 4. wetness: ground moisture follows the fluid and dries toward the table
//! 5. particles: splashes land in the grid and pick up its properties
//!
//! Channels are double buffered and published as immutable snapshots, so a
//! reader never observes a half-written tick. Gameplay queries go through
//! the [`AsyncSampler`], which batches them and delivers results a tick
//! later.
//!
//! ## Usage
//!
//! ```no_run
//! use flow_sim_core::{
//!     FlowWorld, FluidSimulation, GroundScene, HeightField, SimulationConfig, Transform,
//!     WorldConfig,
//! };
//!
//! let ground = GroundScene::new(HeightField::flat(64.0, 64.0, 1.0, 0.0));
//! let mut world = FlowWorld::new(WorldConfig::default(), ground);
//! let id = world.add_simulation(FluidSimulation::new(
//!     SimulationConfig::square(64.0, 1.0),
//!     Transform::identity(),
//! ));
//! for _ in 0..60 {
//!     world.tick(1.0 / 60.0);
//! }
//! let _volume = world.simulation(id).map(FluidSimulation::total_volume);
//! ```

// Math, placement and material types
pub mod core_types;

// Grid layout, channel storage and ground
pub mod grid;

// Per-pass column kernels
pub mod solver;

// Edits, splashes and queries
pub mod modifier;
pub mod particles;
pub mod sampling;

// Instances, registry, stepping and the world root
pub mod simulation;

// Re-export core types
pub use core_types::{FluidMaterial, Rgba, Transform, Vec2, Vec3};

// Re-export grid types
pub use grid::{
    BufferPrecision, ChannelUpdate, ColumnState, CustomDataType, FloatPrecision, GridBuffers,
    GridConfigError, GridGeometry, GridSnapshot, GroundScene, GroundSource, HeightField,
    SimulationConfig, SolidBlock, UnitPrecision,
};

// Re-export edit and query types
pub use modifier::{
    ApplyCadence, DirectionMap, MaskChannel, Modifier, ModifierId, ModifierOp, ShapeMask,
    SpeedScale,
};
pub use particles::{Particle, ParticleEmitter, ParticleSystem};
pub use sampling::{
    AsyncSampler, FloatForces, FloatPoint, FlowFloat, FlowProbe, FlowTrigger, FluidClassifier,
    FluidSample, ReadbackMode, SampleHandler, TorqueMode, TriggerCriterion, TriggerTransition,
};

// Re-export simulation types
pub use simulation::{
    FlowEvent, FlowObserver, FlowWorld, FluidSimulation, GroundBlocker, SimulationId,
    SimulationPhase, SimulationRegistry, SimulationStepper, TickSummary, UpdateMode, WorldConfig,
};
