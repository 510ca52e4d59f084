//! Simulation instances and the world that drives them
//!
//! Each [`FluidSimulation`] owns one column grid and guards its own pass
//! order. The [`SimulationRegistry`] hands out stable handles and answers
//! nearest-simulation lookups, the [`SimulationStepper`] runs the passes of
//! every active simulation in order, and [`FlowWorld`] ties these together
//! with modifiers, emitters, probes, ground blockers and observers.

pub mod blocker;
pub mod events;
pub mod fluid_simulation;
pub mod registry;
pub mod stepper;
pub mod world;

pub use blocker::GroundBlocker;
pub use events::{FlowEvent, FlowObserver, ObserverList};
pub use fluid_simulation::{FluidSimulation, SimulationPhase};
pub use registry::{SimulationId, SimulationRegistry};
pub use stepper::{SimulationStepper, StepPlan, StepReport, UpdateMode};
pub use world::{FlowWorld, TickSummary, WorldConfig};
