//! Point queries against simulations
//!
//! [`AsyncSampler`] batches requests and delivers [`FluidSample`]s to their
//! owners a tick later. [`FlowProbe`] is the standard owner; triggers, the
//! classifier and [`FlowFloat`] buoyancy interpret probe samples.

pub mod classify;
pub mod float;
pub mod reader;
pub mod sample;
pub mod trigger;

pub use classify::{ClassifierSettings, FluidClassifier};
pub use float::{FloatForces, FloatPoint, FlowFloat, PointForce, TorqueMode};
pub use reader::{AsyncSampler, ReadbackMode, DEFAULT_BATCH_WIDTH};
pub use sample::{
    evaluate_texels, inverse_lerp, FlowProbe, FluidSample, ProbeOutcome, SampleHandler,
    SampleTexels, TEXELS_PER_SAMPLE,
};
pub use trigger::{FlowTrigger, TriggerCriterion, TriggerTransition};
