//! Threshold triggers over probe samples

use super::sample::FlowProbe;
use serde::{Deserialize, Serialize};

/// Condition a trigger watches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TriggerCriterion {
    /// Fluid deeper than the given depth
    FluidDepthAbove(f32),
    /// Fluid shallower than the given depth
    FluidDepthBelow(f32),
    /// Fluid present and its surface above the trigger height
    FluidHeightAbovePosition,
    /// No fluid present, or its surface below the trigger height
    FluidHeightBelowPosition,
}

/// Transition reported by [`FlowTrigger::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTransition {
    Met,
    Unmet,
}

/// Watches one probe and reports when its criterion flips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTrigger {
    pub criterion: TriggerCriterion,
    /// World Y compared against by the height criteria
    pub height: f32,
    met: bool,
}

impl FlowTrigger {
    #[must_use]
    pub fn new(criterion: TriggerCriterion, height: f32) -> Self {
        Self {
            criterion,
            height,
            met: false,
        }
    }

    /// Whether the criterion held at the last evaluation
    #[must_use]
    pub fn is_met(&self) -> bool {
        self.met
    }

    /// Re-check the criterion against `probe`
    ///
    /// An unsampled probe never meets a criterion.
    ///
    /// # Returns
    ///
    /// The transition, only when the state changed
    pub fn evaluate(&mut self, probe: &FlowProbe) -> Option<TriggerTransition> {
        let met = probe.is_sampled() && self.holds(probe);
        if met == self.met {
            return None;
        }
        self.met = met;
        Some(if met {
            TriggerTransition::Met
        } else {
            TriggerTransition::Unmet
        })
    }

    fn holds(&self, probe: &FlowProbe) -> bool {
        let sample = probe.sample();
        match self.criterion {
            TriggerCriterion::FluidDepthAbove(depth) => sample.depth > depth,
            TriggerCriterion::FluidDepthBelow(depth) => sample.depth < depth,
            TriggerCriterion::FluidHeightAbovePosition => {
                probe.has_fluid() && sample.fluid_height() > self.height
            }
            TriggerCriterion::FluidHeightBelowPosition => {
                !probe.has_fluid() || sample.fluid_height() < self.height
            }
        }
    }
}
