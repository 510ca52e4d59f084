//! Matching samples against known fluids

use super::sample::FluidSample;
use crate::core_types::FluidMaterial;
use serde::{Deserialize, Serialize};

/// Per-property tolerances and weights for fluid matching
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub color_threshold: f32,
    pub emission_threshold: f32,
    pub smoothness_threshold: f32,
    pub metallic_threshold: f32,
    pub color_weight: f32,
    pub emission_weight: f32,
    pub smoothness_weight: f32,
    pub metallic_weight: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            color_threshold: 0.3,
            emission_threshold: 0.3,
            smoothness_threshold: 0.3,
            metallic_threshold: 0.3,
            color_weight: 1.0,
            emission_weight: 1.0,
            smoothness_weight: 1.0,
            metallic_weight: 1.0,
        }
    }
}

/// Picks the registered fluid closest to a sample
#[derive(Debug, Clone, Default)]
pub struct FluidClassifier {
    pub fluids: Vec<FluidMaterial>,
    pub settings: ClassifierSettings,
}

impl FluidClassifier {
    #[must_use]
    pub fn new(fluids: Vec<FluidMaterial>) -> Self {
        Self {
            fluids,
            settings: ClassifierSettings::default(),
        }
    }

    /// Weighted distance to `fluid`, or `None` when any property is out of tolerance
    #[must_use]
    pub fn distance(&self, fluid: &FluidMaterial, sample: &FluidSample) -> Option<f32> {
        let s = &self.settings;
        let color: Vec<f32> = fluid
            .color
            .iter()
            .zip(sample.color)
            .map(|(a, b)| (a - b).abs())
            .collect();
        if color.iter().any(|&d| d > s.color_threshold) {
            return None;
        }
        let emission = (fluid.emission - sample.emission).abs();
        let smoothness = (fluid.smoothness - sample.smoothness).abs();
        let metallic = (fluid.metallic - sample.metallic).abs();
        if emission > s.emission_threshold
            || smoothness > s.smoothness_threshold
            || metallic > s.metallic_threshold
        {
            return None;
        }
        Some(
            color.iter().sum::<f32>() * s.color_weight
                + emission * s.emission_weight
                + smoothness * s.smoothness_weight
                + metallic * s.metallic_weight,
        )
    }

    /// Index of the closest candidate fluid
    #[must_use]
    pub fn classify(&self, sample: &FluidSample) -> Option<usize> {
        self.fluids
            .iter()
            .enumerate()
            .filter_map(|(i, fluid)| self.distance(fluid, sample).map(|d| (i, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}
