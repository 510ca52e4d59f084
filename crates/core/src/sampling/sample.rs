//! Sample records, the texel layout they are read from, and probes

use crate::core_types::{Rgba, Vec2, Vec3};
use crate::grid::{GridGeometry, GridSnapshot};
use crate::simulation::SimulationId;
use crate::solver::{column_velocity, DRY_DEPTH};
use serde::{Deserialize, Serialize};

/// Texels reserved per sample request
pub const TEXELS_PER_SAMPLE: usize = 5;

/// Packed readback of one sample
pub type SampleTexels = [Rgba; TEXELS_PER_SAMPLE];

/// Fluid state at one world position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FluidSample {
    /// World Y of the ground
    pub ground_height: f32,
    /// World Y of the wetness line
    pub wet_height: f32,
    /// Fluid depth in meters
    pub depth: f32,
    /// World-space surface normal
    pub normal: Vec3,
    /// World-space flow velocity (m/s); Y is always zero
    pub velocity: Vec3,
    pub color: Rgba,
    pub emission: f32,
    pub smoothness: f32,
    pub metallic: f32,
    pub viscosity: f32,
    pub foam: f32,
    pub custom: [f32; 3],
    /// 1 when the position lies over the simulation, else 0
    pub overlap: f32,
}

impl FluidSample {
    /// Unpack the five texels of a readback
    ///
    /// Layout: `(vel_x, vel_z, ground, wet)`, `(normal.xyz, depth)`, `rgba`,
    /// `(emission, smoothness, metallic, viscosity)`, `(foam, c1, c2, c3)`.
    #[must_use]
    pub fn from_texels(texels: &SampleTexels, overlap: f32) -> Self {
        let [t0, t1, color, t3, t4] = *texels;
        Self {
            ground_height: t0[2],
            wet_height: t0[3],
            depth: t1[3],
            normal: Vec3::new(t1[0], t1[1], t1[2]),
            velocity: Vec3::new(t0[0], 0.0, t0[1]),
            color,
            emission: t3[0],
            smoothness: t3[1],
            metallic: t3[2],
            viscosity: t3[3],
            foam: t4[0],
            custom: [t4[1], t4[2], t4[3]],
            overlap,
        }
    }

    /// World Y of the fluid surface
    #[must_use]
    pub fn fluid_height(&self) -> f32 {
        self.ground_height + self.depth
    }

    /// Whether the sample holds any fluid
    #[must_use]
    pub fn has_fluid(&self) -> bool {
        self.depth > DRY_DEPTH
    }
}

/// Evaluate the packed texels of a world position against a snapshot
///
/// Positions outside the grid read the nearest edge columns.
///
/// # Arguments
///
/// * `geometry` - Column layout the snapshot belongs to
/// * `snapshot` - Published state to read
/// * `world` - Sample position
/// * `max_speed` - Largest reported flow speed
#[must_use]
pub fn evaluate_texels(
    geometry: &GridGeometry,
    snapshot: &GridSnapshot,
    world: &Vec3,
    max_speed: f32,
) -> SampleTexels {
    let pixel = geometry.world_to_pixel(world);
    let max_x = (snapshot.width() - 1) as f32;
    let max_z = (snapshot.height() - 1) as f32;
    let px = pixel.x.clamp(0.0, max_x);
    let pz = pixel.y.clamp(0.0, max_z);

    let [ground, wet] = snapshot.ground.sample_bilinear(px, pz);
    let depth = snapshot.depth.sample_bilinear(px, pz);

    let x = px.round() as usize;
    let z = pz.round() as usize;
    let separation = geometry.separation();
    let local_velocity =
        column_velocity(&snapshot.outflow, &snapshot.depth, x, z, separation, max_speed);
    let velocity = geometry
        .transform()
        .transform_vector(&Vec3::new(local_velocity.x, 0.0, local_velocity.y));

    let normal = surface_normal(geometry, snapshot, x, z, separation);

    [
        [velocity.x, velocity.z, ground, ground + wet],
        [normal.x, normal.y, normal.z, depth],
        snapshot.color.sample_bilinear(px, pz),
        snapshot.material.sample_bilinear(px, pz),
        snapshot.foam.sample_bilinear(px, pz),
    ]
}

/// World normal of the fluid surface from central differences
fn surface_normal(
    geometry: &GridGeometry,
    snapshot: &GridSnapshot,
    x: usize,
    z: usize,
    separation: Vec2,
) -> Vec3 {
    let surface = |dx: isize, dz: isize| {
        let xi = x as isize + dx;
        let zi = z as isize + dz;
        snapshot.ground.get_clamped(xi, zi)[0] + snapshot.depth.get_clamped(xi, zi)
    };
    let slope_x = (surface(1, 0) - surface(-1, 0)) / (2.0 * separation.x);
    let slope_z = (surface(0, 1) - surface(0, -1)) / (2.0 * separation.y);
    let local = Vec3::new(-slope_x, 1.0, -slope_z);
    geometry
        .transform()
        .transform_vector(&local)
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vec3::y)
}

/// Receives completed samples
pub trait SampleHandler: Send {
    fn handle_sample(&mut self, sample: &FluidSample);
}

/// Result of the last completed sample of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// Fluid was found
    Sampled,
    /// The position was sampled but held no fluid, or the probe was cleared
    SampledNothing,
}

/// Standard sample owner: a point that tracks the fluid beneath it
#[derive(Debug, Clone, PartialEq)]
pub struct FlowProbe {
    /// World position
    pub position: Vec3,
    /// Simulation to sample when it is active; otherwise the nearest one
    pub simulation: Option<SimulationId>,
    /// Half height of the submersion ramp
    pub radius: f32,
    /// Weight of this probe in a [`super::FlowFloat`]; zero or less ignores it
    pub strength: f32,
    /// Depth above which fluid counts as present
    pub epsilon: f32,
    sample: FluidSample,
    sampled: bool,
    last_outcome: Option<ProbeOutcome>,
    sampled_count: u64,
    nothing_count: u64,
}

impl FlowProbe {
    /// Probe at `position` with default radius and epsilon
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            simulation: None,
            radius: 1.0,
            strength: 1.0,
            epsilon: 0.1,
            sample: FluidSample::default(),
            sampled: false,
            last_outcome: None,
            sampled_count: 0,
            nothing_count: 0,
        }
    }

    /// Latest sample
    #[must_use]
    pub fn sample(&self) -> &FluidSample {
        &self.sample
    }

    /// Whether the probe holds a sample
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Whether the latest sample holds more than `epsilon` of fluid
    #[must_use]
    pub fn has_fluid(&self) -> bool {
        self.sampled && self.sample.depth > self.epsilon
    }

    /// World Y of the fluid surface under the probe
    #[must_use]
    pub fn fluid_height(&self) -> f32 {
        self.sample.fluid_height()
    }

    /// How deep a point at height `y` sits in the fluid
    ///
    /// 0 at `radius` above the surface, 1 at `radius` below it.
    #[must_use]
    pub fn submersion(&self, y: f32) -> f32 {
        let top = self.fluid_height() + self.radius;
        let bottom = self.fluid_height() - self.radius;
        inverse_lerp(top, bottom, y)
    }

    /// Submersion of the probe's own position
    #[must_use]
    pub fn own_submersion(&self) -> f32 {
        self.submersion(self.position.y)
    }

    /// Outcome of the last completed sample or clear
    #[must_use]
    pub fn last_outcome(&self) -> Option<ProbeOutcome> {
        self.last_outcome
    }

    /// Completed samples that found fluid
    #[must_use]
    pub fn sampled_count(&self) -> u64 {
        self.sampled_count
    }

    /// Completed samples (and clears) that found none
    #[must_use]
    pub fn nothing_count(&self) -> u64 {
        self.nothing_count
    }

    /// Forget the current sample
    pub fn clear(&mut self) {
        if self.sampled {
            self.sampled = false;
            self.nothing_count += 1;
            self.last_outcome = Some(ProbeOutcome::SampledNothing);
        }
    }
}

impl SampleHandler for FlowProbe {
    fn handle_sample(&mut self, sample: &FluidSample) {
        self.sample = *sample;
        self.sampled = true;
        if sample.has_fluid() {
            self.sampled_count += 1;
            self.last_outcome = Some(ProbeOutcome::Sampled);
        } else {
            self.nothing_count += 1;
            self.last_outcome = Some(ProbeOutcome::SampledNothing);
        }
    }
}

/// Position of `value` between `a` and `b`, clamped to `[0, 1]`
#[must_use]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        0.0
    } else {
        ((value - a) / (b - a)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Transform;
    use crate::grid::{
        BufferPrecision, ChannelUpdate, CustomDataType, Field, GridBuffers, SimulationConfig,
    };
    use approx::assert_relative_eq;

    fn fixture() -> (GridGeometry, GridBuffers) {
        let config = SimulationConfig::square(4.0, 1.0);
        let geometry = GridGeometry::from_config(&config, Transform::identity()).unwrap();
        let buffers =
            GridBuffers::allocate(5, 5, BufferPrecision::full(), CustomDataType::Three).unwrap();
        (geometry, buffers)
    }

    #[test]
    fn test_texels_roundtrip_uniform_state() {
        let (geometry, mut buffers) = fixture();
        buffers.swap_all([
            ChannelUpdate::Ground(Field::with_value(5, 5, [1.0, -0.5])),
            ChannelUpdate::Depth(Field::with_value(5, 5, 2.0)),
            ChannelUpdate::Color(Field::with_value(5, 5, [1.0, 0.0, 0.0, 1.0])),
            ChannelUpdate::Foam(Field::with_value(5, 5, [0.25, 0.1, 0.2, 0.3])),
        ]);
        let at = Vec3::new(1.3, 9.0, 2.6);
        let texels = evaluate_texels(&geometry, &buffers.snapshot(), &at, 10.0);
        let sample = FluidSample::from_texels(&texels, 1.0);

        assert_eq!(sample.depth, 2.0);
        assert_eq!(sample.ground_height, 1.0);
        assert_eq!(sample.wet_height, 0.5);
        assert_eq!(sample.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(sample.foam, 0.25);
        assert_eq!(sample.custom, [0.1, 0.2, 0.3]);
        assert_relative_eq!(sample.normal, Vec3::y(), epsilon = 1e-6);
        assert_eq!(sample.velocity, Vec3::zeros());
        assert_relative_eq!(sample.fluid_height(), 3.0);
    }

    #[test]
    fn test_normal_tilts_downhill() {
        let (geometry, mut buffers) = fixture();
        let ramp: Vec<[f32; 2]> = (0..25).map(|i| [(i % 5) as f32, 0.0]).collect();
        buffers.swap(ChannelUpdate::Ground(Field::from_vec(5, 5, ramp).unwrap()));
        let center = Vec3::new(2.0, 0.0, 2.0);
        let texels = evaluate_texels(&geometry, &buffers.snapshot(), &center, 10.0);
        let sample = FluidSample::from_texels(&texels, 1.0);
        assert!(sample.normal.x < 0.0);
        assert_relative_eq!(sample.normal.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_probe_outcomes() {
        let mut probe = FlowProbe::new(Vec3::new(0.0, 1.0, 0.0));
        probe.handle_sample(&FluidSample {
            depth: 1.0,
            ..FluidSample::default()
        });
        assert_eq!(probe.last_outcome(), Some(ProbeOutcome::Sampled));
        assert_eq!(probe.sampled_count(), 1);

        probe.handle_sample(&FluidSample::default());
        assert_eq!(probe.last_outcome(), Some(ProbeOutcome::SampledNothing));

        probe.clear();
        assert!(!probe.is_sampled());
        assert_eq!(probe.nothing_count(), 2);
        probe.clear();
        assert_eq!(probe.nothing_count(), 2);
    }

    #[test]
    fn test_epsilon_decides_presence() {
        let mut probe = FlowProbe::new(Vec3::zeros());
        assert!(!probe.has_fluid());
        probe.handle_sample(&FluidSample {
            depth: 0.05,
            ..FluidSample::default()
        });
        assert_eq!(probe.last_outcome(), Some(ProbeOutcome::Sampled));
        assert!(!probe.has_fluid());

        probe.epsilon = 0.01;
        assert!(probe.has_fluid());
        probe.clear();
        assert!(!probe.has_fluid());
    }

    #[test]
    fn test_submersion_ramp() {
        let mut probe = FlowProbe::new(Vec3::zeros());
        probe.handle_sample(&FluidSample {
            depth: 1.0,
            ..FluidSample::default()
        });
        assert_relative_eq!(probe.submersion(2.0), 0.0);
        assert_relative_eq!(probe.submersion(1.0), 0.5);
        assert_relative_eq!(probe.submersion(-1.0), 1.0);
        assert_relative_eq!(probe.own_submersion(), 1.0);
    }
}
