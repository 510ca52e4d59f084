//! Timed particle emitters

use crate::core_types::{FluidMaterial, Transform, Vec3};
use crate::simulation::SimulationId;
use nalgebra::UnitQuaternion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One particle an emitter wants to inject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    /// World position
    pub position: Vec3,
    /// World velocity
    pub velocity: Vec3,
    /// Volume before scaling by the column separation
    pub volume: f32,
    /// Seconds to live
    pub life: f32,
}

/// Sprays particles of one fluid at a fixed interval
#[derive(Debug, Clone)]
pub struct ParticleEmitter {
    /// Fluid carried by emitted particles
    pub fluid: FluidMaterial,
    /// Simulation to emit into when it is active; otherwise the nearest one
    pub simulation: Option<SimulationId>,
    /// Placement; particles leave from the origin
    pub transform: Transform,
    /// Local emission direction
    pub direction: Vec3,
    pub volume_min: f32,
    pub volume_max: f32,
    pub speed_min: f32,
    pub speed_max: f32,
    pub life_min: f32,
    pub life_max: f32,
    /// Random deviation from `direction` in degrees
    pub spread: f32,
    /// Seconds between particles
    pub interval: f32,
    /// Emit only while enabled
    pub enabled: bool,
    age: f32,
    rng: StdRng,
}

impl ParticleEmitter {
    /// Emitter with default ranges and a fixed seed
    #[must_use]
    pub fn new(fluid: FluidMaterial, transform: Transform) -> Self {
        Self {
            fluid,
            simulation: None,
            transform,
            direction: Vec3::z(),
            volume_min: 1.0,
            volume_max: 1.0,
            speed_min: 1.0,
            speed_max: 1.5,
            life_min: 4.0,
            life_max: 5.0,
            spread: 10.0,
            interval: 0.1,
            enabled: true,
            age: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Reseed the random ranges
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Advance the interval timer
    ///
    /// # Returns
    ///
    /// A particle to inject when the interval elapsed this tick
    pub fn update(&mut self, dt: f32) -> Option<Emission> {
        if !self.enabled {
            return None;
        }
        self.age += dt;
        if self.age < self.interval {
            return None;
        }
        self.age = 0.0;
        Some(self.emit_now())
    }

    /// Draw one particle from the configured ranges
    pub fn emit_now(&mut self) -> Emission {
        let spread = self.spread.abs().to_radians();
        let yaw = self.rng.random_range(-spread..=spread);
        let pitch = self.rng.random_range(-spread..=spread);
        let deviation = UnitQuaternion::from_euler_angles(pitch, yaw, 0.0);
        let local = deviation * self.direction.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        let world_dir = self
            .transform
            .transform_vector(&local)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::z);

        let speed = self.sample(self.speed_min, self.speed_max);
        Emission {
            position: self.transform.position(),
            velocity: world_dir * speed,
            volume: self.sample(self.volume_min, self.volume_max),
            life: self.sample(self.life_min, self.life_max),
        }
    }

    fn sample(&mut self, min: f32, max: f32) -> f32 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.rng.random_range(lo..=hi)
    }
}
