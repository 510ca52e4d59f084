//! Splash particles coupled to the column grid
//!
//! Particles live in a fixed-capacity ring buffer: every injection takes the
//! next slot and overwrites whatever was there, live or not. Each tick the
//! system deposits particles that have landed in the fluid (or are about to
//! expire over the grid) into their nearest column, integrates gravity and
//! drag, then moves them. There is no collision against ground geometry;
//! landing is decided against the grid surface.
//!
//! The particle array is published as an `Arc` snapshot like the grid
//! channels, so a renderer holding the previous snapshot is unaffected by
//! the next pass.

pub mod emitter;

pub use emitter::{Emission, ParticleEmitter};

use crate::core_types::{FluidMaterial, Rgba, Texel, Vec3};
use crate::grid::{ChannelUpdate, GridGeometry, GridSnapshot};
use crate::solver::{dampen_factor, PassTimer};
use std::sync::Arc;
use tracing::debug;

/// One fluid droplet
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// World velocity (m/s)
    pub velocity: Vec3,
    /// World position
    pub position: Vec3,
    /// Seconds since injection
    pub age: f32,
    /// Seconds left to live; the slot is free once this reaches zero
    pub life: f32,
    /// Column depth deposited on landing (meters)
    pub depth: f32,
    pub color: Rgba,
    /// Emission, smoothness, metallic, viscosity
    pub material: [f32; 4],
    /// Foam and custom lanes
    pub foam: [f32; 4],
}

impl Particle {
    /// Whether the slot holds a particle still in flight
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }
}

/// Ring buffer of particles belonging to one simulation
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Arc<Vec<Particle>>,
    index: usize,
    injected: u64,
    drag: f32,
    gravity: Vec3,
}

impl ParticleSystem {
    /// Create an empty ring buffer
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of slots (at least one)
    /// * `drag` - Exponential velocity damping rate (1/s)
    /// * `gravity` - World acceleration (m/s²)
    #[must_use]
    pub fn new(capacity: usize, drag: f32, gravity: Vec3) -> Self {
        Self {
            particles: Arc::new(vec![Particle::default(); capacity.max(1)]),
            index: 0,
            injected: 0,
            drag,
            gravity,
        }
    }

    /// Number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    /// Every slot, live or not
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Shared handle to the published slots
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Particle>> {
        Arc::clone(&self.particles)
    }

    /// Slot written by the most recent injection
    #[must_use]
    pub fn last_index(&self) -> usize {
        self.index
    }

    /// Total particles injected since creation
    #[must_use]
    pub fn injected(&self) -> u64 {
        self.injected
    }

    /// Number of particles still in flight
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_alive()).count()
    }

    /// Inject a particle into the next slot
    ///
    /// The slot is overwritten unconditionally.
    ///
    /// # Returns
    ///
    /// Index of the written slot
    pub fn add(
        &mut self,
        fluid: &FluidMaterial,
        depth: f32,
        position: Vec3,
        velocity: Vec3,
        life: f32,
        foam: f32,
    ) -> usize {
        self.index = (self.index + 1) % self.capacity();
        self.injected += 1;
        Arc::make_mut(&mut self.particles)[self.index] = Particle {
            velocity,
            position,
            age: 0.0,
            life,
            depth,
            color: fluid.color,
            material: fluid.material_lanes(),
            foam: fluid.foam_lanes(foam),
        };
        self.index
    }

    /// Deposit landed particles into the grid
    ///
    /// A live particle over the grid lands when it is at or below the fluid
    /// surface of its nearest column, or when it would expire within `dt`.
    /// Landed particles add their depth to that column, blend their
    /// properties in by volume, and are consumed; the consumed slot keeps
    /// the blended column properties.
    ///
    /// # Arguments
    ///
    /// * `geometry` - Column layout of the owning simulation
    /// * `snapshot` - Currently published grid state
    /// * `dt` - Timestep in seconds
    ///
    /// # Returns
    ///
    /// Channel updates to publish, or `None` when nothing landed
    pub fn contribute(
        &mut self,
        geometry: &GridGeometry,
        snapshot: &GridSnapshot,
        dt: f32,
    ) -> Option<Vec<ChannelUpdate>> {
        let _timer = PassTimer::new("particles_contribute");

        let landed: Vec<(usize, (usize, usize))> = self
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_alive())
            .filter_map(|(slot, p)| {
                let (x, z) = geometry.nearest_column(&p.position)?;
                let surface = snapshot.ground.get(x, z)[0] + snapshot.depth.get(x, z);
                (p.position.y <= surface || p.life <= dt).then_some((slot, (x, z)))
            })
            .collect();
        if landed.is_empty() {
            return None;
        }

        let mut depth = snapshot.depth.as_ref().clone();
        let mut color = snapshot.color.as_ref().clone();
        let mut material = snapshot.material.as_ref().clone();
        let mut foam = snapshot.foam.as_ref().clone();

        for &(slot, (x, z)) in &landed {
            let p = self.particles[slot];
            if p.depth <= 0.0 {
                continue;
            }
            let i = depth.index(x, z);
            let old = depth.data[i].max(0.0);
            let total = old + p.depth;
            let w_old = old / total;
            let w_new = p.depth / total;
            depth.data[i] = total;
            color.data[i] = color.data[i].scale(w_old).add(p.color.scale(w_new));
            material.data[i] = material.data[i].scale(w_old).add(p.material.scale(w_new));
            foam.data[i] = foam.data[i].scale(w_old).add(p.foam.scale(w_new));
        }

        let slots = Arc::make_mut(&mut self.particles);
        for &(slot, (x, z)) in &landed {
            let i = depth.index(x, z);
            let p = &mut slots[slot];
            p.life = 0.0;
            p.color = color.data[i];
            p.material = material.data[i];
            p.foam = foam.data[i];
        }
        debug!(landed = landed.len(), "Particles deposited into grid");

        Some(vec![
            ChannelUpdate::Depth(depth),
            ChannelUpdate::Color(color),
            ChannelUpdate::Material(material),
            ChannelUpdate::Foam(foam),
        ])
    }

    /// Integrate gravity and drag, then age every live particle
    pub fn apply_forces(&mut self, dt: f32) {
        let _timer = PassTimer::new("particles_forces");
        let keep = 1.0 - dampen_factor(self.drag, dt);
        let gravity = self.gravity;
        self.publish(|p| {
            p.velocity = (p.velocity + gravity * dt) * keep;
            p.age += dt;
            p.life = (p.life - dt).max(0.0);
        });
    }

    /// Move every live particle along its velocity
    pub fn move_particles(&mut self, dt: f32) {
        let _timer = PassTimer::new("particles_move");
        self.publish(|p| p.position += p.velocity * dt);
    }

    /// Build the next array from the current one and publish it
    fn publish(&mut self, update: impl Fn(&mut Particle)) {
        let next: Vec<Particle> = self
            .particles
            .iter()
            .map(|p| {
                let mut p = *p;
                if p.is_alive() {
                    update(&mut p);
                }
                p
            })
            .collect();
        self.particles = Arc::new(next);
    }
}
