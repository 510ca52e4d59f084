//! Localised grid edits
//!
//! A [`Modifier`] is an oriented 2D box laid over the simulations, with an
//! optional shape mask, a height band, a strength and an operation. The
//! [`compositor`] turns one application of a modifier against one
//! simulation into channel updates; the world decides when each modifier
//! is due according to its [`ApplyCadence`].

pub mod compositor;

pub use compositor::composite;

use crate::core_types::{FluidMaterial, Rgba, Transform, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Handle of a modifier registered with a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModifierId(pub u32);

/// When a modifier applies itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplyCadence {
    /// Only when the host asks
    Manually,
    /// Once, in the first modifier slot after being enabled
    Once,
    /// Every modifier slot, scaled by the elapsed time
    #[default]
    Continuously,
}

/// Texture channel a shape mask reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaskChannel {
    Red,
    Green,
    Blue,
    #[default]
    Alpha,
}

impl MaskChannel {
    const fn lane(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Alpha => 3,
        }
    }
}

/// RGBA texture restricting where a modifier applies
///
/// Sampled bilinearly across the modifier box; `(0, 0)` is the box's
/// minimum corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeMask {
    width: usize,
    height: usize,
    texels: Vec<Rgba>,
    channel: MaskChannel,
}

impl ShapeMask {
    /// Wrap texels in row-major order
    ///
    /// Returns `None` unless `texels` holds `width * height` entries.
    #[must_use]
    pub fn new(
        width: usize,
        height: usize,
        texels: Vec<Rgba>,
        channel: MaskChannel,
    ) -> Option<Self> {
        (width > 0 && height > 0 && texels.len() == width * height).then_some(Self {
            width,
            height,
            texels,
            channel,
        })
    }

    /// Mask value at box coordinates in `[0, 1]²`
    #[must_use]
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let lane = self.channel.lane();
        sample_grid(self.width, self.height, u, v, |i| self.texels[i][lane])
    }
}

/// Per-texel flow directions in modifier-local XZ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionMap {
    width: usize,
    height: usize,
    directions: Vec<Vec2>,
}

impl DirectionMap {
    /// Wrap directions in row-major order
    ///
    /// Returns `None` unless `directions` holds `width * height` entries.
    #[must_use]
    pub fn new(width: usize, height: usize, directions: Vec<Vec2>) -> Option<Self> {
        (width > 0 && height > 0 && directions.len() == width * height).then_some(Self {
            width,
            height,
            directions,
        })
    }

    /// Direction at box coordinates in `[0, 1]²`
    #[must_use]
    pub fn sample(&self, u: f32, v: f32) -> Vec2 {
        Vec2::new(
            sample_grid(self.width, self.height, u, v, |i| self.directions[i].x),
            sample_grid(self.width, self.height, u, v, |i| self.directions[i].y),
        )
    }
}

/// Bilinear lookup over texel centers
fn sample_grid(width: usize, height: usize, u: f32, v: f32, value: impl Fn(usize) -> f32) -> f32 {
    let gx = (u.clamp(0.0, 1.0) * width as f32 - 0.5).clamp(0.0, (width - 1) as f32);
    let gz = (v.clamp(0.0, 1.0) * height as f32 - 0.5).clamp(0.0, (height - 1) as f32);
    let x0 = gx.floor() as usize;
    let z0 = gz.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let z1 = (z0 + 1).min(height - 1);
    let fx = gx - x0 as f32;
    let fz = gz - z0 as f32;

    let row0 = value(z0 * width + x0) * (1.0 - fx) + value(z0 * width + x1) * fx;
    let row1 = value(z1 * width + x0) * (1.0 - fx) + value(z1 * width + x1) * fx;
    row0 * (1.0 - fz) + row1 * fz
}

/// Edit performed by a modifier, with exactly the payload it needs
#[derive(Debug, Clone, PartialEq)]
pub enum ModifierOp {
    /// Add fluid under and above the modifier
    AddFluid { fluid: Option<FluidMaterial> },
    /// Add fluid, skipping columns whose ground lies above the modifier
    AddFluidClip { fluid: Option<FluidMaterial> },
    /// Add fluid only where the ground lies above the modifier
    AddFluidClipInv { fluid: Option<FluidMaterial> },
    /// Add fluid until the surface reaches the modifier
    AddFluidBelow { fluid: Option<FluidMaterial> },
    /// Remove fluid under and above the modifier
    RemoveFluid,
    /// Remove fluid, skipping columns whose ground lies above the modifier
    RemoveFluidClip,
    /// Remove fluid until the surface drops to the modifier
    RemoveFluidAbove,
    /// Both of the above
    RemoveFluidAboveClip,
    /// Push fluid along the directions of a map
    AddForce { directions: Option<DirectionMap> },
    /// Push fluid along the modifier's forward axis, rotated by `angle` degrees
    AddForceUniform { angle: f32 },
    /// Bleed outflow; strength 1 removes all of it
    DampenForce,
    /// Add foam
    AddFoam,
    /// Raise foam to the strength, at unit strength regardless of multiplier
    AddFoamMax,
    /// Remove foam
    RemoveFoam,
    /// Move color toward `color` on the channels weighted by `channels`
    ChangeColor { color: Rgba, channels: [f32; 4] },
}

impl ModifierOp {
    /// Whether the op only touches columns whose surface lies in the height band
    ///
    /// Fluid ops reach fluid under and above the modifier; for them only the
    /// band's mid plane matters (clip and fill/drain limits).
    #[must_use]
    pub fn is_height_banded(&self) -> bool {
        !matches!(
            self,
            Self::AddFluid { .. }
                | Self::AddFluidClip { .. }
                | Self::AddFluidClipInv { .. }
                | Self::AddFluidBelow { .. }
                | Self::RemoveFluid
                | Self::RemoveFluidClip
                | Self::RemoveFluidAbove
                | Self::RemoveFluidAboveClip
        )
    }

    /// Fluid payload of the add-fluid variants
    #[must_use]
    pub fn fluid(&self) -> Option<&FluidMaterial> {
        match self {
            Self::AddFluid { fluid }
            | Self::AddFluidClip { fluid }
            | Self::AddFluidClipInv { fluid }
            | Self::AddFluidBelow { fluid } => fluid.as_ref(),
            _ => None,
        }
    }
}

/// Speed scaling of a modifier's strength
///
/// The speed is either reported by the host with [`Modifier::set_speed`] or,
/// with `from_motion`, derived each fixed step from how far the modifier
/// moved (see [`Modifier::track_motion`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedScale {
    /// Speed at which the full strength applies
    pub speed_max: f32,
    /// Cap the factor at 1 when the speed exceeds `speed_max`
    pub clamp: bool,
    /// Derive the speed from the modifier's movement
    pub from_motion: bool,
    /// Latest speed (m/s)
    pub speed: f32,
    last_position: Option<Vec3>,
}

impl SpeedScale {
    #[must_use]
    pub fn new(speed_max: f32) -> Self {
        Self {
            speed_max,
            clamp: true,
            from_motion: false,
            speed: 0.0,
            last_position: None,
        }
    }

    /// Strength factor; within [0, 1] unless `clamp` is off
    #[must_use]
    pub fn factor(&self) -> f32 {
        if self.speed_max == 0.0 {
            return 0.0;
        }
        let factor = self.speed / self.speed_max;
        if self.clamp {
            factor.clamp(0.0, 1.0)
        } else {
            factor
        }
    }

    /// Derive the speed from the distance moved over `dt`
    ///
    /// The first call only records the position.
    pub fn track(&mut self, position: Vec3, dt: f32) {
        if let Some(last) = self.last_position {
            if dt > 0.0 {
                self.speed = (position - last).norm() / dt;
            }
        }
        self.last_position = Some(position);
    }
}

/// A shaped, banded grid edit
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    /// Operation and payload
    pub op: ModifierOp,
    /// Placement of the box
    pub transform: Transform,
    /// Box size on X and Z (Y ignored)
    pub size: Vec3,
    /// Center the box on the modifier origin instead of starting there
    pub center: bool,
    /// Optional mask across the box
    pub mask: Option<ShapeMask>,
    /// Bottom of the height band in modifier-local Y
    pub height_min: f32,
    /// Top of the height band in modifier-local Y
    pub height_max: f32,
    /// Base strength; meaning depends on the op
    pub strength: f32,
    /// When the modifier applies
    pub cadence: ApplyCadence,
    /// Optional speed scaling of the strength
    pub speed_scale: Option<SpeedScale>,
    enabled: bool,
    primed: bool,
}

impl Modifier {
    /// Enabled modifier with default box, band and strength
    #[must_use]
    pub fn new(op: ModifierOp, transform: Transform) -> Self {
        Self {
            op,
            transform,
            size: Vec3::new(1.0, 0.0, 1.0),
            center: true,
            mask: None,
            height_min: 0.0,
            height_max: 1.0,
            strength: 1.0,
            cadence: ApplyCadence::Continuously,
            speed_scale: None,
            enabled: true,
            primed: true,
        }
    }

    #[must_use]
    pub fn with_size(mut self, x: f32, z: f32) -> Self {
        self.size = Vec3::new(x, 0.0, z);
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    #[must_use]
    pub fn with_cadence(mut self, cadence: ApplyCadence) -> Self {
        self.cadence = cadence;
        self
    }

    #[must_use]
    pub fn with_height_band(mut self, min: f32, max: f32) -> Self {
        self.height_min = min;
        self.height_max = max;
        self
    }

    #[must_use]
    pub fn with_mask(mut self, mask: ShapeMask) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    #[must_use]
    pub fn with_speed_scale(mut self, speed_max: f32) -> Self {
        self.speed_scale = Some(SpeedScale::new(speed_max));
        self
    }

    /// Scale the strength by the speed the modifier moves at
    #[must_use]
    pub fn with_motion_speed_scale(mut self, speed_max: f32) -> Self {
        self.speed_scale = Some(SpeedScale {
            from_motion: true,
            ..SpeedScale::new(speed_max)
        });
        self
    }

    /// Whether the modifier takes part in ticks
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable the modifier; a `Once` modifier is primed again
    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.primed = true;
        }
    }

    /// Disable the modifier
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Report the host speed used by [`SpeedScale`]
    pub fn set_speed(&mut self, speed: f32) {
        if let Some(scale) = &mut self.speed_scale {
            scale.speed = speed;
        }
    }

    /// Update a motion speed scale from the movement over one fixed step
    pub fn track_motion(&mut self, dt: f32) {
        let position = self.transform.position();
        if let Some(scale) = self.speed_scale.as_mut().filter(|s| s.from_motion) {
            scale.track(position, dt);
        }
    }

    /// Strength after speed scaling
    #[must_use]
    pub fn effective_strength(&self) -> f32 {
        self.speed_scale
            .map_or(self.strength, |scale| self.strength * scale.factor())
    }

    /// Consume the pending one-shot application, if any
    pub fn take_once(&mut self) -> bool {
        if self.enabled && self.cadence == ApplyCadence::Once && self.primed {
            self.primed = false;
            true
        } else {
            false
        }
    }

    /// Whether an application with `multiplier` would do anything
    #[must_use]
    pub fn would_apply(&self, multiplier: f32) -> bool {
        multiplier > 0.0 && self.effective_strength() != 0.0
    }

    /// Box-local minimum corner, before the modifier transform
    #[must_use]
    pub fn box_min(&self) -> Vec3 {
        if self.center {
            Vec3::new(-self.size.x * 0.5, 0.0, -self.size.z * 0.5)
        } else {
            Vec3::zeros()
        }
    }
}
