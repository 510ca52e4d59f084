//! Applies one modifier to one simulation
//!
//! The modifier box is mapped into column space to find the rectangle of
//! columns it can touch. Only the channel groups the op edits are copied
//! into scratch buffers covering that rectangle; each column inside the
//! box and the mask is edited there. Force, foam and color ops also need
//! the column's surface inside the height band; fluid ops reach any depth.
//! The touched scratch texels are then composited over copies of the
//! published channels, which the caller publishes in one swap.

use super::{Modifier, ModifierOp};
use crate::core_types::{FluidMaterial, Texel, Transform, Vec3};
use crate::grid::{
    ChannelUpdate, Field, GridGeometry, GridSnapshot, FLOW_NEG_X, FLOW_NEG_Z, FLOW_POS_X,
    FLOW_POS_Z,
};
use crate::solver::PassTimer;
use nalgebra::{Matrix4, Point3, UnitQuaternion};
use std::ops::Range;

/// Rectangle of columns copied into scratch
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnRect {
    x: Range<usize>,
    z: Range<usize>,
}

impl ColumnRect {
    fn width(&self) -> usize {
        self.x.len()
    }

    fn len(&self) -> usize {
        self.x.len() * self.z.len()
    }
}

/// Rectangular working copy of one channel group
struct Scratch<T: Texel> {
    rect: ColumnRect,
    data: Vec<T>,
    touched: Vec<bool>,
}

impl<T: Texel> Scratch<T> {
    fn copy_from(field: &Field<T>, rect: &ColumnRect) -> Self {
        let mut data = Vec::with_capacity(rect.len());
        for z in rect.z.clone() {
            let row = z * field.width;
            data.extend_from_slice(&field.data[row + rect.x.start..row + rect.x.end]);
        }
        Self {
            rect: rect.clone(),
            touched: vec![false; data.len()],
            data,
        }
    }

    fn local_index(&self, x: usize, z: usize) -> usize {
        (z - self.rect.z.start) * self.rect.width() + (x - self.rect.x.start)
    }

    fn get(&self, x: usize, z: usize) -> T {
        self.data[self.local_index(x, z)]
    }

    fn set(&mut self, x: usize, z: usize, value: T) {
        let i = self.local_index(x, z);
        self.data[i] = value;
        self.touched[i] = true;
    }

    /// Copy touched texels back over a copy of `field`
    fn is_touched(&self) -> bool {
        self.touched.iter().any(|t| *t)
    }

    fn composite_over(self, field: &Field<T>) -> Field<T> {
        let mut out = field.clone();
        let width = self.rect.width();
        for (i, value) in self.data.into_iter().enumerate() {
            if self.touched[i] {
                let x = self.rect.x.start + i % width;
                let z = self.rect.z.start + i / width;
                out.set(x, z, value);
            }
        }
        out
    }
}

/// Scratch buffers for the channel groups an op edits
#[derive(Default)]
struct ScratchSet {
    depth: Option<Scratch<f32>>,
    outflow: Option<Scratch<[f32; 4]>>,
    color: Option<Scratch<[f32; 4]>>,
    material: Option<Scratch<[f32; 4]>>,
    foam: Option<Scratch<[f32; 4]>>,
}

impl ScratchSet {
    fn for_op(op: &ModifierOp, snapshot: &GridSnapshot, rect: &ColumnRect) -> Self {
        let mut set = Self::default();
        match op {
            ModifierOp::AddFluid { .. }
            | ModifierOp::AddFluidClip { .. }
            | ModifierOp::AddFluidClipInv { .. }
            | ModifierOp::AddFluidBelow { .. } => {
                set.depth = Some(Scratch::copy_from(&snapshot.depth, rect));
                set.color = Some(Scratch::copy_from(&snapshot.color, rect));
                set.material = Some(Scratch::copy_from(&snapshot.material, rect));
                set.foam = Some(Scratch::copy_from(&snapshot.foam, rect));
            }
            ModifierOp::RemoveFluid
            | ModifierOp::RemoveFluidClip
            | ModifierOp::RemoveFluidAbove
            | ModifierOp::RemoveFluidAboveClip => {
                set.depth = Some(Scratch::copy_from(&snapshot.depth, rect));
            }
            ModifierOp::AddForce { .. }
            | ModifierOp::AddForceUniform { .. }
            | ModifierOp::DampenForce => {
                set.outflow = Some(Scratch::copy_from(&snapshot.outflow, rect));
            }
            ModifierOp::AddFoam | ModifierOp::AddFoamMax | ModifierOp::RemoveFoam => {
                set.foam = Some(Scratch::copy_from(&snapshot.foam, rect));
            }
            ModifierOp::ChangeColor { .. } => {
                set.color = Some(Scratch::copy_from(&snapshot.color, rect));
            }
        }
        set
    }

    fn is_touched(&self) -> bool {
        self.depth.as_ref().is_some_and(Scratch::is_touched)
            || self.outflow.as_ref().is_some_and(Scratch::is_touched)
            || self.color.as_ref().is_some_and(Scratch::is_touched)
            || self.material.as_ref().is_some_and(Scratch::is_touched)
            || self.foam.as_ref().is_some_and(Scratch::is_touched)
    }

    fn into_updates(self, snapshot: &GridSnapshot) -> Vec<ChannelUpdate> {
        let mut updates = Vec::with_capacity(4);
        if let Some(s) = self.depth {
            updates.push(ChannelUpdate::Depth(s.composite_over(&snapshot.depth)));
        }
        if let Some(s) = self.outflow {
            updates.push(ChannelUpdate::Outflow(s.composite_over(&snapshot.outflow)));
        }
        if let Some(s) = self.color {
            updates.push(ChannelUpdate::Color(s.composite_over(&snapshot.color)));
        }
        if let Some(s) = self.material {
            updates.push(ChannelUpdate::Material(s.composite_over(&snapshot.material)));
        }
        if let Some(s) = self.foam {
            updates.push(ChannelUpdate::Foam(s.composite_over(&snapshot.foam)));
        }
        updates
    }
}

/// Affine frames of a modifier
struct ModifierFrames {
    /// World to unit box: XZ in [0, 1] inside the box
    world_to_box: Matrix4<f32>,
    /// Box corners in world space
    corners: [Vec3; 4],
    /// Height band center and half range in modifier-local Y
    mid: f32,
    half: f32,
}

impl ModifierFrames {
    fn new(modifier: &Modifier) -> Option<Self> {
        let min = modifier.box_min();
        let box_to_local = Matrix4::new_translation(&min)
            * Matrix4::new_nonuniform_scaling(&Vec3::new(modifier.size.x, 1.0, modifier.size.z));
        let box_to_world = modifier.transform.matrix() * box_to_local;
        let world_to_box = box_to_world.try_inverse()?;

        let corner = |u: f32, v: f32| box_to_world.transform_point(&Point3::new(u, 0.0, v)).coords;
        Some(Self {
            world_to_box,
            corners: [corner(0.0, 0.0), corner(1.0, 0.0), corner(0.0, 1.0), corner(1.0, 1.0)],
            mid: (modifier.height_min + modifier.height_max) * 0.5,
            half: (modifier.height_max - modifier.height_min) * 0.5,
        })
    }

    fn box_uv(&self, world: &Vec3) -> (f32, f32) {
        let p = self.world_to_box.transform_point(&Point3::from(*world));
        (p.x, p.z)
    }

    /// Normalised band coordinate of a modifier-local height
    fn band(&self, local_y: f32) -> f32 {
        if self.half == 0.0 {
            0.0
        } else {
            (local_y - self.mid) / self.half
        }
    }
}

/// Columns the modifier box can reach, clipped to the grid
fn column_rect(geometry: &GridGeometry, corners: &[Vec3; 4]) -> Option<ColumnRect> {
    let pixels = corners.map(|c| geometry.world_to_pixel(&c));
    let min_x = pixels.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor();
    let max_x = pixels.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil();
    let min_z = pixels.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor();
    let max_z = pixels.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil();

    let last_x = (geometry.width() - 1) as f32;
    let last_z = (geometry.height() - 1) as f32;
    if !min_x.is_finite() || max_x < 0.0 || max_z < 0.0 || min_x > last_x || min_z > last_z {
        return None;
    }
    let x0 = min_x.max(0.0) as usize;
    let z0 = min_z.max(0.0) as usize;
    let x1 = max_x.min(last_x) as usize + 1;
    let z1 = max_z.min(last_z) as usize + 1;
    Some(ColumnRect { x: x0..x1, z: z0..z1 })
}

/// Flux to add toward a simulation-local direction
fn push_flux(flux: &mut [f32; 4], local_dir: (f32, f32), amount_x: f32, amount_z: f32) {
    let (dx, dz) = local_dir;
    flux[FLOW_POS_X] += dx.max(0.0) * amount_x;
    flux[FLOW_NEG_X] += (-dx).max(0.0) * amount_x;
    flux[FLOW_POS_Z] += dz.max(0.0) * amount_z;
    flux[FLOW_NEG_Z] += (-dz).max(0.0) * amount_z;
}

/// Modifier-local direction expressed in simulation-local XZ
fn direction_in_simulation(
    modifier: &Transform,
    simulation: &Transform,
    local: Vec3,
) -> Option<(f32, f32)> {
    let magnitude = local.norm();
    let world = modifier.transform_vector(&local).try_normalize(f32::EPSILON)?;
    let sim = simulation.inverse_transform_vector(&world);
    let planar = nalgebra::Vector2::new(sim.x, sim.z).try_normalize(f32::EPSILON)?;
    Some((planar.x * magnitude, planar.y * magnitude))
}

/// Apply `modifier` against one simulation's published state
///
/// # Arguments
///
/// * `modifier` - The edit
/// * `geometry` - Column layout of the simulation
/// * `snapshot` - Published state of the simulation
/// * `multiplier` - Strength multiplier (elapsed time for continuous edits)
///
/// # Returns
///
/// Channel updates to publish, or `None` when the modifier does not apply:
/// non-positive multiplier, zero strength, a missing fluid or direction
/// payload, a degenerate box, or a box that writes no column.
pub fn composite(
    modifier: &Modifier,
    geometry: &GridGeometry,
    snapshot: &GridSnapshot,
    multiplier: f32,
) -> Option<Vec<ChannelUpdate>> {
    if !modifier.would_apply(multiplier) {
        return None;
    }
    let missing_payload = match &modifier.op {
        ModifierOp::AddForce { directions } => directions.is_none(),
        op @ (ModifierOp::AddFluid { .. }
        | ModifierOp::AddFluidClip { .. }
        | ModifierOp::AddFluidClipInv { .. }
        | ModifierOp::AddFluidBelow { .. }) => op.fluid().is_none(),
        _ => false,
    };
    if missing_payload {
        return None;
    }

    let _timer = PassTimer::new("modifier_composite");
    let frames = ModifierFrames::new(modifier)?;
    let rect = column_rect(geometry, &frames.corners)?;
    let mut scratch = ScratchSet::for_op(&modifier.op, snapshot, &rect);

    let strength = modifier.effective_strength();
    let scaled = if matches!(modifier.op, ModifierOp::AddFoamMax) {
        strength
    } else {
        strength * multiplier
    };
    let vertical = modifier.transform.vertical_scale();
    let separation = geometry.separation();
    let sim_transform = geometry.transform();

    for z in rect.z.clone() {
        for x in rect.x.clone() {
            let ground = snapshot.ground.get(x, z)[0];
            let depth = snapshot.depth.get(x, z);
            let world = geometry.pixel_to_world(x as f32, z as f32, ground);
            let (u, v) = frames.box_uv(&world);
            if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                continue;
            }
            let mask = modifier.mask.as_ref().map_or(1.0, |m| m.sample(u, v));
            if mask <= 0.0 {
                continue;
            }
            let s = scaled * mask;

            let ground_local = modifier.transform.inverse_transform_point(&world).y;
            let surface_world = Vec3::new(world.x, ground + depth, world.z);
            let surface_local = modifier.transform.inverse_transform_point(&surface_world).y;
            if modifier.op.is_height_banded() && frames.band(surface_local).abs() > 1.0 {
                continue;
            }
            let ground_above_mid = ground_local > frames.mid;

            match &modifier.op {
                ModifierOp::AddFluid { fluid }
                | ModifierOp::AddFluidClip { fluid }
                | ModifierOp::AddFluidClipInv { fluid }
                | ModifierOp::AddFluidBelow { fluid } => {
                    let Some(fluid) = fluid else { continue };
                    let skip = match &modifier.op {
                        ModifierOp::AddFluidClip { .. } => ground_above_mid,
                        ModifierOp::AddFluidClipInv { .. } => !ground_above_mid,
                        _ => false,
                    };
                    if skip {
                        continue;
                    }
                    let mut amount = s;
                    if matches!(modifier.op, ModifierOp::AddFluidBelow { .. }) {
                        amount = amount.min(((frames.mid - surface_local) * vertical).max(0.0));
                    }
                    if amount > 0.0 {
                        add_fluid(&mut scratch, x, z, fluid, amount);
                    }
                }
                ModifierOp::RemoveFluid
                | ModifierOp::RemoveFluidClip
                | ModifierOp::RemoveFluidAbove
                | ModifierOp::RemoveFluidAboveClip => {
                    let clip = matches!(
                        modifier.op,
                        ModifierOp::RemoveFluidClip | ModifierOp::RemoveFluidAboveClip
                    );
                    if clip && ground_above_mid {
                        continue;
                    }
                    let mut amount = s;
                    if matches!(
                        modifier.op,
                        ModifierOp::RemoveFluidAbove | ModifierOp::RemoveFluidAboveClip
                    ) {
                        amount = amount.min(((surface_local - frames.mid) * vertical).max(0.0));
                    }
                    if let Some(d) = &mut scratch.depth {
                        let current = d.get(x, z);
                        d.set(x, z, (current - amount).max(0.0));
                    }
                }
                ModifierOp::AddForce { directions } => {
                    let Some(map) = directions else { continue };
                    let dir = map.sample(u, v);
                    let local = Vec3::new(dir.x, 0.0, dir.y);
                    if let (Some(flux), Some(dir)) = (
                        &mut scratch.outflow,
                        direction_in_simulation(&modifier.transform, sim_transform, local),
                    ) {
                        let mut f = flux.get(x, z);
                        push_flux(&mut f, dir, s * depth * separation.y, s * depth * separation.x);
                        flux.set(x, z, f);
                    }
                }
                ModifierOp::AddForceUniform { angle } => {
                    let turn = UnitQuaternion::from_axis_angle(&Vec3::y_axis(), angle.to_radians());
                    let local = turn * Vec3::z();
                    if let (Some(flux), Some(dir)) = (
                        &mut scratch.outflow,
                        direction_in_simulation(&modifier.transform, sim_transform, local),
                    ) {
                        let mut f = flux.get(x, z);
                        push_flux(&mut f, dir, s * depth * separation.y, s * depth * separation.x);
                        flux.set(x, z, f);
                    }
                }
                ModifierOp::DampenForce => {
                    if let Some(flux) = &mut scratch.outflow {
                        let keep = 1.0 - s.clamp(0.0, 1.0);
                        let f = flux.get(x, z).scale(keep);
                        flux.set(x, z, f);
                    }
                }
                ModifierOp::AddFoam | ModifierOp::AddFoamMax | ModifierOp::RemoveFoam => {
                    if let Some(foam) = &mut scratch.foam {
                        let mut f = foam.get(x, z);
                        f[0] = match modifier.op {
                            ModifierOp::AddFoam => (f[0] + s).min(1.0),
                            ModifierOp::AddFoamMax => f[0].max(s.min(1.0)),
                            _ => (f[0] - s).max(0.0),
                        };
                        foam.set(x, z, f);
                    }
                }
                ModifierOp::ChangeColor { color, channels } => {
                    if let Some(scratch_color) = &mut scratch.color {
                        let t = s.clamp(0.0, 1.0);
                        let mut c = scratch_color.get(x, z);
                        for k in 0..4 {
                            c[k] += (color[k] - c[k]) * t * channels[k].clamp(0.0, 1.0);
                        }
                        scratch_color.set(x, z, c);
                    }
                }
            }
        }
    }

    scratch.is_touched().then(|| scratch.into_updates(snapshot))
}

/// Pour `amount` meters of `fluid` into a column, mixing by volume
fn add_fluid(scratch: &mut ScratchSet, x: usize, z: usize, fluid: &FluidMaterial, amount: f32) {
    let Some(depth) = &mut scratch.depth else { return };
    let old = depth.get(x, z).max(0.0);
    let total = old + amount;
    depth.set(x, z, total);

    let w_old = old / total;
    let w_new = amount / total;
    if let Some(color) = &mut scratch.color {
        let c = color.get(x, z).scale(w_old).add(fluid.color.scale(w_new));
        color.set(x, z, c);
    }
    if let Some(material) = &mut scratch.material {
        let m = material.get(x, z).scale(w_old).add(fluid.material_lanes().scale(w_new));
        material.set(x, z, m);
    }
    if let Some(foam) = &mut scratch.foam {
        let f = foam.get(x, z).scale(w_old).add(fluid.foam_lanes(0.0).scale(w_new));
        foam.set(x, z, f);
    }
}
