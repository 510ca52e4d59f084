//! Force pass: outflow integration over virtual pipes
//!
//! Every column is connected to its four neighbours by a virtual pipe. The
//! pass accelerates the flux in each pipe by the difference in surface
//! height (ground + depth) and then scales the column's outflow down so it
//! can never send more fluid than it holds:
//!
//! ```text
//! f_k ← max(0, f_k·retain + dt·g·(H − H_k)·A_k / L_k)
//! K   = min(1, depth·area / (Σf·dt))
//! f_k ← f_k·K
//! ```
//!
//! Grid edges are closed: pipes leading off the grid carry nothing.

use super::quantize::dampen_factor;
use crate::core_types::Vec2;
use crate::grid::{Field, GroundTexel, OutflowTexel, FLOW_NEG_X, FLOW_NEG_Z, FLOW_POS_X, FLOW_POS_Z};
use rayon::prelude::*;

/// Depth below which a column is considered dry
pub const DRY_DEPTH: f32 = 0.001;

/// Viscosity to flux-damping rate conversion (1/s)
pub const VISCOSITY_RATE: f32 = 10.0;

/// Parameters for one force pass
#[derive(Debug, Clone, Copy)]
pub struct ForceParams {
    /// Timestep in seconds
    pub dt: f32,
    /// Gravitational acceleration (m/s²)
    pub gravity: f32,
    /// Column separation along X and Z
    pub separation: Vec2,
}

/// CPU implementation of the force pass
///
/// # Arguments
///
/// * `ground` - Ground/wet channel (only the ground lane is read)
/// * `depth` - Fluid depth per column
/// * `material` - Material lanes (viscosity in lane 3 damps the flux)
/// * `outflow_in` - Outflow from the previous pass
/// * `outflow_out` - Outflow to write
/// * `width` - Grid width in columns
/// * `height` - Grid height in columns
/// * `params` - Pass parameters
#[allow(clippy::too_many_arguments)]
pub fn step_forces_cpu(
    ground: &[GroundTexel],
    depth: &[f32],
    material: &[[f32; 4]],
    outflow_in: &[OutflowTexel],
    outflow_out: &mut [OutflowTexel],
    width: usize,
    height: usize,
    params: ForceParams,
) {
    let sep = params.separation;
    let area = sep.x * sep.y;
    // Pipe cross-section over pipe length, per axis
    let coeff_x = sep.y * sep.y / sep.x;
    let coeff_z = sep.x * sep.x / sep.y;
    let surface = |i: usize| ground[i][0] + depth[i];

    outflow_out
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(z, row)| {
            for (x, flux) in row.iter_mut().enumerate() {
                let i = z * width + x;
                let h = surface(i);
                let retain = 1.0 - dampen_factor(material[i][3] * VISCOSITY_RATE, params.dt);
                let old = outflow_in[i];

                let pipe = |lane: usize, neighbour: Option<usize>, coeff: f32| -> f32 {
                    neighbour.map_or(0.0, |n| {
                        let accel = params.dt * params.gravity * (h - surface(n)) * coeff;
                        (old[lane] * retain + accel).max(0.0)
                    })
                };

                let mut out = [0.0; 4];
                out[FLOW_NEG_X] = pipe(FLOW_NEG_X, (x > 0).then(|| i - 1), coeff_x);
                out[FLOW_POS_X] = pipe(FLOW_POS_X, (x + 1 < width).then(|| i + 1), coeff_x);
                out[FLOW_NEG_Z] = pipe(FLOW_NEG_Z, (z > 0).then(|| i - width), coeff_z);
                out[FLOW_POS_Z] = pipe(FLOW_POS_Z, (z + 1 < height).then(|| i + width), coeff_z);

                let total: f32 = out.iter().sum();
                let capacity = depth[i] * area;
                if total * params.dt > capacity && total > 0.0 {
                    let k = capacity / (total * params.dt);
                    for lane in &mut out {
                        *lane *= k;
                    }
                }
                *flux = out;
            }
        });
}

/// Horizontal flow velocity of a column in local m/s
///
/// Averages the net flux through the column's two faces on each axis and
/// divides by the wetted cross-section. Dry columns report zero and the
/// magnitude is clamped to `max_speed`.
///
/// # Arguments
///
/// * `outflow` - Outflow channel
/// * `depth` - Depth channel
/// * `x`, `z` - Column coordinates
/// * `separation` - Column separation along X and Z
/// * `max_speed` - Largest reported speed
#[must_use]
pub fn column_velocity(
    outflow: &Field<OutflowTexel>,
    depth: &Field<f32>,
    x: usize,
    z: usize,
    separation: Vec2,
    max_speed: f32,
) -> Vec2 {
    let d = depth.get(x, z);
    if d < DRY_DEPTH {
        return Vec2::zeros();
    }
    let own = outflow.get(x, z);
    let xi = x as isize;
    let zi = z as isize;
    let inflow = |dx: isize, dz: isize, lane: usize, inside: bool| {
        if inside {
            outflow.get_clamped(xi + dx, zi + dz)[lane]
        } else {
            0.0
        }
    };
    let from_neg_x = inflow(-1, 0, FLOW_POS_X, x > 0);
    let from_pos_x = inflow(1, 0, FLOW_NEG_X, x + 1 < outflow.width);
    let from_neg_z = inflow(0, -1, FLOW_POS_Z, z > 0);
    let from_pos_z = inflow(0, 1, FLOW_NEG_Z, z + 1 < outflow.height);

    let flux_x = (from_neg_x - own[FLOW_NEG_X] + own[FLOW_POS_X] - from_pos_x) * 0.5;
    let flux_z = (from_neg_z - own[FLOW_NEG_Z] + own[FLOW_POS_Z] - from_pos_z) * 0.5;
    let velocity = Vec2::new(flux_x / (d * separation.y), flux_z / (d * separation.x));

    let speed = velocity.norm();
    if speed > max_speed && speed > 0.0 {
        velocity * (max_speed.max(0.0) / speed)
    } else {
        velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        ground: &[f32],
        depth: &[f32],
        width: usize,
        height: usize,
        dt: f32,
    ) -> Vec<OutflowTexel> {
        let ground: Vec<GroundTexel> = ground.iter().map(|&g| [g, -1.0]).collect();
        let material = vec![[0.0; 4]; width * height];
        let outflow_in = vec![[0.0; 4]; width * height];
        let mut outflow_out = vec![[0.0; 4]; width * height];
        step_forces_cpu(
            &ground,
            depth,
            &material,
            &outflow_in,
            &mut outflow_out,
            width,
            height,
            ForceParams {
                dt,
                gravity: 9.81,
                separation: Vec2::new(1.0, 1.0),
            },
        );
        outflow_out
    }

    #[test]
    fn test_flat_surface_has_no_flow() {
        let out = run(&[0.0; 9], &[1.0; 9], 3, 3, 0.02);
        assert!(out.iter().all(|f| f.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_flows_downhill_only() {
        let out = run(&[0.0; 3], &[2.0, 1.0, 0.0], 3, 1, 0.02);
        assert!(out[0][FLOW_POS_X] > 0.0);
        assert_eq!(out[0][FLOW_NEG_X], 0.0);
        assert_eq!(out[2][FLOW_NEG_X], 0.0);
        assert!(out[1][FLOW_POS_X] > 0.0);
    }

    #[test]
    fn test_outflow_capped_by_volume() {
        let dt = 1.0;
        let out = run(&[0.0; 3], &[0.0, 0.1, 0.0], 3, 1, dt);
        let total: f32 = out[1].iter().sum();
        assert!(total * dt <= 0.1 + 1e-6);
    }

    #[test]
    fn test_velocity_direction() {
        let mut outflow = Field::new(3, 1);
        outflow.set(1, 0, [0.0, 1.0, 0.0, 0.0]);
        outflow.set(0, 0, [0.0, 1.0, 0.0, 0.0]);
        let depth = Field::with_value(3, 1, 1.0);
        let v = column_velocity(&outflow, &depth, 1, 0, Vec2::new(1.0, 1.0), 10.0);
        assert!(v.x > 0.0);
        assert_eq!(v.y, 0.0);

        let clamped = column_velocity(&outflow, &depth, 1, 0, Vec2::new(1.0, 1.0), 0.5);
        assert!((clamped.norm() - 0.5).abs() < 1e-6);
    }
}
