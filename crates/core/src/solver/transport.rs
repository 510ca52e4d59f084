//! Transport pass: move fluid and its properties along the outflow
//!
//! Outflow may have been edited since the force pass (modifiers run in
//! between), so the per-column scale `K` is recomputed from the current
//! depth before anything moves. Every column then keeps what it did not
//! send and receives its neighbours' scaled outflow. Volume is conserved
//! exactly up to float rounding; depth never goes negative.
//!
//! Color, material and foam/custom lanes mix weighted by volume. Foam is
//! then reduced by the clear amount released this tick.

use super::forces::DRY_DEPTH;
use crate::core_types::{Texel, Vec2};
use crate::grid::{Field, OutflowTexel, FLOW_NEG_X, FLOW_NEG_Z, FLOW_POS_X, FLOW_POS_Z};
use rayon::prelude::*;

/// Parameters for one transport pass
#[derive(Debug, Clone, Copy)]
pub struct TransportParams {
    /// Timestep in seconds
    pub dt: f32,
    /// Column separation along X and Z
    pub separation: Vec2,
    /// Foam removed from every column this tick
    pub foam_clear: f32,
}

/// Fields written by the transport pass
#[derive(Debug, Clone)]
pub struct TransportOutput {
    pub depth: Field<f32>,
    pub color: Field<[f32; 4]>,
    pub material: Field<[f32; 4]>,
    pub foam: Field<[f32; 4]>,
}

/// Fields read by the transport pass
#[derive(Debug, Clone, Copy)]
pub struct TransportInput<'a> {
    pub depth: &'a Field<f32>,
    pub outflow: &'a Field<OutflowTexel>,
    pub color: &'a Field<[f32; 4]>,
    pub material: &'a Field<[f32; 4]>,
    pub foam: &'a Field<[f32; 4]>,
}

/// Fraction of its outflow each column can actually deliver this tick
fn delivery_scale(depth: &[f32], outflow: &[OutflowTexel], area: f32, dt: f32) -> Vec<f32> {
    depth
        .par_iter()
        .zip(outflow.par_iter())
        .map(|(&d, f)| {
            let total: f32 = f.iter().sum();
            let capacity = d.max(0.0) * area;
            if total > 0.0 && total * dt > capacity {
                capacity / (total * dt)
            } else {
                1.0
            }
        })
        .collect()
}

/// CPU implementation of the transport pass
///
/// # Arguments
///
/// * `input` - Current depth, outflow and property channels
/// * `params` - Pass parameters
///
/// # Returns
///
/// New depth, color, material and foam channels
#[must_use]
pub fn step_transport_cpu(input: TransportInput<'_>, params: TransportParams) -> TransportOutput {
    let width = input.depth.width;
    let height = input.depth.height;
    let area = params.separation.x * params.separation.y;
    let dt = params.dt;

    let depth = input.depth.as_slice();
    let outflow = input.outflow.as_slice();
    let color = input.color.as_slice();
    let material = input.material.as_slice();
    let foam = input.foam.as_slice();
    let scale = delivery_scale(depth, outflow, area, dt);

    let mut out = TransportOutput {
        depth: Field::new(width, height),
        color: Field::new(width, height),
        material: Field::new(width, height),
        foam: Field::new(width, height),
    };

    out.depth
        .data
        .par_chunks_mut(width)
        .zip(out.color.data.par_chunks_mut(width))
        .zip(out.material.data.par_chunks_mut(width))
        .zip(out.foam.data.par_chunks_mut(width))
        .enumerate()
        .for_each(|(z, (((depth_row, color_row), material_row), foam_row))| {
            for x in 0..width {
                let i = z * width + x;
                let volume = depth[i].max(0.0) * area;
                let sent = outflow[i].iter().sum::<f32>() * scale[i] * dt;
                let kept = (volume - sent).max(0.0);

                // (neighbour index, lane of the neighbour's outflow pointing here)
                let neighbours = [
                    (x > 0).then(|| (i - 1, FLOW_POS_X)),
                    (x + 1 < width).then(|| (i + 1, FLOW_NEG_X)),
                    (z > 0).then(|| (i - width, FLOW_POS_Z)),
                    (z + 1 < height).then(|| (i + width, FLOW_NEG_Z)),
                ];

                let mut new_volume = kept;
                let mut mixed_color = color[i].scale(kept);
                let mut mixed_material = material[i].scale(kept);
                let mut mixed_foam = foam[i].scale(kept);
                for (n, lane) in neighbours.into_iter().flatten() {
                    let received = outflow[n][lane] * scale[n] * dt;
                    if received <= 0.0 {
                        continue;
                    }
                    new_volume += received;
                    mixed_color = mixed_color.add(color[n].scale(received));
                    mixed_material = mixed_material.add(material[n].scale(received));
                    mixed_foam = mixed_foam.add(foam[n].scale(received));
                }

                let new_depth = (new_volume / area).max(0.0);
                depth_row[x] = new_depth;
                if new_depth > DRY_DEPTH * 0.01 {
                    let inv = 1.0 / new_volume;
                    color_row[x] = mixed_color.scale(inv);
                    material_row[x] = mixed_material.scale(inv);
                    mixed_foam = mixed_foam.scale(inv);
                } else {
                    color_row[x] = color[i];
                    material_row[x] = material[i];
                    mixed_foam = foam[i];
                }
                mixed_foam[0] = (mixed_foam[0] - params.foam_clear).max(0.0);
                foam_row[x] = mixed_foam;
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dt: f32) -> TransportParams {
        TransportParams {
            dt,
            separation: Vec2::new(1.0, 1.0),
            foam_clear: 0.0,
        }
    }

    #[test]
    fn test_volume_conserved() {
        let depth = Field::from_vec(3, 1, vec![1.0, 0.5, 0.0]).unwrap();
        let flux = vec![[0.0, 2.0, 0.0, 0.0], [1.0, 0.3, 0.0, 0.0], [0.0; 4]];
        let outflow = Field::from_vec(3, 1, flux).unwrap();
        let color = Field::new(3, 1);
        let material = Field::new(3, 1);
        let foam = Field::new(3, 1);
        let out = step_transport_cpu(
            TransportInput {
                depth: &depth,
                outflow: &outflow,
                color: &color,
                material: &material,
                foam: &foam,
            },
            params(1.0),
        );
        assert!((out.depth.sum() - depth.sum()).abs() < 1e-5);
        assert!(out.depth.data.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn test_overdrawn_column_stays_non_negative() {
        // Outflow far larger than the column holds, as after a removal modifier
        let depth = Field::from_vec(2, 1, vec![0.01, 0.0]).unwrap();
        let outflow = Field::from_vec(2, 1, vec![[0.0, 50.0, 0.0, 0.0], [0.0; 4]]).unwrap();
        let blank = Field::new(2, 1);
        let out = step_transport_cpu(
            TransportInput {
                depth: &depth,
                outflow: &outflow,
                color: &blank,
                material: &blank,
                foam: &blank,
            },
            params(0.5),
        );
        assert_eq!(out.depth.get(0, 0), 0.0);
        assert!((out.depth.get(1, 0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_color_mixes_by_volume() {
        let depth = Field::from_vec(2, 1, vec![1.0, 1.0]).unwrap();
        let outflow = Field::from_vec(2, 1, vec![[0.0, 0.5, 0.0, 0.0], [0.0; 4]]).unwrap();
        let color =
            Field::from_vec(2, 1, vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]]).unwrap();
        let blank = Field::new(2, 1);
        let out = step_transport_cpu(
            TransportInput {
                depth: &depth,
                outflow: &outflow,
                color: &color,
                material: &blank,
                foam: &blank,
            },
            params(1.0),
        );
        let mixed = out.color.get(1, 0);
        assert!((mixed[0] - 1.0 / 3.0).abs() < 1e-5);
        assert!((mixed[2] - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(out.color.get(0, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_foam_cleared() {
        let depth = Field::with_value(2, 1, 1.0);
        let outflow = Field::new(2, 1);
        let foam = Field::with_value(2, 1, [0.5, 0.2, 0.0, 0.0]);
        let blank = Field::new(2, 1);
        let out = step_transport_cpu(
            TransportInput {
                depth: &depth,
                outflow: &outflow,
                color: &blank,
                material: &blank,
                foam: &foam,
            },
            TransportParams {
                foam_clear: 0.1,
                ..params(1.0)
            },
        );
        let f = out.foam.get(0, 0);
        assert!((f[0] - 0.4).abs() < 1e-6);
        assert!((f[1] - 0.2).abs() < 1e-6);
    }
}
