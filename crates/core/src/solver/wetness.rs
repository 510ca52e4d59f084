//! Wetness pass: ground moisture that outlives the fluid
//!
//! The wet lane of channel group A is an offset from the ground height.
//! Columns holding fluid are soaked up to ground level (offset 0); dry
//! columns drain toward `-table_depth` by the amount released from a
//! quantised counter, never stepping past it.

use super::forces::DRY_DEPTH;
use crate::grid::GroundTexel;
use rayon::prelude::*;

/// Parameters for one wetness pass
#[derive(Debug, Clone, Copy)]
pub struct WetnessParams {
    /// Offset change released this tick (meters)
    pub dry_amount: f32,
    /// Resting depth of the water table below ground
    pub table_depth: f32,
}

/// New wet offset for one column
#[inline]
#[must_use]
pub fn settle_wet_offset(wet: f32, depth: f32, params: WetnessParams) -> f32 {
    let table = -params.table_depth;
    if depth > DRY_DEPTH {
        wet.max(0.0)
    } else if wet > table {
        (wet - params.dry_amount).max(table)
    } else {
        (wet + params.dry_amount).min(table)
    }
}

/// CPU implementation of the wetness pass
///
/// # Arguments
///
/// * `ground_in` - Current ground/wet channel
/// * `depth` - Fluid depth per column
/// * `ground_out` - Ground/wet channel to write
/// * `width` - Grid width in columns
/// * `params` - Pass parameters
pub fn step_wetness_cpu(
    ground_in: &[GroundTexel],
    depth: &[f32],
    ground_out: &mut [GroundTexel],
    width: usize,
    params: WetnessParams,
) {
    ground_out
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(z, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                let i = z * width + x;
                let [ground, wet] = ground_in[i];
                *texel = [ground, settle_wet_offset(wet, depth[i], params)];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_soaks_to_ground() {
        let params = WetnessParams {
            dry_amount: 0.1,
            table_depth: 1.0,
        };
        assert_eq!(settle_wet_offset(-1.0, 0.5, params), 0.0);
        assert_eq!(settle_wet_offset(-0.5, 0.0, params), -0.6);
        assert_eq!(settle_wet_offset(-0.95, 0.0, params), -1.0);
        assert_eq!(settle_wet_offset(-3.0, 0.0, params), -2.9);
    }

    #[test]
    fn test_pass_keeps_ground() {
        let ground_in = vec![[2.0, 0.0], [3.0, 0.0]];
        let depth = vec![0.0, 1.0];
        let mut ground_out = vec![[0.0; 2]; 2];
        step_wetness_cpu(
            &ground_in,
            &depth,
            &mut ground_out,
            2,
            WetnessParams {
                dry_amount: 0.25,
                table_depth: 1.0,
            },
        );
        assert_eq!(ground_out, vec![[2.0, -0.25], [3.0, 0.0]]);
    }
}
