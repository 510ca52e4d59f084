//! Versioned double buffers for every column channel group
//!
//! A [`GridBuffers`] publishes an immutable [`GridSnapshot`] behind an
//! `Arc`. Passes read the published snapshot, build replacement fields and
//! hand them back through [`GridBuffers::swap`] or
//! [`GridBuffers::swap_all`]; the new snapshot is assembled first and then
//! published in one pointer exchange. Anyone holding an older snapshot
//! (samplers, renderers) keeps a consistent view of the tick it was taken
//! on, and channels untouched by a pass are shared between versions.
//!
//! Channel groups:
//!
//! | Group | Texel | Lanes |
//! |-------|-------|-------|
//! | A | `[f32; 2]` | ground height (world Y), wet offset |
//! | B | `[f32; 4]` | outflow toward -X, +X, -Z, +Z (m³/s) |
//! | C | `f32` | fluid depth |
//! | D | `[f32; 4]` | RGBA color |
//! | E | `[f32; 4]` | emission, smoothness, metallic, viscosity |
//! | F | `[f32; 4]` | foam, custom 0-2 |

use super::config::{
    BufferPrecision, CustomDataType, FloatPrecision, GridConfigError, UnitPrecision,
};
use super::field::Field;
use crate::core_types::Texel;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ground height and wet offset of a column
pub type GroundTexel = [f32; 2];
/// Outflow of a column toward its four neighbours
pub type OutflowTexel = [f32; 4];

/// Outflow lane toward -X
pub const FLOW_NEG_X: usize = 0;
/// Outflow lane toward +X
pub const FLOW_POS_X: usize = 1;
/// Outflow lane toward -Z
pub const FLOW_NEG_Z: usize = 2;
/// Outflow lane toward +Z
pub const FLOW_POS_Z: usize = 3;

/// Replacement data for one channel group
#[derive(Debug, Clone)]
pub enum ChannelUpdate {
    /// Group A
    Ground(Field<GroundTexel>),
    /// Group B
    Outflow(Field<OutflowTexel>),
    /// Group C
    Depth(Field<f32>),
    /// Group D
    Color(Field<[f32; 4]>),
    /// Group E
    Material(Field<[f32; 4]>),
    /// Group F
    Foam(Field<[f32; 4]>),
}

impl ChannelUpdate {
    fn dimensions(&self) -> (usize, usize) {
        match self {
            Self::Ground(f) => (f.width, f.height),
            Self::Outflow(f) => (f.width, f.height),
            Self::Depth(f) => (f.width, f.height),
            Self::Color(f) | Self::Material(f) | Self::Foam(f) => (f.width, f.height),
        }
    }
}

/// Every channel of one column, copied out of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColumnState {
    pub ground: f32,
    pub wet: f32,
    pub outflow: OutflowTexel,
    pub depth: f32,
    pub color: [f32; 4],
    pub material: [f32; 4],
    pub foam: [f32; 4],
}

/// One published, immutable version of the grid
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    version: u64,
    pub ground: Arc<Field<GroundTexel>>,
    pub outflow: Arc<Field<OutflowTexel>>,
    pub depth: Arc<Field<f32>>,
    pub color: Arc<Field<[f32; 4]>>,
    pub material: Arc<Field<[f32; 4]>>,
    pub foam: Arc<Field<[f32; 4]>>,
}

impl GridSnapshot {
    /// Publish counter; increases by one per swap
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Grid width in columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.depth.width
    }

    /// Grid height in columns
    #[must_use]
    pub fn height(&self) -> usize {
        self.depth.height
    }

    /// Copy out every channel of a column
    ///
    /// Returns `None` for coordinates outside the grid.
    #[must_use]
    pub fn column(&self, x: usize, z: usize) -> Option<ColumnState> {
        if x >= self.width() || z >= self.height() {
            return None;
        }
        let [ground, wet] = self.ground.get(x, z);
        Some(ColumnState {
            ground,
            wet,
            outflow: self.outflow.get(x, z),
            depth: self.depth.get(x, z),
            color: self.color.get(x, z),
            material: self.material.get(x, z),
            foam: self.foam.get(x, z),
        })
    }

    /// Fluid volume held by the grid, given the area of one column
    #[must_use]
    pub fn total_volume(&self, column_area: f32) -> f64 {
        self.depth.sum() * f64::from(column_area)
    }
}

/// Owner of the published grid state of one simulation
#[derive(Debug)]
pub struct GridBuffers {
    width: usize,
    height: usize,
    precision: BufferPrecision,
    custom_lanes: usize,
    current: Arc<GridSnapshot>,
}

impl GridBuffers {
    /// Allocate zero-initialised channel groups
    ///
    /// # Arguments
    ///
    /// * `width` - Columns along X
    /// * `height` - Columns along Z
    /// * `precision` - Storage precision per channel group
    /// * `custom_data` - Number of custom lanes kept in group F
    ///
    /// # Errors
    ///
    /// Returns [`GridConfigError::AllocationFailed`] when the column count
    /// or the byte size of a channel group overflows.
    pub fn allocate(
        width: usize,
        height: usize,
        precision: BufferPrecision,
        custom_data: CustomDataType,
    ) -> Result<Self, GridConfigError> {
        let columns = width
            .checked_mul(height)
            .filter(|&n| n > 0)
            .and_then(|n| n.checked_mul(std::mem::size_of::<[f32; 4]>()))
            .filter(|&bytes| isize::try_from(bytes).is_ok());
        if columns.is_none() {
            return Err(GridConfigError::AllocationFailed { width, height });
        }

        let current = Arc::new(GridSnapshot {
            version: 0,
            ground: Arc::new(Field::new(width, height)),
            outflow: Arc::new(Field::new(width, height)),
            depth: Arc::new(Field::new(width, height)),
            color: Arc::new(Field::new(width, height)),
            material: Arc::new(Field::new(width, height)),
            foam: Arc::new(Field::new(width, height)),
        });
        debug!(width, height, "Allocated grid buffers");

        Ok(Self {
            width,
            height,
            precision,
            custom_lanes: custom_data.lanes(),
            current,
        })
    }

    /// Grid width in columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in columns
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Currently published snapshot, shared
    #[must_use]
    pub fn snapshot(&self) -> Arc<GridSnapshot> {
        Arc::clone(&self.current)
    }

    /// Currently published snapshot, borrowed
    #[must_use]
    pub fn current(&self) -> &GridSnapshot {
        &self.current
    }

    /// Version of the published snapshot
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.version
    }

    /// Replace one channel group and publish
    pub fn swap(&mut self, update: ChannelUpdate) {
        self.swap_all([update]);
    }

    /// Replace several channel groups and publish them as one version
    ///
    /// Updates whose dimensions do not match the grid are dropped with a
    /// warning; the remaining ones are still published.
    pub fn swap_all(&mut self, updates: impl IntoIterator<Item = ChannelUpdate>) {
        let mut next = GridSnapshot::clone(&self.current);
        let mut changed = false;

        for update in updates {
            if update.dimensions() != (self.width, self.height) {
                warn!(
                    expected = ?(self.width, self.height),
                    got = ?update.dimensions(),
                    "Dropping channel update with mismatched dimensions"
                );
                continue;
            }
            changed = true;
            match update {
                ChannelUpdate::Ground(mut f) => {
                    quantize_float(&mut f, self.precision.a);
                    next.ground = Arc::new(f);
                }
                ChannelUpdate::Outflow(mut f) => {
                    quantize_float(&mut f, self.precision.b);
                    next.outflow = Arc::new(f);
                }
                ChannelUpdate::Depth(mut f) => {
                    quantize_float(&mut f, self.precision.c);
                    next.depth = Arc::new(f);
                }
                ChannelUpdate::Color(mut f) => {
                    quantize_unit(&mut f, self.precision.d);
                    next.color = Arc::new(f);
                }
                ChannelUpdate::Material(mut f) => {
                    quantize_unit(&mut f, self.precision.e);
                    next.material = Arc::new(f);
                }
                ChannelUpdate::Foam(mut f) => {
                    let lanes = self.custom_lanes;
                    f.map_in_place(|mut v| {
                        for lane in v.iter_mut().skip(1 + lanes) {
                            *lane = 0.0;
                        }
                        v
                    });
                    quantize_unit(&mut f, self.precision.f);
                    next.foam = Arc::new(f);
                }
            }
        }

        if changed {
            next.version = self.current.version + 1;
            self.current = Arc::new(next);
        }
    }

    /// Drop every channel group
    ///
    /// Snapshots still held by readers stay valid until they are dropped.
    pub fn release(self) {
        debug!(
            width = self.width,
            height = self.height,
            version = self.current.version,
            "Released grid buffers"
        );
    }
}

fn quantize_float<T: Texel>(field: &mut Field<T>, precision: FloatPrecision) {
    if precision == FloatPrecision::Half {
        field.map_in_place(|v| v.map(round_half));
    }
}

fn quantize_unit<T: Texel>(field: &mut Field<T>, precision: UnitPrecision) {
    match precision {
        UnitPrecision::Byte => field.map_in_place(|v| v.map(round_byte)),
        UnitPrecision::Half => field.map_in_place(|v| v.map(round_half)),
        UnitPrecision::Full => {}
    }
}

/// Round to the nearest 1/255 step within [0, 1]
#[inline]
pub(crate) fn round_byte(v: f32) -> f32 {
    (v.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

/// Round to the nearest value representable with a 10-bit mantissa
#[inline]
pub(crate) fn round_half(v: f32) -> f32 {
    const HALF_MAX: f32 = 65504.0;
    if !v.is_finite() {
        return v;
    }
    let v = v.clamp(-HALF_MAX, HALF_MAX);
    let bits = v.to_bits();
    let lsb = (bits >> 13) & 1;
    f32::from_bits((bits + 0x0FFF + lsb) & 0xFFFF_E000)
}
