//! Ground height rasterisation
//!
//! The simulation learns its ground by casting rays straight down onto a
//! [`GroundSource`] once per column. A full sweep happens at activation;
//! afterwards moving solids mark 64×64 column chunks dirty and one chunk is
//! re-cast per tick from a FIFO queue.

use super::buffers::GroundTexel;
use super::config::SimulationConfig;
use super::field::Field;
use super::geometry::GridGeometry;
use crate::core_types::Vec3;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Columns per chunk edge
pub const CHUNK_SIZE: usize = 64;

/// Margin keeping raycasts off the outermost column edge
const EDGE_MARGIN: f32 = 0.01;

/// Solid geometry that ground raycasts can hit
///
/// Implemented by the host's physics scene. Casts go straight down.
pub trait GroundSource: Send + Sync {
    /// Cast down from `origin` and report the world Y of the first hit
    ///
    /// # Arguments
    ///
    /// * `origin` - World start point of the cast
    /// * `max_distance` - Length of the cast
    /// * `radius` - Sphere radius, or 0 for a thin ray
    /// * `layers` - Layer mask the hit surface must match
    ///
    /// # Returns
    ///
    /// World height of the hit, or `None` for a miss
    fn cast_down(&self, origin: &Vec3, max_distance: f32, radius: f32, layers: u32) -> Option<f32>;
}

/// Regular elevation grid acting as ground
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    /// World X of the first sample
    pub(crate) origin_x: f32,
    /// World Z of the first sample
    pub(crate) origin_z: f32,
    /// Extent along X in meters
    pub(crate) width: f32,
    /// Extent along Z in meters
    pub(crate) depth: f32,
    /// Meters between samples
    pub(crate) resolution: f32,
    /// Samples along X
    pub(crate) nx: usize,
    /// Samples along Z
    pub(crate) nz: usize,
    /// Elevations in meters (row-major order: [z * nx + x])
    pub(crate) elevations: Vec<f32>,
    /// Layer bits this surface belongs to
    pub(crate) layers: u32,
}

impl HeightField {
    /// Create flat ground at given elevation
    #[must_use]
    pub fn flat(width: f32, depth: f32, resolution: f32, elevation: f32) -> Self {
        let nx = (width / resolution).ceil() as usize + 1;
        let nz = (depth / resolution).ceil() as usize + 1;
        Self {
            origin_x: 0.0,
            origin_z: 0.0,
            width,
            depth,
            resolution,
            nx,
            nz,
            elevations: vec![elevation; nx * nz],
            layers: 1,
        }
    }

    /// Create ground with a single Gaussian hill in the middle
    #[must_use]
    pub fn single_hill(
        width: f32,
        depth: f32,
        resolution: f32,
        base_elevation: f32,
        hill_height: f32,
        hill_radius: f32,
    ) -> Self {
        let mut field = Self::flat(width, depth, resolution, base_elevation);
        let center_x = width / 2.0;
        let center_z = depth / 2.0;

        for iz in 0..field.nz {
            for ix in 0..field.nx {
                let dx = ix as f32 * resolution - center_x;
                let dz = iz as f32 * resolution - center_z;
                let dist_sq = dx * dx + dz * dz;
                field.elevations[iz * field.nx + ix] +=
                    hill_height * (-dist_sq / (hill_radius * hill_radius)).exp();
            }
        }
        field
    }

    /// Wrap an existing heightmap
    ///
    /// Returns `None` unless `heights` holds `nx * nz` samples with at
    /// least two along each axis.
    #[must_use]
    pub fn from_heightmap(
        width: f32,
        depth: f32,
        heights: Vec<f32>,
        nx: usize,
        nz: usize,
    ) -> Option<Self> {
        if nx < 2 || nz < 2 || heights.len() != nx * nz {
            return None;
        }
        Some(Self {
            origin_x: 0.0,
            origin_z: 0.0,
            width,
            depth,
            resolution: width / (nx - 1) as f32,
            nx,
            nz,
            elevations: heights,
            layers: 1,
        })
    }

    /// Move the first sample to a world XZ position
    #[must_use]
    pub fn with_origin(mut self, x: f32, z: f32) -> Self {
        self.origin_x = x;
        self.origin_z = z;
        self
    }

    /// Set the layer bits of this surface
    #[must_use]
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Query elevation at a world position using bilinear interpolation
    ///
    /// Returns `None` outside the field's footprint.
    #[must_use]
    pub fn elevation_at(&self, x: f32, z: f32) -> Option<f32> {
        let lx = x - self.origin_x;
        let lz = z - self.origin_z;
        if lx < 0.0 || lz < 0.0 || lx > self.width || lz > self.depth {
            return None;
        }

        let gx = lx / self.resolution;
        let gz = lz / self.resolution;
        let ix0 = (gx.floor() as usize).min(self.nx - 2);
        let iz0 = (gz.floor() as usize).min(self.nz - 2);
        let fx = (gx - ix0 as f32).clamp(0.0, 1.0);
        let fz = (gz - iz0 as f32).clamp(0.0, 1.0);

        let e00 = self.elevations[iz0 * self.nx + ix0];
        let e10 = self.elevations[iz0 * self.nx + ix0 + 1];
        let e01 = self.elevations[(iz0 + 1) * self.nx + ix0];
        let e11 = self.elevations[(iz0 + 1) * self.nx + ix0 + 1];

        let e0 = e00 * (1.0 - fx) + e10 * fx;
        let e1 = e01 * (1.0 - fx) + e11 * fx;
        Some(e0 * (1.0 - fz) + e1 * fz)
    }

    /// Set one elevation sample, ignoring out-of-range indices
    pub fn set_sample(&mut self, ix: usize, iz: usize, elevation: f32) {
        if ix < self.nx && iz < self.nz {
            self.elevations[iz * self.nx + ix] = elevation;
        }
    }
}

impl GroundSource for HeightField {
    fn cast_down(&self, origin: &Vec3, max_distance: f32, radius: f32, layers: u32) -> Option<f32> {
        if self.layers & layers == 0 {
            return None;
        }

        let mut hit = self.elevation_at(origin.x, origin.z);
        if radius > 0.0 {
            // Sphere casts rest on the highest point under the disc
            const RING: usize = 8;
            for ring in [0.5, 1.0] {
                for i in 0..RING {
                    let angle = i as f32 * std::f32::consts::TAU / RING as f32;
                    let x = origin.x + angle.cos() * radius * ring;
                    let z = origin.z + angle.sin() * radius * ring;
                    if let Some(h) = self.elevation_at(x, z) {
                        hit = Some(hit.map_or(h, |best| best.max(h)));
                    }
                }
            }
        }

        hit.filter(|&h| h <= origin.y && h >= origin.y - max_distance)
    }
}

/// Axis-aligned solid box resting in the scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolidBlock {
    /// World center
    pub center: Vec3,
    /// Half size along each axis
    pub half_extents: Vec3,
}

impl SolidBlock {
    /// World radius enclosing the footprint on X and Z
    #[must_use]
    pub fn footprint_radius(&self) -> f32 {
        self.half_extents.x.hypot(self.half_extents.z)
    }
}

/// Height field plus movable solid blocks
///
/// Hits report the highest surface under the cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundScene {
    pub terrain: HeightField,
    pub blocks: Vec<SolidBlock>,
}

impl GroundScene {
    /// Scene with terrain only
    #[must_use]
    pub fn new(terrain: HeightField) -> Self {
        Self {
            terrain,
            blocks: Vec::new(),
        }
    }
}

impl GroundSource for GroundScene {
    fn cast_down(&self, origin: &Vec3, max_distance: f32, radius: f32, layers: u32) -> Option<f32> {
        let terrain = self.terrain.cast_down(origin, max_distance, radius, layers);
        self.blocks
            .iter()
            .filter(|b| {
                (origin.x - b.center.x).abs() <= b.half_extents.x + radius
                    && (origin.z - b.center.z).abs() <= b.half_extents.z + radius
            })
            .map(|b| b.center.y + b.half_extents.y)
            .filter(|&top| top <= origin.y && top >= origin.y - max_distance)
            .chain(terrain)
            .reduce(f32::max)
    }
}

/// Chunk address in units of [`CHUNK_SIZE`] columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: usize,
    pub z: usize,
}

impl ChunkCoord {
    #[must_use]
    pub const fn new(x: usize, z: usize) -> Self {
        Self { x, z }
    }
}

/// Number of chunks along X and Z covering a geometry
#[must_use]
pub fn chunk_count(geometry: &GridGeometry) -> (usize, usize) {
    (
        geometry.width().div_ceil(CHUNK_SIZE),
        geometry.height().div_ceil(CHUNK_SIZE),
    )
}

/// Chunks overlapped by a world-space square around `center`
///
/// The square is mapped into column space and clipped to the grid, so a
/// region entirely off the grid yields no chunks.
#[must_use]
pub fn chunks_in_region(geometry: &GridGeometry, center: &Vec3, radius: f32) -> Vec<ChunkCoord> {
    let radius = radius.abs();
    let corners = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)].map(|(sx, sz)| {
        geometry.world_to_pixel(&(center + Vec3::new(sx * radius, 0.0, sz * radius)))
    });

    let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_z = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_z = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let last_x = (geometry.width() - 1) as f32;
    let last_z = (geometry.height() - 1) as f32;
    if max_x < 0.0 || max_z < 0.0 || min_x > last_x || min_z > last_z {
        return Vec::new();
    }

    let to_chunk = |v: f32, last: f32| (v.clamp(0.0, last).floor() as usize) / CHUNK_SIZE;
    let (x0, x1) = (to_chunk(min_x, last_x), to_chunk(max_x.ceil(), last_x));
    let (z0, z1) = (to_chunk(min_z, last_z), to_chunk(max_z.ceil(), last_z));

    (z0..=z1)
        .flat_map(|z| (x0..=x1).map(move |x| ChunkCoord::new(x, z)))
        .collect()
}

/// FIFO of chunks waiting to be re-cast, without duplicates
#[derive(Debug, Default, Clone)]
pub struct DirtyChunkQueue {
    queue: VecDeque<ChunkCoord>,
    queued: FxHashSet<ChunkCoord>,
}

impl DirtyChunkQueue {
    /// Enqueue a chunk; returns `false` if it was already waiting
    pub fn push(&mut self, chunk: ChunkCoord) -> bool {
        if self.queued.insert(chunk) {
            self.queue.push_back(chunk);
            true
        } else {
            false
        }
    }

    /// Take the oldest waiting chunk
    pub fn pop(&mut self) -> Option<ChunkCoord> {
        let chunk = self.queue.pop_front()?;
        self.queued.remove(&chunk);
        Some(chunk)
    }

    /// Forget every waiting chunk
    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Re-cast the columns of a rectangular region
///
/// # Arguments
///
/// * `field` - Ground channel to write (unpublished copy)
/// * `geometry` - Column layout
/// * `config` - Height range, cast radius, layers and table depth
/// * `source` - Scene to cast against
/// * `columns_x` - Column range along X
/// * `columns_z` - Column range along Z
pub fn rasterize_region(
    field: &mut Field<GroundTexel>,
    geometry: &GridGeometry,
    config: &SimulationConfig,
    source: &dyn GroundSource,
    columns_x: std::ops::Range<usize>,
    columns_z: std::ops::Range<usize>,
) {
    let width = field.width;
    let last_x = (geometry.width() - 1) as f32 - EDGE_MARGIN;
    let last_z = (geometry.height() - 1) as f32 - EDGE_MARGIN;
    let transform = geometry.transform();
    let distance = (config.height_max - config.height_min) * transform.vertical_scale();
    let radius = geometry.separation().x * config.height_radius;
    let z_start = columns_z.start;

    field
        .data
        .par_chunks_mut(width)
        .enumerate()
        .skip(z_start)
        .take(columns_z.len())
        .for_each(|(z, row)| {
            let pz = (z as f32).clamp(EDGE_MARGIN, last_z);
            for x in columns_x.clone() {
                let px = (x as f32).clamp(EDGE_MARGIN, last_x);
                let origin = transform
                    .transform_point(&geometry.local_column_position(px, pz, config.height_max));
                let height = source
                    .cast_down(&origin, distance, radius, config.height_layers)
                    .unwrap_or(origin.y - distance);
                row[x] = [height, -config.table_depth];
            }
        });
}

/// Re-cast one chunk
pub fn rasterize_chunk(
    field: &mut Field<GroundTexel>,
    geometry: &GridGeometry,
    config: &SimulationConfig,
    source: &dyn GroundSource,
    chunk: ChunkCoord,
) {
    let x0 = (chunk.x * CHUNK_SIZE).min(geometry.width());
    let z0 = (chunk.z * CHUNK_SIZE).min(geometry.height());
    let x1 = (x0 + CHUNK_SIZE).min(geometry.width());
    let z1 = (z0 + CHUNK_SIZE).min(geometry.height());
    rasterize_region(field, geometry, config, source, x0..x1, z0..z1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Transform;

    fn geometry(size: f32) -> (GridGeometry, SimulationConfig) {
        let config = SimulationConfig::square(size, 1.0);
        let geometry = GridGeometry::from_config(&config, Transform::identity()).unwrap();
        (geometry, config)
    }

    #[test]
    fn test_flat_field_elevation() {
        let field = HeightField::flat(10.0, 10.0, 1.0, 3.0);
        assert_eq!(field.elevation_at(5.0, 5.0), Some(3.0));
        assert_eq!(field.elevation_at(-1.0, 5.0), None);
    }

    #[test]
    fn test_cast_respects_layers_and_range() {
        let field = HeightField::flat(10.0, 10.0, 1.0, 3.0).with_layers(0b10);
        let origin = Vec3::new(5.0, 10.0, 5.0);
        assert_eq!(field.cast_down(&origin, 20.0, 0.0, 0b01), None);
        assert_eq!(field.cast_down(&origin, 20.0, 0.0, 0b10), Some(3.0));
        assert_eq!(field.cast_down(&origin, 2.0, 0.0, 0b10), None);
    }

    #[test]
    fn test_sphere_cast_finds_highest_point() {
        let mut field = HeightField::flat(10.0, 10.0, 1.0, 0.0);
        field.set_sample(6, 5, 2.0);
        let origin = Vec3::new(5.0, 10.0, 5.0);
        assert_eq!(field.cast_down(&origin, 20.0, 0.0, 1), Some(0.0));
        assert!(field.cast_down(&origin, 20.0, 1.0, 1).unwrap() > 1.5);
    }

    #[test]
    fn test_scene_block_on_top() {
        let mut scene = GroundScene::new(HeightField::flat(10.0, 10.0, 1.0, 0.0));
        scene.blocks.push(SolidBlock {
            center: Vec3::new(5.0, 1.0, 5.0),
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        });
        let origin = Vec3::new(5.5, 10.0, 5.0);
        assert_eq!(scene.cast_down(&origin, 20.0, 0.0, 1), Some(2.0));
        let origin = Vec3::new(8.0, 10.0, 5.0);
        assert_eq!(scene.cast_down(&origin, 20.0, 0.0, 1), Some(0.0));
    }

    #[test]
    fn test_rasterize_miss_uses_height_min() {
        let (geometry, config) = geometry(10.0);
        let mut field = Field::new(geometry.width(), geometry.height());
        let ground = HeightField::flat(5.0, 10.0, 1.0, 2.0);
        rasterize_region(&mut field, &geometry, &config, &ground, 0..11, 0..11);
        assert_eq!(field.get(2, 2), [2.0, -1.0]);
        assert_eq!(field.get(9, 2), [config.height_min, -1.0]);
    }

    #[test]
    fn test_dirty_queue_dedupes_in_order() {
        let mut queue = DirtyChunkQueue::default();
        assert!(queue.push(ChunkCoord::new(1, 0)));
        assert!(queue.push(ChunkCoord::new(0, 0)));
        assert!(!queue.push(ChunkCoord::new(1, 0)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(ChunkCoord::new(1, 0)));
        assert!(queue.push(ChunkCoord::new(1, 0)));
        assert_eq!(queue.pop(), Some(ChunkCoord::new(0, 0)));
        assert_eq!(queue.pop(), Some(ChunkCoord::new(1, 0)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_chunks_in_region() {
        let (geometry, _) = geometry(200.0);
        assert_eq!(chunk_count(&geometry), (4, 4));

        let chunks = chunks_in_region(&geometry, &Vec3::new(64.0, 0.0, 10.0), 2.0);
        assert_eq!(chunks, vec![ChunkCoord::new(0, 0), ChunkCoord::new(1, 0)]);

        assert!(chunks_in_region(&geometry, &Vec3::new(-50.0, 0.0, -50.0), 2.0).is_empty());
    }
}
