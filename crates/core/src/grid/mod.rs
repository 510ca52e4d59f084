//! Column grid: settings, layout, channel storage and ground rasterisation

pub mod buffers;
pub mod config;
pub mod field;
pub mod geometry;
pub mod ground;

pub use buffers::{
    ChannelUpdate, ColumnState, GridBuffers, GridSnapshot, GroundTexel, OutflowTexel, FLOW_NEG_X,
    FLOW_NEG_Z, FLOW_POS_X, FLOW_POS_Z,
};
pub use config::{
    BufferPrecision, CustomDataType, FloatPrecision, GridConfigError, SimulationConfig,
    UnitPrecision,
};
pub use field::Field;
pub use geometry::{estimate_column_count, GridGeometry};
pub use ground::{
    chunk_count, chunks_in_region, ChunkCoord, DirtyChunkQueue, GroundScene, GroundSource,
    HeightField, SolidBlock, CHUNK_SIZE,
};
