//! Column solver passes
//!
//! Each pass is a free function over flat channel slices that writes a
//! fresh output, parallelised over rows with rayon. The simulation wraps
//! them: it reads the published snapshot, runs a pass and swaps the
//! result in.
//!
//! Pass order within a tick:
//! 1. [`step_forces_cpu`] updates the outflow from surface slopes
//! 2. modifiers edit the grid
//! 3. [`step_transport_cpu`] moves depth, color, material and foam
//! 4. [`step_wetness_cpu`] updates ground moisture

pub mod forces;
pub mod profiler;
pub mod quantize;
pub mod transport;
pub mod wetness;

pub use forces::{column_velocity, step_forces_cpu, ForceParams, DRY_DEPTH, VISCOSITY_RATE};
pub use profiler::PassTimer;
pub use quantize::{dampen_factor, PixelCounter};
pub use transport::{step_transport_cpu, TransportInput, TransportOutput, TransportParams};
pub use wetness::{settle_wet_offset, step_wetness_cpu, WetnessParams};
