//! gs-core: shared foundation for the gridstep solver crates.
//!
//! Contains:
//! - grid (cell-major state grids, with an optional ghost margin)
//! - mask (per-cell boolean masks used for diagnostics)
//! - numeric (Real + float helpers)
//! - timing (opt-in accumulating timers for the solver phases)
//! - error (shared error types)

pub mod error;
pub mod grid;
pub mod mask;
pub mod numeric;
pub mod timing;

pub use error::{CoreError, CoreResult};
pub use grid::{GhostedGrid, GridDims, StateGrid};
pub use mask::CellMask;
pub use numeric::*;
