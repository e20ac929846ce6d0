//! Physical-validity projection ("floors") for relativistic MHD states.
//!
//! Provides:
//! - the fixed primitive-variable layout (`layout`)
//! - per-cell metric data supplied by the geometry collaborator (`geometry`)
//! - derived fluid quantities recomputed after every correction (`fluid`)
//! - radial floor profiles and limits (`profile`, `config`)
//! - the projector itself (`projector`)

pub mod config;
pub mod error;
pub mod fluid;
pub mod geometry;
pub mod layout;
pub mod profile;
pub mod projector;

pub use config::FloorConfig;
pub use error::{FloorError, FloorResult};
pub use fluid::{FluidElement, FluidModel, IdealGas};
pub use geometry::{CellMetric, Geometry, MetricField};
pub use layout::{Closures, VarLayout};
pub use profile::PowerLaw;
pub use projector::{FloorProjector, FloorReport};
