//! Error types for floor projection.

use gs_core::CoreError;
use gs_solver::SolverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FloorError {
    #[error("Invalid floor configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Degenerate metric at radius {radius}: {what}")]
    DegenerateMetric { what: &'static str, radius: f64 },

    #[error("Geometry covers {geometry} cells but the state has {state}")]
    GeometryMismatch { geometry: usize, state: usize },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type FloorResult<T> = Result<T, FloorError>;

impl From<FloorError> for SolverError {
    fn from(e: FloorError) -> Self {
        SolverError::Projection {
            what: e.to_string(),
        }
    }
}
