//! Error types for solver operations.

use gs_core::CoreError;
use thiserror::Error;

/// Errors that can escape an implicit solve.
///
/// Numerical trouble inside a cell (singular Jacobian, failed line search,
/// non-convergence) is reported through [`crate::NewtonReport`], not here.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Residual evaluation failed: {what}")]
    Residual { what: String },

    #[error("Validity projection failed: {what}")]
    Projection { what: String },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type SolverResult<T> = Result<T, SolverError>;
