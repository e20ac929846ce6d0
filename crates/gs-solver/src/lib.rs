//! Batched implicit nonlinear solver for grids of independent cells.
//!
//! Every cell carries a small nonlinear system `F(x) = 0` supplied by a
//! [`ResidualEvaluator`]. One Newton iteration evaluates the residual, builds
//! a per-cell Jacobian by finite differences, solves the per-cell linear
//! systems in a batch and then picks a per-cell step length with a quartic
//! backtracking line search. Cells never talk to each other; the only global
//! quantities are the residual norm and the "still backtracking" flag, both
//! routed through [`Collective`].

pub mod collective;
pub mod config;
pub mod error;
pub mod jacobian;
pub mod line_search;
pub mod linear;
pub mod newton;
pub mod residual;
pub mod step;

pub use collective::{Collective, SingleProcess};
pub use config::NewtonConfig;
pub use error::{SolverError, SolverResult};
pub use jacobian::{CellMatrices, JacobianAssembler};
pub use line_search::{LineSearch, LineSearchReport, StepDecision};
pub use linear::{BatchedLinearSolver, DenseLuSolver, LinearSolveReport};
pub use newton::{NewtonReport, NewtonSolver, NewtonStatus};
pub use residual::{CellResidual, ResidualEvaluator, ResidualMode};
pub use step::{NoProjection, StepOutcome, ValidityProjector, implicit_step};
