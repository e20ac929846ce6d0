//! Newton driver over a grid of independent cells.

use gs_core::{Real, StateGrid, half_norm_sqr};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collective::{Collective, SingleProcess};
use crate::config::NewtonConfig;
use crate::error::SolverResult;
use crate::jacobian::{CellMatrices, JacobianAssembler};
use crate::line_search::LineSearch;
use crate::linear::{BatchedLinearSolver, DenseLuSolver};
use crate::residual::{ResidualEvaluator, ResidualMode, evaluate_into};

/// Terminal state of one solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NewtonStatus {
    /// Global residual norm dropped below tolerance after `iterations` updates.
    Converged { iterations: usize },
    /// Iteration cap reached; the state holds the best available iterate.
    Exhausted { iterations: usize },
}

impl NewtonStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, NewtonStatus::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match *self {
            NewtonStatus::Converged { iterations } | NewtonStatus::Exhausted { iterations } => {
                iterations
            }
        }
    }
}

/// Newton iteration result.
#[derive(Clone, Debug, Serialize)]
pub struct NewtonReport {
    pub status: NewtonStatus,
    /// Final global L2 norm of the full residual
    pub residual_norm: Real,
    /// Residual norm at the start of every iteration, plus the final one
    pub norm_history: Vec<Real>,
    /// Line-search iterations summed over all Newton iterations
    pub line_search_iterations: usize,
    /// Cell solves that failed (singular or non-finite), summed over iterations
    pub linear_failures: usize,
    /// Cells left at step zero by the line search, summed over iterations
    pub rejected_steps: usize,
}

/// Solver-private scratch, reused between calls on grids of the same shape.
struct NewtonWorkspace {
    residual: StateGrid,
    fast_residual: StateGrid,
    perturbed: StateGrid,
    perturbed_residual: StateGrid,
    rhs: StateGrid,
    delta: StateGrid,
    trial: StateGrid,
    jacobian: CellMatrices,
    f0: Vec<Real>,
    step: Vec<Real>,
}

impl NewtonWorkspace {
    fn for_state(state: &StateGrid) -> Self {
        Self {
            residual: state.zeros_like(),
            fast_residual: state.zeros_like(),
            perturbed: state.zeros_like(),
            perturbed_residual: state.zeros_like(),
            rhs: state.zeros_like(),
            delta: state.zeros_like(),
            trial: state.zeros_like(),
            jacobian: CellMatrices::new(state.num_cells(), state.dof()),
            f0: vec![0.0; state.num_cells()],
            step: vec![0.0; state.num_cells()],
        }
    }

    fn matches(&self, state: &StateGrid) -> bool {
        self.residual.dims() == state.dims() && self.residual.dof() == state.dof()
    }
}

/// Newton solver with finite-difference Jacobian and quartic line search.
pub struct NewtonSolver<L = DenseLuSolver, C = SingleProcess> {
    config: NewtonConfig,
    linear: L,
    collective: C,
    workspace: Option<NewtonWorkspace>,
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig) -> Self {
        Self::with_parts(config, DenseLuSolver, SingleProcess)
    }
}

impl<L: BatchedLinearSolver, C: Collective> NewtonSolver<L, C> {
    pub fn with_parts(config: NewtonConfig, linear: L, collective: C) -> Self {
        Self {
            config,
            linear,
            collective,
            workspace: None,
        }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Drive `state` towards `F(state) = 0`, in place.
    ///
    /// Running out of iterations is not an error: the report carries
    /// [`NewtonStatus::Exhausted`] and `state` holds the last iterate.
    pub fn solve<E: ResidualEvaluator + ?Sized>(
        &mut self,
        state: &mut StateGrid,
        evaluator: &E,
    ) -> SolverResult<NewtonReport> {
        let mut ws = match self.workspace.take() {
            Some(ws) if ws.matches(state) => ws,
            _ => NewtonWorkspace::for_state(state),
        };
        let result = self.iterate(&mut ws, state, evaluator);
        self.workspace = Some(ws);
        result
    }

    fn iterate<E: ResidualEvaluator + ?Sized>(
        &self,
        ws: &mut NewtonWorkspace,
        state: &mut StateGrid,
        evaluator: &E,
    ) -> SolverResult<NewtonReport> {
        let cfg = &self.config;
        let assembler = JacobianAssembler::new(cfg.jacobian_epsilon)?;
        let line_search = LineSearch::from_config(cfg);

        let mut norm_history = Vec::with_capacity(cfg.max_iterations + 1);
        let mut line_search_iterations = 0;
        let mut linear_failures = 0;
        let mut rejected_steps = 0;

        for iter in 0..=cfg.max_iterations {
            // Full residual: convergence test and line-search baseline
            evaluate_into(evaluator, state, ResidualMode::Full, &mut ws.residual)?;
            let norm = self.collective.sum(ws.residual.l2_norm_sqr()).sqrt();
            norm_history.push(norm);
            debug!(iteration = iter, residual_norm = norm, "newton iteration");

            if norm < cfg.abs_tol {
                info!(iterations = iter, residual_norm = norm, "newton converged");
                return Ok(NewtonReport {
                    status: NewtonStatus::Converged { iterations: iter },
                    residual_norm: norm,
                    norm_history,
                    line_search_iterations,
                    linear_failures,
                    rejected_steps,
                });
            }
            if iter == cfg.max_iterations {
                break;
            }

            ws.rhs
                .par_cells_mut()
                .zip(ws.residual.par_cells())
                .zip(ws.f0.par_iter_mut())
                .for_each(|((b, r), f0)| {
                    for (bi, ri) in b.iter_mut().zip(r) {
                        *bi = -ri;
                    }
                    *f0 = half_norm_sqr(r);
                });

            // Fast residual: base point of the Jacobian
            evaluate_into(evaluator, state, ResidualMode::Fast, &mut ws.fast_residual)?;
            assembler.assemble(
                state,
                &ws.fast_residual,
                evaluator,
                &mut ws.perturbed,
                &mut ws.perturbed_residual,
                &mut ws.jacobian,
            )?;

            let linear = self.linear.solve(&ws.jacobian, &ws.rhs, &mut ws.delta)?;
            let failed = linear.failed.count();
            if failed > 0 {
                warn!(iteration = iter, cells = failed, "per-cell linear solve failed");
            }
            linear_failures += failed;

            let search = line_search.run(
                state,
                &ws.delta,
                &ws.f0,
                &linear.failed,
                evaluator,
                &self.collective,
                &mut ws.trial,
                &mut ws.residual,
                &mut ws.step,
            )?;
            line_search_iterations += search.iterations;
            rejected_steps += search.unresolved;
            debug!(
                iteration = iter,
                line_search_iterations = search.iterations,
                unresolved = search.unresolved,
                "line search done"
            );

            state
                .par_cells_mut()
                .zip(ws.delta.par_cells())
                .zip(ws.step.par_iter())
                .for_each(|((x, dx), &s)| {
                    if s > 0.0 {
                        for (xi, dxi) in x.iter_mut().zip(dx) {
                            *xi += s * dxi;
                        }
                    }
                });
        }

        let residual_norm = norm_history.last().copied().unwrap_or(Real::NAN);
        info!(
            iterations = cfg.max_iterations,
            residual_norm, "newton exhausted iteration budget"
        );
        Ok(NewtonReport {
            status: NewtonStatus::Exhausted {
                iterations: cfg.max_iterations,
            },
            residual_norm,
            norm_history,
            line_search_iterations,
            linear_failures,
            rejected_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::residual::CellResidual;
    use gs_core::GridDims;

    #[test]
    fn simple_quadratic() {
        // Solve x^2 - 4 = 0 from x = 3
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] * x[0] - 4.0;
        });
        let mut state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![3.0]).unwrap();
        let mut solver = NewtonSolver::new(NewtonConfig::default());

        let report = solver.solve(&mut state, &residual).unwrap();

        assert!(report.status.is_converged());
        assert!((state.cell(0)[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn already_converged_guess_takes_no_iterations() {
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] - 1.0;
        });
        let mut state = StateGrid::from_cells(GridDims::new(2, 1, 1), 1, vec![1.0, 1.0]).unwrap();
        let report = NewtonSolver::new(NewtonConfig::default())
            .solve(&mut state, &residual)
            .unwrap();
        assert_eq!(report.status, NewtonStatus::Converged { iterations: 0 });
        assert_eq!(report.norm_history.len(), 1);
    }

    #[test]
    fn exhaustion_is_reported_not_raised() {
        // x^2 + 1 has no real root
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] * x[0] + 1.0;
        });
        let mut state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![0.5]).unwrap();
        let cfg = NewtonConfig {
            max_iterations: 5,
            ..NewtonConfig::default()
        };
        let report = NewtonSolver::new(cfg).solve(&mut state, &residual).unwrap();

        assert_eq!(report.status, NewtonStatus::Exhausted { iterations: 5 });
        assert_eq!(report.norm_history.len(), 6);
        assert!(state.all_finite());
        // merit never increases across accepted steps
        for w in report.norm_history.windows(2) {
            assert!(w[1] <= w[0] + 1e-12);
        }
    }

    #[test]
    fn unusable_jacobian_epsilon_fails_before_touching_state() {
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] - 1.0;
        });
        let mut state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![3.0]).unwrap();
        let cfg = NewtonConfig {
            jacobian_epsilon: Real::NAN,
            ..NewtonConfig::default()
        };

        let result = NewtonSolver::new(cfg).solve(&mut state, &residual);

        assert!(matches!(result, Err(SolverError::Core(_))));
        assert_eq!(state.cell(0)[0], 3.0);
    }

    #[test]
    fn workspace_follows_grid_shape() {
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            for (ri, xi) in r.iter_mut().zip(x) {
                *ri = xi - 2.0;
            }
        });
        let mut solver = NewtonSolver::new(NewtonConfig::default());

        let mut small = StateGrid::new(GridDims::new(1, 1, 1), 1).unwrap();
        solver.solve(&mut small, &residual).unwrap();
        let mut large = StateGrid::new(GridDims::new(4, 2, 1), 3).unwrap();
        let report = solver.solve(&mut large, &residual).unwrap();

        assert!(report.status.is_converged());
        assert!(large.as_slice().iter().all(|x| (x - 2.0).abs() < 1e-9));
    }
}
