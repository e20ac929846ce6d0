//! Residual callback contract.

use gs_core::timing::{Timer, solver_timing};
use gs_core::{Real, StateGrid};
use rayon::prelude::*;

use crate::error::SolverResult;

/// Which terms the residual should include.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResidualMode {
    /// Every term, including previous-time-level and explicit source terms.
    /// Used for the convergence test and the line search.
    Full,
    /// Drops terms that do not depend on the unknowns. Used for the
    /// `dof` extra evaluations of Jacobian assembly.
    Fast,
}

/// Residual `F(state)` for every cell of a grid.
///
/// Implementations must be deterministic and write one residual vector per
/// cell into `residual`, which always has the same shape as `state`.
pub trait ResidualEvaluator {
    fn evaluate(
        &self,
        state: &StateGrid,
        mode: ResidualMode,
        residual: &mut StateGrid,
    ) -> SolverResult<()>;
}

impl<T: ResidualEvaluator + ?Sized> ResidualEvaluator for &T {
    fn evaluate(
        &self,
        state: &StateGrid,
        mode: ResidualMode,
        residual: &mut StateGrid,
    ) -> SolverResult<()> {
        (**self).evaluate(state, mode, residual)
    }
}

/// Residual built from a per-cell closure `f(cell, state, mode, residual)`.
///
/// Cells are evaluated in parallel.
pub struct CellResidual<F> {
    f: F,
}

impl<F> CellResidual<F>
where
    F: Fn(usize, &[Real], ResidualMode, &mut [Real]) + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ResidualEvaluator for CellResidual<F>
where
    F: Fn(usize, &[Real], ResidualMode, &mut [Real]) + Sync,
{
    fn evaluate(
        &self,
        state: &StateGrid,
        mode: ResidualMode,
        residual: &mut StateGrid,
    ) -> SolverResult<()> {
        state.ensure_same_shape(residual, "residual")?;
        residual
            .par_cells_mut()
            .zip(state.par_cells())
            .enumerate()
            .for_each(|(cell, (r, x))| (self.f)(cell, x, mode, r));
        Ok(())
    }
}

/// Shape-checked, timed residual evaluation used by the solver internals.
pub(crate) fn evaluate_into<E: ResidualEvaluator + ?Sized>(
    evaluator: &E,
    state: &StateGrid,
    mode: ResidualMode,
    residual: &mut StateGrid,
) -> SolverResult<()> {
    state.ensure_same_shape(residual, "residual")?;
    let timer = Timer::start();
    evaluator.evaluate(state, mode, residual)?;
    timer.record_into(&solver_timing::RESIDUAL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::GridDims;

    #[test]
    fn cell_residual_sees_cell_index_and_mode() {
        let residual = CellResidual::new(|cell, x: &[Real], mode, r: &mut [Real]| {
            let extra = if mode == ResidualMode::Full { 1000.0 } else { 0.0 };
            r[0] = x[0] + cell as Real + extra;
        });
        let state = StateGrid::from_cells(GridDims::new(3, 1, 1), 1, vec![1.0, 2.0, 3.0]).unwrap();
        let mut out = state.zeros_like();

        residual.evaluate(&state, ResidualMode::Fast, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 3.0, 5.0]);

        residual.evaluate(&state, ResidualMode::Full, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1001.0, 1003.0, 1005.0]);
    }

    #[test]
    fn mismatched_output_grid_is_rejected() {
        let residual = CellResidual::new(|_, _: &[Real], _, _: &mut [Real]| {});
        let state = StateGrid::new(GridDims::new(2, 1, 1), 2).unwrap();
        let mut out = StateGrid::new(GridDims::new(2, 1, 1), 3).unwrap();
        assert!(residual.evaluate(&state, ResidualMode::Full, &mut out).is_err());
    }
}
