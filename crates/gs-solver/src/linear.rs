//! Batched dense linear solves for the Newton correction.

use gs_core::timing::{Timer, solver_timing};
use gs_core::{CellMask, Real, StateGrid};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::SolverResult;
use crate::jacobian::CellMatrices;

/// Outcome of one batched solve.
#[derive(Clone, Debug)]
pub struct LinearSolveReport {
    /// Cells whose system was singular or produced a non-finite solution.
    /// Their entry in the solution grid is zero.
    pub failed: CellMask,
}

/// Solve `A·x = b` independently for every cell.
///
/// A failure at one cell must not abort the batch; it is reported in
/// [`LinearSolveReport::failed`] instead.
pub trait BatchedLinearSolver {
    fn solve(
        &self,
        matrices: &CellMatrices,
        rhs: &StateGrid,
        solution: &mut StateGrid,
    ) -> SolverResult<LinearSolveReport>;
}

/// LU with partial pivoting per cell, cells solved in parallel.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseLuSolver;

impl DenseLuSolver {
    /// Solve one row-major system in place. Returns false on failure.
    pub fn solve_cell(a: &[Real], b: &[Real], x: &mut [Real]) -> bool {
        let n = b.len();
        let lu = DMatrix::from_row_slice(n, n, a).lu();
        match lu.solve(&DVector::from_column_slice(b)) {
            Some(sol) if sol.iter().all(|v| v.is_finite()) => {
                x.copy_from_slice(sol.as_slice());
                true
            }
            _ => false,
        }
    }
}

impl BatchedLinearSolver for DenseLuSolver {
    fn solve(
        &self,
        matrices: &CellMatrices,
        rhs: &StateGrid,
        solution: &mut StateGrid,
    ) -> SolverResult<LinearSolveReport> {
        matrices.ensure_matches(rhs)?;
        rhs.ensure_same_shape(solution, "linear solution")?;

        let timer = Timer::start();
        let failed: Vec<bool> = solution
            .par_cells_mut()
            .zip(rhs.par_cells())
            .zip(matrices.par_matrices())
            .map(|((x, b), a)| {
                let ok = Self::solve_cell(a, b, x);
                if !ok {
                    x.fill(0.0);
                }
                !ok
            })
            .collect();
        timer.record_into(&solver_timing::LINEAR_SOLVE);

        Ok(LinearSolveReport {
            failed: CellMask::from_vec(failed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::GridDims;

    #[test]
    fn solves_each_cell_with_its_own_matrix() {
        let dims = GridDims::new(2, 1, 1);
        let mut mats = CellMatrices::new(2, 2);
        mats.matrix_mut(0).copy_from_slice(&[2.0, 0.0, 0.0, 4.0]);
        // needs a row swap
        mats.matrix_mut(1).copy_from_slice(&[0.0, 1.0, 1.0, 0.0]);
        let rhs = StateGrid::from_cells(dims, 2, vec![2.0, 8.0, 3.0, 5.0]).unwrap();
        let mut x = rhs.zeros_like();

        let report = DenseLuSolver.solve(&mats, &rhs, &mut x).unwrap();

        assert!(!report.failed.any());
        assert_eq!(x.cell(0), &[1.0, 2.0]);
        assert_eq!(x.cell(1), &[5.0, 3.0]);
    }

    #[test]
    fn singular_cell_is_flagged_not_fatal() {
        let dims = GridDims::new(2, 1, 1);
        let mut mats = CellMatrices::new(2, 2);
        mats.matrix_mut(0).copy_from_slice(&[1.0, 2.0, 2.0, 4.0]);
        mats.matrix_mut(1).copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
        let rhs = StateGrid::from_cells(dims, 2, vec![1.0, 1.0, 7.0, -7.0]).unwrap();
        let mut x = rhs.zeros_like();

        let report = DenseLuSolver.solve(&mats, &rhs, &mut x).unwrap();

        assert_eq!(report.failed.as_slice(), &[true, false]);
        assert_eq!(x.cell(0), &[0.0, 0.0]);
        assert_eq!(x.cell(1), &[7.0, -7.0]);
    }

    #[test]
    fn non_finite_matrix_is_flagged() {
        let mut mats = CellMatrices::new(1, 1);
        mats.matrix_mut(0)[0] = Real::NAN;
        let rhs = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![1.0]).unwrap();
        let mut x = rhs.zeros_like();
        let report = DenseLuSolver.solve(&mats, &rhs, &mut x).unwrap();
        assert!(report.failed.get(0));
    }

    #[test]
    fn mismatched_batch_is_an_error() {
        let mats = CellMatrices::new(3, 2);
        let rhs = StateGrid::new(GridDims::new(2, 1, 1), 2).unwrap();
        let mut x = rhs.zeros_like();
        assert!(DenseLuSolver.solve(&mats, &rhs, &mut x).is_err());
    }
}
