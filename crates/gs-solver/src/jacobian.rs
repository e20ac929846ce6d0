//! Finite difference Jacobian assembly, one dense matrix per cell.

use gs_core::timing::{Timer, solver_timing};
use gs_core::{CoreError, CoreResult, Real, StateGrid, ensure_finite};
use rayon::prelude::*;

use crate::error::SolverResult;
use crate::residual::{ResidualEvaluator, ResidualMode, evaluate_into};

/// Dense `dof × dof` matrices, one per cell, each stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct CellMatrices {
    dof: usize,
    num_cells: usize,
    data: Vec<Real>,
}

impl CellMatrices {
    pub fn new(num_cells: usize, dof: usize) -> Self {
        Self {
            dof,
            num_cells,
            data: vec![0.0; num_cells * dof * dof],
        }
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Row-major matrix of one cell.
    pub fn matrix(&self, cell: usize) -> &[Real] {
        let n = self.dof * self.dof;
        &self.data[cell * n..(cell + 1) * n]
    }

    pub fn matrix_mut(&mut self, cell: usize) -> &mut [Real] {
        let n = self.dof * self.dof;
        &mut self.data[cell * n..(cell + 1) * n]
    }

    pub fn get(&self, cell: usize, row: usize, col: usize) -> Real {
        self.matrix(cell)[row * self.dof + col]
    }

    pub fn par_matrices(&self) -> rayon::slice::ChunksExact<'_, Real> {
        self.data.par_chunks_exact(self.dof * self.dof)
    }

    pub fn par_matrices_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, Real> {
        self.data.par_chunks_exact_mut(self.dof * self.dof)
    }

    /// True if these matrices pair up cell-for-cell with `grid`.
    pub fn matches(&self, grid: &StateGrid) -> bool {
        self.num_cells == grid.num_cells() && self.dof == grid.dof()
    }

    pub(crate) fn ensure_matches(&self, grid: &StateGrid) -> Result<(), CoreError> {
        if self.matches(grid) {
            Ok(())
        } else {
            Err(CoreError::ShapeMismatch {
                what: "jacobian",
                expected: grid.shape_string(),
                found: format!("{} matrices of size {}", self.num_cells, self.dof),
            })
        }
    }
}

/// One-sided finite-difference Jacobian `J[i][j] = ∂F_i/∂x_j`.
#[derive(Clone, Copy, Debug)]
pub struct JacobianAssembler {
    epsilon: Real,
}

impl JacobianAssembler {
    /// Fails unless `epsilon` is finite and positive.
    pub fn new(epsilon: Real) -> CoreResult<Self> {
        let epsilon = ensure_finite(epsilon, "jacobian epsilon")?;
        if epsilon <= 0.0 {
            return Err(CoreError::InvalidArg {
                what: "jacobian epsilon must be positive",
            });
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> Real {
        self.epsilon
    }

    /// Perturbed value of one component.
    ///
    /// Relative perturbation `(1 + ε)x`, except near zero (`|x| < ε/2`) where
    /// the component is shifted by `ε`.
    pub fn perturb(&self, x: Real) -> Real {
        if x.abs() < 0.5 * self.epsilon {
            x + self.epsilon
        } else {
            (1.0 + self.epsilon) * x
        }
    }

    /// Assemble the Jacobian of the fast residual at `state`.
    ///
    /// `base` must be the fast residual evaluated at `state` immediately
    /// before this call. `perturbed` and `perturbed_residual` are scratch
    /// grids of the same shape as `state`; their contents are overwritten.
    pub fn assemble<E: ResidualEvaluator + ?Sized>(
        &self,
        state: &StateGrid,
        base: &StateGrid,
        evaluator: &E,
        perturbed: &mut StateGrid,
        perturbed_residual: &mut StateGrid,
        jacobian: &mut CellMatrices,
    ) -> SolverResult<()> {
        state.ensure_same_shape(base, "base residual")?;
        jacobian.ensure_matches(state)?;

        let timer = Timer::start();
        let dof = state.dof();
        perturbed.copy_from(state)?;

        for col in 0..dof {
            perturbed
                .par_cells_mut()
                .zip(state.par_cells())
                .for_each(|(p, x)| p[col] = self.perturb(x[col]));

            evaluate_into(evaluator, perturbed, ResidualMode::Fast, perturbed_residual)?;

            jacobian
                .par_matrices_mut()
                .zip(perturbed_residual.par_cells())
                .zip(base.par_cells())
                .zip(perturbed.par_cells().zip(state.par_cells()))
                .for_each(|(((jac, rp), rb), (p, x))| {
                    // actual step after rounding, not the nominal one
                    let h = p[col] - x[col];
                    for row in 0..dof {
                        jac[row * dof + col] = (rp[row] - rb[row]) / h;
                    }
                });

            perturbed
                .par_cells_mut()
                .zip(state.par_cells())
                .for_each(|(p, x)| p[col] = x[col]);
        }

        timer.record_into(&solver_timing::JACOBIAN);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residual::CellResidual;
    use gs_core::GridDims;

    fn assemble_at(
        state: &StateGrid,
        evaluator: &impl ResidualEvaluator,
        epsilon: Real,
    ) -> CellMatrices {
        let assembler = JacobianAssembler::new(epsilon).unwrap();
        let mut base = state.zeros_like();
        evaluator
            .evaluate(state, ResidualMode::Fast, &mut base)
            .unwrap();
        let mut perturbed = state.zeros_like();
        let mut perturbed_residual = state.zeros_like();
        let mut jac = CellMatrices::new(state.num_cells(), state.dof());
        assembler
            .assemble(
                state,
                &base,
                evaluator,
                &mut perturbed,
                &mut perturbed_residual,
                &mut jac,
            )
            .unwrap();
        jac
    }

    #[test]
    fn unusable_epsilon_is_rejected() {
        assert!(matches!(
            JacobianAssembler::new(Real::NAN),
            Err(CoreError::NonFinite { what: "jacobian epsilon", .. })
        ));
        assert!(matches!(
            JacobianAssembler::new(0.0),
            Err(CoreError::InvalidArg { .. })
        ));
    }

    #[test]
    fn perturbation_switches_to_additive_near_zero() {
        let a = JacobianAssembler::new(1e-6).unwrap();
        assert_eq!(a.perturb(0.0), 1e-6);
        assert_eq!(a.perturb(1e-7), 1e-7 + 1e-6);
        assert_eq!(a.perturb(2.0), 2.0 * (1.0 + 1e-6));
    }

    #[test]
    fn jacobian_quadratic() {
        // f(x, y) = (x^2, x*y), J = [[2x, 0], [y, x]]
        let f = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] * x[0];
            r[1] = x[0] * x[1];
        });
        let state = StateGrid::from_cells(GridDims::new(1, 1, 1), 2, vec![3.0, -2.0]).unwrap();
        let jac = assemble_at(&state, &f, 1e-7);

        assert!((jac.get(0, 0, 0) - 6.0).abs() < 1e-5);
        assert!(jac.get(0, 0, 1).abs() < 1e-12);
        assert!((jac.get(0, 1, 0) + 2.0).abs() < 1e-5);
        assert!((jac.get(0, 1, 1) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn jacobian_uses_fast_residual() {
        // the full-only term depends on x and would change J if it were used
        let f = CellResidual::new(|_, x: &[Real], mode, r: &mut [Real]| {
            r[0] = 2.0 * x[0];
            if mode == ResidualMode::Full {
                r[0] += 5.0 * x[0];
            }
        });
        let state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![1.5]).unwrap();
        let jac = assemble_at(&state, &f, 1e-7);
        assert!((jac.get(0, 0, 0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cells_are_differentiated_independently() {
        let f = CellResidual::new(|cell, x: &[Real], _, r: &mut [Real]| {
            r[0] = (cell as Real + 1.0) * x[0] * x[0];
        });
        let state = StateGrid::from_cells(GridDims::new(3, 1, 1), 1, vec![1.0, 2.0, 0.0]).unwrap();
        let jac = assemble_at(&state, &f, 1e-8);
        assert!((jac.get(0, 0, 0) - 2.0).abs() < 1e-5);
        assert!((jac.get(1, 0, 0) - 8.0).abs() < 1e-5);
        // zero state: additive step of ε gives 3ε
        assert!(jac.get(2, 0, 0).abs() < 1e-6);
    }
}
