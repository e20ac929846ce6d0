//! One implicit step: Newton solve followed by validity projection.

use gs_core::StateGrid;
use serde::Serialize;

use crate::collective::Collective;
use crate::error::SolverResult;
use crate::linear::BatchedLinearSolver;
use crate::newton::{NewtonReport, NewtonSolver};
use crate::residual::ResidualEvaluator;

/// Post-solve repair of physically inadmissible states.
pub trait ValidityProjector {
    type Report;

    fn project(&self, state: &mut StateGrid) -> SolverResult<Self::Report>;
}

/// Leaves the state untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProjection;

impl ValidityProjector for NoProjection {
    type Report = ();

    fn project(&self, _state: &mut StateGrid) -> SolverResult<()> {
        Ok(())
    }
}

/// Everything the caller gets back besides the mutated grid.
#[derive(Clone, Debug, Serialize)]
pub struct StepOutcome<R> {
    pub newton: NewtonReport,
    pub projection: R,
}

/// Solve, then project once, whether or not Newton converged.
///
/// Deciding what to do with an exhausted solve is left to the caller.
pub fn implicit_step<L, C, E, P>(
    solver: &mut NewtonSolver<L, C>,
    evaluator: &E,
    projector: &P,
    state: &mut StateGrid,
) -> SolverResult<StepOutcome<P::Report>>
where
    L: BatchedLinearSolver,
    C: Collective,
    E: ResidualEvaluator + ?Sized,
    P: ValidityProjector,
{
    let newton = solver.solve(state, evaluator)?;
    let projection = projector.project(state)?;
    Ok(StepOutcome { newton, projection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewtonConfig;
    use crate::residual::CellResidual;
    use gs_core::{GridDims, Real};

    struct ClampBelow(Real);

    impl ValidityProjector for ClampBelow {
        type Report = usize;

        fn project(&self, state: &mut StateGrid) -> SolverResult<usize> {
            let mut touched = 0;
            for x in state.as_mut_slice() {
                if *x < self.0 {
                    *x = self.0;
                    touched += 1;
                }
            }
            Ok(touched)
        }
    }

    #[test]
    fn projection_runs_after_solve() {
        // root at -1, projector floors at 0
        let residual = CellResidual::new(|_, x: &[Real], _, r: &mut [Real]| {
            r[0] = x[0] + 1.0;
        });
        let mut state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![3.0]).unwrap();
        let mut solver = NewtonSolver::new(NewtonConfig::default());

        let outcome = implicit_step(&mut solver, &residual, &ClampBelow(0.0), &mut state).unwrap();

        assert!(outcome.newton.status.is_converged());
        assert_eq!(outcome.projection, 1);
        assert_eq!(state.cell(0)[0], 0.0);
    }

    #[test]
    fn no_projection_is_identity() {
        let mut state = StateGrid::from_cells(GridDims::new(1, 1, 1), 1, vec![-5.0]).unwrap();
        NoProjection.project(&mut state).unwrap();
        assert_eq!(state.cell(0)[0], -5.0);
    }
}
