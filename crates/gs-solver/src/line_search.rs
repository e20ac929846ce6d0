//! Quartic backtracking line search.
//!
//! For each cell we minimise `f(s) = 0.5·|F(x + s·Δ)|²` along the Newton
//! direction. With `f0 = f(0)`, the Newton slope `f'(0) = -2·f0` and one trial
//! value `f1 = f(s0)`, the model
//!
//! ```text
//! f(s) = (f1 - f0 - f'(0)·s0)·(s/s0)² + f'(0)·s + f0
//! ```
//!
//! has its minimum at `s = -f'(0)·s0² / (2·(f1 - f0 - f'(0)·s0))`, which
//! becomes the next trial step for cells that failed the sufficient-decrease
//! test.

use gs_core::timing::{Timer, solver_timing};
use gs_core::{CellMask, CoreError, Real, StateGrid, half_norm_sqr};
use rayon::prelude::*;

use crate::collective::Collective;
use crate::config::NewtonConfig;
use crate::error::SolverResult;
use crate::residual::{ResidualEvaluator, ResidualMode, evaluate_into};

/// What to do with one cell after evaluating its trial step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepDecision {
    Accept,
    Backtrack(Real),
}

/// Result of one line search over the whole grid.
#[derive(Clone, Debug, Default)]
pub struct LineSearchReport {
    /// Backtracking iterations performed (each one is a full residual evaluation)
    pub iterations: usize,
    /// Cells that never satisfied the decrease test; their step is zero
    pub unresolved: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct LineSearch {
    pub max_iters: usize,
    /// Armijo coefficient
    pub alpha: Real,
    /// Additive slack so cells already at round-off level are not stuck
    pub floor: Real,
}

impl LineSearch {
    pub fn from_config(cfg: &NewtonConfig) -> Self {
        Self {
            max_iters: cfg.max_line_search_iters,
            alpha: cfg.sufficient_decrease,
            floor: cfg.line_search_floor,
        }
    }

    /// Sufficient-decrease test and quartic update for one cell.
    pub fn decide(&self, f0: Real, f1: Real, step: Real) -> StepDecision {
        if f1 <= f0 * (1.0 - self.alpha * step) + self.floor {
            return StepDecision::Accept;
        }
        if !f1.is_finite() {
            // no model to fit through an overflowed trial
            return StepDecision::Backtrack(0.5 * step);
        }
        let f_prime0 = -2.0 * f0;
        let denom = f1 - f0 - f_prime0 * step;
        if !denom.is_finite() || denom.abs() < Real::MIN_POSITIVE {
            return StepDecision::Backtrack(step);
        }
        let next = -f_prime0 * step * step / (2.0 * denom);
        if next.is_finite() {
            StepDecision::Backtrack(next.clamp(0.0, step))
        } else {
            StepDecision::Backtrack(step)
        }
    }

    /// Choose a step length per cell.
    ///
    /// `f0` holds the merit value of every cell at `state`. Cells flagged in
    /// `rejected` start (and stay) at step zero. On return `step` holds the
    /// accepted step for every cell; cells that did not satisfy the decrease
    /// test within `max_iters` get zero so the merit never grows past
    /// `f0 + floor`.
    #[allow(clippy::too_many_arguments)]
    pub fn run<E, C>(
        &self,
        state: &StateGrid,
        delta: &StateGrid,
        f0: &[Real],
        rejected: &CellMask,
        evaluator: &E,
        collective: &C,
        trial: &mut StateGrid,
        trial_residual: &mut StateGrid,
        step: &mut [Real],
    ) -> SolverResult<LineSearchReport>
    where
        E: ResidualEvaluator + ?Sized,
        C: Collective,
    {
        state.ensure_same_shape(delta, "newton correction")?;
        state.ensure_same_shape(trial, "line search trial")?;
        let num_cells = state.num_cells();
        for (what, len) in [
            ("line search merit", f0.len()),
            ("line search step", step.len()),
            ("rejected cell mask", rejected.len()),
        ] {
            if len != num_cells {
                return Err(CoreError::ShapeMismatch {
                    what,
                    expected: format!("{num_cells} cells"),
                    found: format!("{len} cells"),
                }
                .into());
            }
        }

        let timer = Timer::start();
        let mut pending: Vec<bool> = rejected.as_slice().iter().map(|r| !r).collect();
        for (s, &p) in step.iter_mut().zip(&pending) {
            *s = if p { 1.0 } else { 0.0 };
        }

        let mut report = LineSearchReport::default();
        for _ in 0..self.max_iters {
            report.iterations += 1;

            trial
                .par_cells_mut()
                .zip(state.par_cells().zip(delta.par_cells()))
                .zip(step.par_iter())
                .for_each(|((t, (x, dx)), &s)| {
                    if s > 0.0 {
                        for ((ti, xi), dxi) in t.iter_mut().zip(x).zip(dx) {
                            *ti = xi + s * dxi;
                        }
                    } else {
                        t.copy_from_slice(x);
                    }
                });

            evaluate_into(evaluator, trial, ResidualMode::Full, trial_residual)?;

            let still_pending = pending
                .par_iter_mut()
                .zip(step.par_iter_mut())
                .zip(f0.par_iter())
                .zip(trial_residual.par_cells())
                .map(|(((p, s), &f0_cell), r)| {
                    if !*p {
                        return false;
                    }
                    match self.decide(f0_cell, half_norm_sqr(r), *s) {
                        StepDecision::Accept => *p = false,
                        StepDecision::Backtrack(next) => *s = next,
                    }
                    *p
                })
                .reduce(|| false, |a, b| a || b);

            if !collective.any(still_pending) {
                break;
            }
        }

        for (s, &p) in step.iter_mut().zip(&pending) {
            if p {
                *s = 0.0;
                report.unresolved += 1;
            }
        }

        timer.record_into(&solver_timing::LINE_SEARCH);
        Ok(report)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn backtracking_never_grows_step(
            f0 in 0.0_f64..1e6,
            f1 in 0.0_f64..1e8,
            s in 1e-6_f64..1.0,
        ) {
            let ls = LineSearch { max_iters: 4, alpha: 1e-4, floor: 0.0 };
            if let StepDecision::Backtrack(next) = ls.decide(f0, f1, s) {
                prop_assert!(next >= 0.0);
                prop_assert!(next <= s);
            }
        }
    }
}
