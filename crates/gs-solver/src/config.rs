//! Newton solver configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// Newton solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Maximum outer (Newton) iterations
    pub max_iterations: usize,
    /// Maximum backtracking iterations per Newton iteration
    pub max_line_search_iters: usize,
    /// Absolute tolerance on the global L2 norm of the full residual
    pub abs_tol: f64,
    /// Relative finite-difference perturbation for the Jacobian
    pub jacobian_epsilon: f64,
    /// Additive slack in the sufficient-decrease test
    pub line_search_floor: f64,
    /// Armijo coefficient of the sufficient-decrease test
    pub sufficient_decrease: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_line_search_iters: 8,
            abs_tol: 1e-10,
            // roughly sqrt of fp64 machine epsilon
            jacobian_epsilon: 4e-8,
            line_search_floor: 1e-30,
            sufficient_decrease: 1e-4,
        }
    }
}

impl NewtonConfig {
    /// Caller-side sanity check; the solver itself never re-validates.
    pub fn validate(&self) -> SolverResult<()> {
        let bad = |what: &str| {
            Err(SolverError::InvalidConfig {
                what: what.to_string(),
            })
        };
        if self.max_line_search_iters == 0 {
            return bad("max_line_search_iters must be at least 1");
        }
        if !(self.abs_tol.is_finite() && self.abs_tol > 0.0) {
            return bad("abs_tol must be positive and finite");
        }
        if !(self.jacobian_epsilon.is_finite() && self.jacobian_epsilon > 0.0) {
            return bad("jacobian_epsilon must be positive and finite");
        }
        if !(self.line_search_floor.is_finite() && self.line_search_floor >= 0.0) {
            return bad("line_search_floor must be non-negative and finite");
        }
        if !(self.sufficient_decrease > 0.0 && self.sufficient_decrease < 1.0) {
            return bad("sufficient_decrease must lie in (0, 1)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        NewtonConfig::default().validate().unwrap();
    }

    #[test]
    fn non_positive_tolerance_rejected() {
        let cfg = NewtonConfig {
            abs_tol: 0.0,
            ..NewtonConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("abs_tol"));
    }

    #[test]
    fn armijo_coefficient_must_be_below_one() {
        let cfg = NewtonConfig {
            sufficient_decrease: 1.0,
            ..NewtonConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
