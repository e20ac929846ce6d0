//! Floor and limiter parameters.

use gs_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::{FloorError, FloorResult};
use crate::profile::PowerLaw;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorConfig {
    /// Minimum rest-mass density as a function of radius
    pub rho_floor: PowerLaw,
    /// Minimum internal energy as a function of radius
    pub u_floor: PowerLaw,
    /// Largest admissible `b²/ρ`
    pub bsqr_over_rho_max: Real,
    /// Largest admissible `b²/u`
    pub bsqr_over_u_max: Real,
    pub max_lorentz_factor: Real,
    /// Scales the heat-flux bound
    pub conduction_closure_factor: Real,
    /// Scales the pressure-anisotropy bounds
    pub viscosity_closure_factor: Real,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            rho_floor: PowerLaw::new(1e-5, -1.5),
            u_floor: PowerLaw::new(1e-7, -2.5),
            bsqr_over_rho_max: 50.0,
            bsqr_over_u_max: 2500.0,
            max_lorentz_factor: 10.0,
            conduction_closure_factor: 1.0,
            viscosity_closure_factor: 1.0,
        }
    }
}

impl FloorConfig {
    pub fn validate(&self) -> FloorResult<()> {
        let invalid = |what: &str| FloorError::InvalidConfig {
            what: what.to_string(),
        };
        for (name, p) in [("rho_floor", &self.rho_floor), ("u_floor", &self.u_floor)] {
            if !(p.amplitude.is_finite() && p.amplitude >= 0.0 && p.slope.is_finite()) {
                return Err(invalid(&format!(
                    "{name} needs a finite, non-negative amplitude and a finite slope"
                )));
            }
        }
        if !(self.bsqr_over_rho_max > 0.0 && self.bsqr_over_u_max > 0.0) {
            return Err(invalid("magnetization caps must be positive"));
        }
        if !(self.max_lorentz_factor > 1.0 && self.max_lorentz_factor.is_finite()) {
            return Err(invalid("max_lorentz_factor must be finite and greater than 1"));
        }
        if !(self.conduction_closure_factor >= 0.0 && self.viscosity_closure_factor >= 0.0) {
            return Err(invalid("closure factors must be non-negative"));
        }
        Ok(())
    }

    /// Upper bound on `v²` for the normal observer.
    pub fn max_velocity_sqr(&self) -> Real {
        1.0 - 1.0 / (self.max_lorentz_factor * self.max_lorentz_factor)
    }
}
