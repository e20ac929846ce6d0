//! Derived per-cell fluid quantities.

use gs_core::Real;
use serde::{Deserialize, Serialize};

use crate::geometry::CellMetric;
use crate::layout::{self, VarLayout};

/// Quantities derived from one cell's primitives and metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FluidElement {
    /// Lorentz factor relative to the normal observer
    pub gamma: Real,
    pub u_con: [Real; 4],
    pub u_cov: [Real; 4],
    pub b_con: [Real; 4],
    pub b_cov: [Real; 4],
    /// `b^μ b_μ`, including the configured floor
    pub b_sqr: Real,
    pub pressure: Real,
    pub sound_speed: Real,
    /// Heat flux, zero when conduction is off
    pub q: Real,
    /// Pressure anisotropy, zero when viscosity is off
    pub delta_p: Real,
}

/// Recomputes derived quantities after the primitives change.
pub trait FluidModel: Sync {
    fn element(&self, prim: &[Real], metric: &CellMetric, layout: &VarLayout) -> FluidElement;

    fn adiabatic_index(&self) -> Real;

    /// Small positive value added to `b²`, keeping ratios finite in
    /// unmagnetized cells.
    fn b_sqr_floor(&self) -> Real;
}

/// Ideal-gas equation of state, `P = (Γ - 1)·u`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdealGas {
    pub adiabatic_index: Real,
    pub b_sqr_floor: Real,
}

impl Default for IdealGas {
    fn default() -> Self {
        Self {
            adiabatic_index: 4.0 / 3.0,
            b_sqr_floor: 1e-18,
        }
    }
}

impl FluidModel for IdealGas {
    fn element(&self, prim: &[Real], metric: &CellMetric, layout: &VarLayout) -> FluidElement {
        let g = &metric.g_cov;
        let utilde = [0.0, prim[layout::U1], prim[layout::U2], prim[layout::U3]];

        let mut q = 0.0;
        for i in 1..4 {
            for j in 1..4 {
                q += g[i][j] * utilde[i] * utilde[j];
            }
        }
        let gamma = (1.0 + q.max(0.0)).sqrt();
        let alpha = metric.lapse();

        let mut u_con = [gamma / alpha, 0.0, 0.0, 0.0];
        for i in 1..4 {
            u_con[i] = utilde[i] - gamma * alpha * metric.g_con[0][i];
        }
        let u_cov = metric.lower(&u_con);

        let b_field = [prim[layout::B1], prim[layout::B2], prim[layout::B3]];
        let mut b_con = [0.0; 4];
        b_con[0] = (1..4).map(|i| b_field[i - 1] * u_cov[i]).sum();
        for i in 1..4 {
            b_con[i] = (b_field[i - 1] + b_con[0] * u_con[i]) / u_con[0];
        }
        let b_cov = metric.lower(&b_con);
        let b_sqr = (0..4).map(|mu| b_con[mu] * b_cov[mu]).sum::<Real>() + self.b_sqr_floor;

        let rho = prim[layout::RHO];
        let u = prim[layout::U];
        let pressure = (self.adiabatic_index - 1.0) * u;
        let enthalpy = rho + self.adiabatic_index * u;
        let sound_speed = if enthalpy > 0.0 {
            (self.adiabatic_index * pressure / enthalpy).max(0.0).sqrt()
        } else {
            0.0
        };

        FluidElement {
            gamma,
            u_con,
            u_cov,
            b_con,
            b_cov,
            b_sqr,
            pressure,
            sound_speed,
            q: layout.q().map_or(0.0, |i| prim[i]),
            delta_p: layout.dp().map_or(0.0, |i| prim[i]),
        }
    }

    fn adiabatic_index(&self) -> Real {
        self.adiabatic_index
    }

    fn b_sqr_floor(&self) -> Real {
        self.b_sqr_floor
    }
}
