//! Validity projection applied after every implicit step.
//!
//! Per cell, in order:
//! 1. radial floors on `ρ` and `u`
//! 2. magnetization caps `b²/ρ` and `b²/u`
//! 3. for floored cells, blend the velocity towards the drift frame of the
//!    field so the injected mass does not carry spurious momentum
//! 4. Lorentz-factor cap
//! 5. closure bounds on heat flux and pressure anisotropy
//!
//! Derived quantities are recomputed between steps.

use gs_core::timing::{Timer, solver_timing};
use gs_core::{CellMask, Real, StateGrid, clamp_finite};
use gs_solver::{SolverResult, ValidityProjector};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::FloorConfig;
use crate::error::{FloorError, FloorResult};
use crate::fluid::{FluidElement, FluidModel};
use crate::geometry::{CellMetric, Geometry};
use crate::layout::{self, VarLayout};

/// Relative slack on the cap comparisons; values set exactly to a cap must
/// not trip it again on the next pass.
const CAP_SLACK: Real = 1e-12;

/// Lower bound on the drift-frame `v²`.
const MIN_VELOCITY_SQR: Real = 1e-13;

/// Bound safety factor for both closures.
const CLOSURE_MARGIN: Real = 1.07;

/// What the projector did, per cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FloorReport {
    /// A density or internal-energy floor, or a magnetization cap, was applied
    pub use_floor: CellMask,
    /// Velocity was rescaled to the Lorentz cap
    pub lorentz_capped: CellMask,
    /// Cells whose heat flux or anisotropy was limited
    pub closure_limited: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct CellOutcome {
    floored: bool,
    capped: bool,
    limited: bool,
}

pub struct FloorProjector<'g, G: Geometry, M: FluidModel> {
    config: FloorConfig,
    layout: VarLayout,
    geometry: &'g G,
    fluid: M,
}

impl<'g, G: Geometry, M: FluidModel> FloorProjector<'g, G, M> {
    pub fn new(
        config: FloorConfig,
        layout: VarLayout,
        geometry: &'g G,
        fluid: M,
    ) -> FloorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            layout,
            geometry,
            fluid,
        })
    }

    pub fn config(&self) -> &FloorConfig {
        &self.config
    }

    pub fn layout(&self) -> &VarLayout {
        &self.layout
    }

    pub fn fluid(&self) -> &M {
        &self.fluid
    }

    /// Project every cell of `state` in place.
    pub fn apply(&self, state: &mut StateGrid) -> FloorResult<FloorReport> {
        if state.dof() != self.layout.dof() {
            return Err(gs_core::CoreError::ShapeMismatch {
                what: "floor state components",
                expected: self.layout.dof().to_string(),
                found: state.dof().to_string(),
            }
            .into());
        }
        if self.geometry.num_cells() != state.num_cells() {
            return Err(FloorError::GeometryMismatch {
                geometry: self.geometry.num_cells(),
                state: state.num_cells(),
            });
        }

        let timer = Timer::start();
        let outcomes: Vec<CellOutcome> = state
            .par_cells_mut()
            .enumerate()
            .map(|(cell, prim)| self.project_cell(prim, &self.geometry.metric(cell)))
            .collect();

        let report = FloorReport {
            use_floor: CellMask::from_vec(outcomes.iter().map(|o| o.floored).collect()),
            lorentz_capped: CellMask::from_vec(outcomes.iter().map(|o| o.capped).collect()),
            closure_limited: outcomes.iter().filter(|o| o.limited).count(),
        };
        timer.record_into(&solver_timing::FLOOR);

        debug!(
            floored = report.use_floor.count(),
            lorentz_capped = report.lorentz_capped.count(),
            closure_limited = report.closure_limited,
            "floors applied"
        );
        Ok(report)
    }

    fn element(&self, prim: &[Real], metric: &CellMetric) -> FluidElement {
        self.fluid.element(prim, metric, &self.layout)
    }

    /// Project a single cell. `prim` must follow this projector's layout.
    fn project_cell(&self, prim: &mut [Real], metric: &CellMetric) -> CellOutcome {
        let cfg = &self.config;
        let mut outcome = CellOutcome::default();
        let rho_pre = prim[layout::RHO];
        let u_pre = prim[layout::U];

        // NaN compares false, so it is floored too
        let rho_min = cfg.rho_floor.eval(metric.radius);
        if !(prim[layout::RHO] >= rho_min) {
            prim[layout::RHO] = rho_min;
            outcome.floored = true;
        }
        let u_min = cfg.u_floor.eval(metric.radius);
        if !(prim[layout::U] >= u_min) {
            prim[layout::U] = u_min;
            outcome.floored = true;
        }

        let elem = self.element(prim, metric);
        if elem.b_sqr > cfg.bsqr_over_rho_max * prim[layout::RHO] * (1.0 + CAP_SLACK) {
            prim[layout::RHO] = elem.b_sqr / cfg.bsqr_over_rho_max;
            outcome.floored = true;
        }
        if elem.b_sqr > cfg.bsqr_over_u_max * prim[layout::U] * (1.0 + CAP_SLACK) {
            prim[layout::U] = elem.b_sqr / cfg.bsqr_over_u_max;
            outcome.floored = true;
        }

        if outcome.floored {
            self.drift_frame_velocity(prim, metric, &elem, rho_pre, u_pre);
        }

        let elem = self.element(prim, metric);
        let gamma_max = cfg.max_lorentz_factor;
        if elem.gamma > gamma_max * (1.0 + CAP_SLACK) {
            let excess = (elem.gamma * elem.gamma - 1.0) / (gamma_max * gamma_max - 1.0);
            let factor = 1.0 / excess.max(1.0).sqrt();
            for i in [layout::U1, layout::U2, layout::U3] {
                prim[i] *= factor;
            }
            outcome.capped = true;
        }

        if self.layout.has_closures() {
            let elem = self.element(prim, metric);
            outcome.limited = self.limit_closures(prim, &elem);
        }
        outcome
    }

    /// Blend the spatial velocity of a floored cell towards the frame
    /// drifting with the field lines while conserving `Q·B`.
    ///
    /// `elem` holds the derived quantities before the blend; `rho_pre` and
    /// `u_pre` the values before any floor was applied.
    fn drift_frame_velocity(
        &self,
        prim: &mut [Real],
        metric: &CellMetric,
        elem: &FluidElement,
        rho_pre: Real,
        u_pre: Real,
    ) {
        let rho = prim[layout::RHO];
        let u = prim[layout::U];
        let b_sqr = elem.b_sqr;

        let trans = clamp_finite((b_sqr - 0.1 * rho) / rho, 0.0, 1.0);
        if trans <= 0.0 {
            return;
        }

        let v_sqr_max = self.config.max_velocity_sqr();
        let u_con = &elem.u_con;
        let b_con = &elem.b_con;

        // drift frame: remove the component of u along b
        let beta_par = -b_con[0] / (b_sqr * u_con[0]);
        let beta_sqr = (beta_par * beta_par * b_sqr).min(v_sqr_max);
        let gamma_drift = 1.0 / (1.0 - beta_sqr).sqrt();
        let mut u_drift = [0.0; 4];
        for mu in 0..4 {
            u_drift[mu] = gamma_drift * (u_con[mu] + beta_par * b_con[mu]);
        }
        if !(u_drift[0] > 0.0) {
            return;
        }

        let field = [0.0, prim[layout::B1], prim[layout::B2], prim[layout::B3]];
        let field_cov = metric.lower(&field);
        let u_dot_field: Real = (0..4).map(|mu| field_cov[mu] * u_con[mu]).sum();
        let field_sqr: Real = (0..4).map(|mu| field_cov[mu] * field[mu]).sum();
        let field_norm = field_sqr
            .max(0.0)
            .sqrt()
            .max(self.fluid.b_sqr_floor().sqrt());

        let gam = self.fluid.adiabatic_index();
        let w_old = rho_pre + gam * u_pre;
        let q_dot_b = u_dot_field * w_old * u_con[0];
        let w_new = rho + gam * u;

        // parallel velocity that keeps Q·B with the new enthalpy
        let x = 2.0 * q_dot_b / (field_norm * w_new * u_drift[0]);
        let v_par = x / (u_drift[0] * (1.0 + (1.0 + x * x).sqrt()));

        let mut v_con = [1.0, 0.0, 0.0, 0.0];
        for i in 1..4 {
            v_con[i] = v_par * field[i] / field_norm + u_drift[i] / u_drift[0];
        }
        let v_cov = metric.lower(&v_con);
        let v_norm: Real = (0..4).map(|mu| v_cov[mu] * v_con[mu]).sum();

        let g_con00 = metric.g_con[0][0];
        let v_sqr_eff = clamp_finite(1.0 - v_norm * g_con00, MIN_VELOCITY_SQR, v_sqr_max);
        let v_norm = (1.0 - v_sqr_eff) / g_con00;

        let ut = (-1.0 / v_norm).sqrt();
        let mut target = [0.0; 3];
        for (i, t) in target.iter_mut().enumerate() {
            let mu = i + 1;
            *t = ut * (v_con[mu] - metric.g_con[0][mu] / g_con00);
        }
        if !target.iter().all(|t| t.is_finite()) {
            return;
        }

        for (idx, t) in [layout::U1, layout::U2, layout::U3].into_iter().zip(target) {
            prim[idx] = prim[idx] * (1.0 - trans) + trans * t;
        }
    }

    /// Returns true if either closure variable was scaled back.
    fn limit_closures(&self, prim: &mut [Real], elem: &FluidElement) -> bool {
        let cfg = &self.config;
        let mut limited = false;

        if let Some(iq) = self.layout.q() {
            let cs = elem.sound_speed;
            let q_max =
                CLOSURE_MARGIN * cfg.conduction_closure_factor * prim[layout::RHO] * cs * cs * cs;
            let ratio = prim[iq].abs() / q_max;
            if ratio.is_finite() && ratio > 1.0 {
                prim[iq] /= ratio;
                limited = true;
            }
        }

        if let Some(idp) = self.layout.dp() {
            let k = cfg.viscosity_closure_factor;
            let p = elem.pressure;
            let dp = prim[idp];
            let b_floor = self.fluid.b_sqr_floor();

            let dp_mod = (p - 2.0 / 3.0 * dp).max(0.01 * b_floor) / (p + dp / 3.0).max(b_floor);
            let upper = (CLOSURE_MARGIN * k * elem.b_sqr * 0.5 * dp_mod).min(1.49 * p);
            let lower = (-CLOSURE_MARGIN * k * elem.b_sqr).max(-2.99 * p);
            let ratio = if dp > 0.0 { dp / upper } else { dp / lower };
            if ratio.is_finite() && ratio > 1.0 {
                prim[idp] /= ratio;
                limited = true;
            }
        }
        limited
    }
}

impl<G: Geometry, M: FluidModel> ValidityProjector for FloorProjector<'_, G, M> {
    type Report = FloorReport;

    fn project(&self, state: &mut StateGrid) -> SolverResult<FloorReport> {
        Ok(self.apply(state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluid::IdealGas;
    use crate::geometry::MetricField;
    use crate::layout::Closures;
    use gs_core::GridDims;

    fn flat(radii: &[Real]) -> MetricField {
        MetricField::new(radii.iter().map(|&r| CellMetric::minkowski(r)).collect())
    }

    fn default_projector(geometry: &MetricField) -> FloorProjector<'_, MetricField, IdealGas> {
        let layout = VarLayout::ideal();
        FloorProjector::new(FloorConfig::default(), layout, geometry, IdealGas::default()).unwrap()
    }

    fn grid(cells: Vec<Vec<Real>>) -> StateGrid {
        let dof = cells[0].len();
        let n = cells.len();
        StateGrid::from_cells(GridDims::new(n, 1, 1), dof, cells.concat()).unwrap()
    }

    #[test]
    fn low_density_is_raised_to_floor() {
        let radii = [2.0, 2.0];
        let geometry = flat(&radii);
        let projector = default_projector(&geometry);
        let rho_min = projector.config().rho_floor.eval(2.0);
        let mut state = grid(vec![
            vec![rho_min * 0.01, 1e-2, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 1e-2, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);

        let report = projector.apply(&mut state).unwrap();

        assert_eq!(state.cell(0)[layout::RHO], rho_min);
        assert!(report.use_floor.get(0));
        assert!(!report.use_floor.get(1));
        // unmagnetized: velocity untouched
        assert_eq!(state.cell(0)[layout::U1], 0.1);
        assert_eq!(state.cell(1), &[1.0, 1e-2, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn nan_density_is_floored() {
        let geometry = flat(&[1.0]);
        let projector = default_projector(&geometry);
        let mut state = grid(vec![vec![Real::NAN, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]]);
        projector.apply(&mut state).unwrap();
        assert!(state.all_finite());
    }

    #[test]
    fn magnetization_cap_raises_density() {
        let geometry = flat(&[1.0]);
        let gas = IdealGas {
            b_sqr_floor: 0.0,
            ..IdealGas::default()
        };
        let projector =
            FloorProjector::new(FloorConfig::default(), VarLayout::ideal(), &geometry, gas)
                .unwrap();
        // fluid at rest, b² = 1
        let mut state = grid(vec![vec![1e-3, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]]);

        let report = projector.apply(&mut state).unwrap();

        assert!(report.use_floor.get(0));
        assert!((state.cell(0)[layout::RHO] - 1.0 / 50.0).abs() < 1e-15);
        assert!(state.all_finite());
    }

    #[test]
    fn lorentz_factor_is_capped() {
        let geometry = flat(&[1.0]);
        let projector = default_projector(&geometry);
        let mut state = grid(vec![vec![1.0, 1.0, 30.0, 40.0, 0.0, 0.0, 0.0, 0.0]]);

        let report = projector.apply(&mut state).unwrap();

        assert!(report.lorentz_capped.get(0));
        assert!(!report.use_floor.get(0));
        let c = state.cell(0);
        let gamma = (1.0 + c[2] * c[2] + c[3] * c[3]).sqrt();
        assert!((gamma - 10.0).abs() < 1e-10);
        // direction preserved
        assert!((c[2] / c[3] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn heat_flux_bounded_by_saturation() {
        let layout = VarLayout::new(Closures {
            conduction: true,
            viscosity: false,
        });
        let geometry = flat(&[1.0]);
        let gas = IdealGas::default();
        let projector =
            FloorProjector::new(FloorConfig::default(), layout, &geometry, gas).unwrap();
        let mut state = grid(vec![vec![1.0, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -5.0]]);

        let report = projector.apply(&mut state).unwrap();

        let e = gas.element(state.cell(0), &CellMetric::minkowski(1.0), &layout);
        let q_max = 1.07 * 1.0 * e.sound_speed.powi(3);
        assert_eq!(report.closure_limited, 1);
        assert!((state.cell(0)[8] + q_max).abs() < 1e-12);
    }

    #[test]
    fn anisotropy_bounded_by_firehose_and_mirror() {
        let layout = VarLayout::new(Closures {
            conduction: false,
            viscosity: true,
        });
        let geometry = flat(&[1.0, 1.0, 1.0]);
        let gas = IdealGas::default();
        let projector =
            FloorProjector::new(FloorConfig::default(), layout, &geometry, gas).unwrap();
        // P = 0.1, weak field
        let mut state = grid(vec![
            vec![1.0, 0.3, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0, 10.0],
            vec![1.0, 0.3, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0, -10.0],
            vec![1.0, 0.3, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0, 1e-4],
        ]);

        let report = projector.apply(&mut state).unwrap();

        assert_eq!(report.closure_limited, 2);
        assert!(state.cell(0)[8] > 0.0 && state.cell(0)[8] <= 1.49 * 0.1 + 1e-12);
        assert!(state.cell(1)[8] < 0.0 && state.cell(1)[8] >= -2.99 * 0.1 - 1e-12);
        // b² = 0.01: lower bound is -1.07e-2
        assert!((state.cell(1)[8] + 1.07e-2).abs() < 1e-9);
        assert_eq!(state.cell(2)[8], 1e-4);
    }

    #[test]
    fn mismatched_geometry_is_an_error() {
        let geometry = flat(&[1.0]);
        let projector = default_projector(&geometry);
        let mut state = grid(vec![vec![1.0; 8], vec![1.0; 8]]);
        assert!(matches!(
            projector.apply(&mut state),
            Err(FloorError::GeometryMismatch { geometry: 1, state: 2 })
        ));
    }

    #[test]
    fn projection_errors_surface_as_solver_errors() {
        let geometry = flat(&[1.0]);
        let projector = default_projector(&geometry);
        let mut state = grid(vec![vec![1.0; 9]]);
        let err = projector.project(&mut state).unwrap_err();
        assert!(matches!(err, gs_solver::SolverError::Projection { .. }));
    }
}
