//! Backward-Euler residual for the stiff cooling demo.
//!
//! Every row has the form `x - x_prev + dt·S(x)`. The fast residual drops
//! `-x_prev`, which is the only term independent of the unknowns.

use gs_core::{Real, StateGrid};
use gs_floor::{CellMetric, Geometry, MetricField, VarLayout, layout};
use gs_solver::{ResidualEvaluator, ResidualMode, SolverResult};
use rayon::prelude::*;

use crate::error::CliResult;
use crate::run_config::{CoolingConfig, RunConfig};

pub struct CoolingStep {
    cooling: CoolingConfig,
    dt: Real,
    layout: VarLayout,
    previous: StateGrid,
}

impl CoolingStep {
    pub fn new(cfg: &RunConfig, layout: VarLayout, previous: StateGrid) -> Self {
        Self {
            cooling: cfg.cooling.clone(),
            dt: cfg.dt,
            layout,
            previous,
        }
    }

    fn sources(&self, x: &[Real], prev: &[Real], out: &mut [Real]) {
        let c = &self.cooling;
        out.fill(0.0);

        let u = x[layout::U];
        let u_scale = prev[layout::U].max(c.target_u);
        out[layout::U] = (u * u - c.target_u * c.target_u) / (u_scale * c.cooling_time);

        let v = [x[layout::U1], x[layout::U2], x[layout::U3]];
        let v_sqr: Real = v.iter().map(|vi| vi * vi).sum();
        for (k, vi) in [layout::U1, layout::U2, layout::U3].into_iter().zip(v) {
            out[k] = vi * (1.0 + v_sqr) / c.drag_time;
        }

        for idx in [self.layout.q(), self.layout.dp()].into_iter().flatten() {
            out[idx] = x[idx] / c.closure_time;
        }
    }
}

impl ResidualEvaluator for CoolingStep {
    fn evaluate(
        &self,
        state: &StateGrid,
        mode: ResidualMode,
        residual: &mut StateGrid,
    ) -> SolverResult<()> {
        state.ensure_same_shape(residual, "cooling residual")?;
        state.ensure_same_shape(&self.previous, "cooling previous state")?;
        residual
            .par_cells_mut()
            .zip(state.par_cells().zip(self.previous.par_cells()))
            .for_each(|(r, (x, prev))| {
                self.sources(x, prev, r);
                for ((ri, xi), pi) in r.iter_mut().zip(x).zip(prev) {
                    *ri = xi + self.dt * *ri;
                    if mode == ResidualMode::Full {
                        *ri -= pi;
                    }
                }
            });
        Ok(())
    }
}

/// Flat metric with the radius taken from the first grid axis.
pub fn demo_geometry(cfg: &RunConfig) -> MetricField {
    let dims = cfg.grid;
    MetricField::from_fn(dims.num_cells(), |cell| {
        let (i, _, _) = dims.coords(cell);
        CellMetric::minkowski(cfg.radius(i))
    })
}

pub fn initial_state(
    cfg: &RunConfig,
    vars: &VarLayout,
    geometry: &MetricField,
) -> CliResult<StateGrid> {
    let init = &cfg.initial;
    let state = StateGrid::from_fn(cfg.grid, vars.dof(), |cell, prim| {
        let r = geometry.metric(cell).radius;
        prim[layout::RHO] = init.rho * r.powf(init.rho_slope);
        prim[layout::U] = init.u;
        prim[layout::U1..=layout::U3].copy_from_slice(&init.velocity);
        prim[layout::B1..=layout::B3].copy_from_slice(&init.field);
        if let Some(q) = vars.q() {
            prim[q] = init.heat_flux;
        }
        if let Some(dp) = vars.dp() {
            prim[dp] = init.anisotropy;
        }
    })?;
    Ok(state)
}
