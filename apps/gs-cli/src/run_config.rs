//! YAML run file for the cooling demo.

use std::path::Path;

use gs_core::{GridDims, Real};
use gs_floor::{Closures, FloorConfig, IdealGas};
use gs_solver::NewtonConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub grid: GridDims,
    /// Radial extent mapped onto the first grid axis
    pub inner_radius: Real,
    pub outer_radius: Real,
    pub steps: usize,
    pub dt: Real,
    pub cooling: CoolingConfig,
    pub initial: InitialState,
    pub fluid: IdealGas,
    pub closures: Closures,
    pub newton: NewtonConfig,
    pub floors: FloorConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grid: GridDims::new(32, 4, 1),
            inner_radius: 3.0,
            outer_radius: 40.0,
            steps: 5,
            dt: 0.1,
            cooling: CoolingConfig::default(),
            initial: InitialState::default(),
            fluid: IdealGas::default(),
            closures: Closures::default(),
            newton: NewtonConfig::default(),
            floors: FloorConfig::default(),
        }
    }
}

/// Optically thin cooling towards a target internal energy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolingConfig {
    /// Much smaller than `dt` makes the step stiff
    pub cooling_time: Real,
    /// Equilibrium internal energy; below the floors, the projector wins
    pub target_u: Real,
    /// Velocity damping time
    pub drag_time: Real,
    /// Relaxation time of the closure variables
    pub closure_time: Real,
}

impl Default for CoolingConfig {
    fn default() -> Self {
        Self {
            cooling_time: 1e-4,
            target_u: 1e-12,
            drag_time: 1.0,
            closure_time: 0.5,
        }
    }
}

/// Initial primitives, uniform except for the radial density profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    /// `ρ = rho · r^rho_slope`
    pub rho: Real,
    pub rho_slope: Real,
    pub u: Real,
    pub velocity: [Real; 3],
    pub field: [Real; 3],
    pub heat_flux: Real,
    pub anisotropy: Real,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            rho: 1.0,
            rho_slope: -1.5,
            u: 1e-2,
            velocity: [0.5, 0.0, 0.0],
            field: [0.05, 0.0, 0.0],
            heat_flux: 0.0,
            anisotropy: 0.0,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::RunFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| CliError::RunFileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.grid.num_cells() == 0 {
            return Err(CliError::Validation("grid must contain at least one cell".into()));
        }
        if !(self.inner_radius > 0.0 && self.outer_radius > self.inner_radius) {
            return Err(CliError::Validation(
                "radii must satisfy 0 < inner_radius < outer_radius".into(),
            ));
        }
        if !(self.dt > 0.0) {
            return Err(CliError::Validation("dt must be positive".into()));
        }
        let c = &self.cooling;
        if !(c.cooling_time > 0.0 && c.drag_time > 0.0 && c.closure_time > 0.0 && c.target_u > 0.0)
        {
            return Err(CliError::Validation(
                "cooling times and target_u must be positive".into(),
            ));
        }
        if !(self.fluid.adiabatic_index > 1.0 && self.fluid.b_sqr_floor >= 0.0) {
            return Err(CliError::Validation(
                "adiabatic_index must exceed 1 and b_sqr_floor must be non-negative".into(),
            ));
        }
        self.newton.validate()?;
        self.floors.validate()?;
        Ok(())
    }

    /// Cell-center radius for grid index `i` along the first axis.
    pub fn radius(&self, i: usize) -> Real {
        let dr = (self.outer_radius - self.inner_radius) / self.grid.n1 as Real;
        self.inner_radius + (i as Real + 0.5) * dr
    }
}
