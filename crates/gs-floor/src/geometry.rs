//! Per-cell metric data.
//!
//! The projector never computes the metric itself; it reads covariant and
//! contravariant components plus the radial coordinate from a [`Geometry`]
//! collaborator, one cell at a time.

use gs_core::Real;
use nalgebra::Matrix4;

use crate::error::{FloorError, FloorResult};

/// Metric at one cell center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetric {
    /// `g_{μν}`
    pub g_cov: [[Real; 4]; 4],
    /// `g^{μν}`
    pub g_con: [[Real; 4]; 4],
    /// Radial coordinate used by the floor profiles
    pub radius: Real,
}

impl CellMetric {
    /// Flat spacetime in Cartesian-like coordinates.
    pub fn minkowski(radius: Real) -> Self {
        let mut g = [[0.0; 4]; 4];
        g[0][0] = -1.0;
        g[1][1] = 1.0;
        g[2][2] = 1.0;
        g[3][3] = 1.0;
        Self {
            g_cov: g,
            g_con: g,
            radius,
        }
    }

    /// Build from `g_{μν}`, inverting it for `g^{μν}`.
    ///
    /// Fails if the metric is singular or `g^{00}` is not negative, since the
    /// lapse `1/sqrt(-g^{00})` would be undefined.
    pub fn from_covariant(g_cov: [[Real; 4]; 4], radius: Real) -> FloorResult<Self> {
        let m = Matrix4::from_fn(|i, j| g_cov[i][j]);
        let inv = m.try_inverse().ok_or(FloorError::DegenerateMetric {
            what: "covariant metric is singular",
            radius,
        })?;
        let mut g_con = [[0.0; 4]; 4];
        for (i, row) in g_con.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = inv[(i, j)];
            }
        }
        if !(g_con[0][0] < 0.0) {
            return Err(FloorError::DegenerateMetric {
                what: "g^00 must be negative",
                radius,
            });
        }
        Ok(Self {
            g_cov,
            g_con,
            radius,
        })
    }

    /// `α = 1/sqrt(-g^{00})`
    pub fn lapse(&self) -> Real {
        1.0 / (-self.g_con[0][0]).sqrt()
    }

    /// `g_{μν} v^ν`
    pub fn lower(&self, v: &[Real; 4]) -> [Real; 4] {
        let mut out = [0.0; 4];
        for (mu, o) in out.iter_mut().enumerate() {
            *o = (0..4).map(|nu| self.g_cov[mu][nu] * v[nu]).sum();
        }
        out
    }
}

/// Supplies the metric of every cell of the grid being projected.
pub trait Geometry: Sync {
    fn num_cells(&self) -> usize;

    fn metric(&self, cell: usize) -> CellMetric;
}

/// Precomputed metric for every cell.
#[derive(Clone, Debug, Default)]
pub struct MetricField {
    metrics: Vec<CellMetric>,
}

impl MetricField {
    pub fn new(metrics: Vec<CellMetric>) -> Self {
        Self { metrics }
    }

    pub fn from_fn(num_cells: usize, f: impl FnMut(usize) -> CellMetric) -> Self {
        Self {
            metrics: (0..num_cells).map(f).collect(),
        }
    }
}

impl Geometry for MetricField {
    fn num_cells(&self) -> usize {
        self.metrics.len()
    }

    fn metric(&self, cell: usize) -> CellMetric {
        self.metrics[cell]
    }
}
