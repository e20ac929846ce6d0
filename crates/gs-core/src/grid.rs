//! Dense per-cell state containers.
//!
//! A [`StateGrid`] stores `dof` scalar components for each cell of an
//! `N1×N2×N3` block. Storage is cell-major: the components of one cell are
//! contiguous, so every per-cell kernel works on a `&[Real]` / `&mut [Real]`
//! chunk of length `dof` and parallelises with `par_chunks_mut`.

use std::fmt;

use rayon::prelude::*;

use crate::error::{CoreError, CoreResult};
use crate::numeric::Real;

/// Logical extent of a 3-D block of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridDims {
    pub n1: usize,
    pub n2: usize,
    pub n3: usize,
}

impl GridDims {
    pub const fn new(n1: usize, n2: usize, n3: usize) -> Self {
        Self { n1, n2, n3 }
    }

    pub const fn num_cells(&self) -> usize {
        self.n1 * self.n2 * self.n3
    }

    /// Linear index with `i` fastest.
    pub const fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.n1 * (j + self.n2 * k)
    }

    /// Inverse of [`GridDims::linear_index`].
    pub const fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let i = idx % self.n1;
        let j = (idx / self.n1) % self.n2;
        let k = idx / (self.n1 * self.n2);
        (i, j, k)
    }

    fn contains(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.n1 && j < self.n2 && k < self.n3
    }
}

impl fmt::Display for GridDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.n1, self.n2, self.n3)
    }
}

/// Cell-major grid of state vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct StateGrid {
    dims: GridDims,
    dof: usize,
    data: Vec<Real>,
}

impl StateGrid {
    /// Zero-filled grid.
    pub fn new(dims: GridDims, dof: usize) -> CoreResult<Self> {
        if dof == 0 {
            return Err(CoreError::InvalidArg {
                what: "grid must carry at least one component per cell",
            });
        }
        if dims.num_cells() == 0 {
            return Err(CoreError::InvalidArg {
                what: "grid must contain at least one cell",
            });
        }
        Ok(Self {
            dims,
            dof,
            data: vec![0.0; dims.num_cells() * dof],
        })
    }

    /// Build a grid by filling each cell from its linear index.
    pub fn from_fn<F>(dims: GridDims, dof: usize, fill: F) -> CoreResult<Self>
    where
        F: Fn(usize, &mut [Real]) + Sync,
    {
        let mut grid = Self::new(dims, dof)?;
        grid.par_cells_mut()
            .enumerate()
            .for_each(|(cell, values)| fill(cell, values));
        Ok(grid)
    }

    /// Wrap existing cell-major data.
    pub fn from_cells(dims: GridDims, dof: usize, data: Vec<Real>) -> CoreResult<Self> {
        let mut grid = Self::new(dims, dof)?;
        if data.len() != grid.data.len() {
            return Err(CoreError::ShapeMismatch {
                what: "cell data",
                expected: grid.data.len().to_string(),
                found: data.len().to_string(),
            });
        }
        grid.data = data;
        Ok(grid)
    }

    /// Zero-filled grid with the same shape.
    pub fn zeros_like(&self) -> Self {
        Self {
            dims: self.dims,
            dof: self.dof,
            data: vec![0.0; self.data.len()],
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn num_cells(&self) -> usize {
        self.dims.num_cells()
    }

    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    pub fn cell(&self, cell: usize) -> &[Real] {
        &self.data[cell * self.dof..(cell + 1) * self.dof]
    }

    pub fn cell_mut(&mut self, cell: usize) -> &mut [Real] {
        &mut self.data[cell * self.dof..(cell + 1) * self.dof]
    }

    pub fn cells(&self) -> std::slice::ChunksExact<'_, Real> {
        self.data.chunks_exact(self.dof)
    }

    pub fn cells_mut(&mut self) -> std::slice::ChunksExactMut<'_, Real> {
        self.data.chunks_exact_mut(self.dof)
    }

    pub fn par_cells(&self) -> rayon::slice::ChunksExact<'_, Real> {
        self.data.par_chunks_exact(self.dof)
    }

    pub fn par_cells_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, Real> {
        self.data.par_chunks_exact_mut(self.dof)
    }

    pub fn get(&self, i: usize, j: usize, k: usize, var: usize) -> CoreResult<Real> {
        let idx = self.checked_index(i, j, k, var)?;
        Ok(self.data[idx])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, var: usize, value: Real) -> CoreResult<()> {
        let idx = self.checked_index(i, j, k, var)?;
        self.data[idx] = value;
        Ok(())
    }

    fn checked_index(&self, i: usize, j: usize, k: usize, var: usize) -> CoreResult<usize> {
        if !self.dims.contains(i, j, k) {
            return Err(CoreError::IndexOob {
                what: "cell",
                index: self.dims.linear_index(i, j, k),
                len: self.num_cells(),
            });
        }
        if var >= self.dof {
            return Err(CoreError::IndexOob {
                what: "component",
                index: var,
                len: self.dof,
            });
        }
        Ok(self.dims.linear_index(i, j, k) * self.dof + var)
    }

    /// Iterate one component across all cells.
    pub fn component(&self, var: usize) -> impl Iterator<Item = Real> + '_ {
        self.cells().map(move |c| c[var])
    }

    /// Fail loudly when two grids do not describe the same cells/components.
    pub fn ensure_same_shape(&self, other: &StateGrid, what: &'static str) -> CoreResult<()> {
        if self.dims != other.dims || self.dof != other.dof {
            return Err(CoreError::ShapeMismatch {
                what,
                expected: self.shape_string(),
                found: other.shape_string(),
            });
        }
        Ok(())
    }

    pub fn copy_from(&mut self, other: &StateGrid) -> CoreResult<()> {
        self.ensure_same_shape(other, "grid copy")?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// Squared L2 norm of the flattened grid (cells × components).
    pub fn l2_norm_sqr(&self) -> Real {
        self.data.par_iter().map(|x| x * x).sum()
    }

    pub fn l2_norm(&self) -> Real {
        self.l2_norm_sqr().sqrt()
    }

    pub fn all_finite(&self) -> bool {
        self.data.par_iter().all(|x| x.is_finite())
    }

    pub fn shape_string(&self) -> String {
        format!("{} cells of {} components", self.dims, self.dof)
    }
}

/// A state grid surrounded by a ghost margin owned by boundary collaborators.
///
/// The margin is only added along dimensions with more than one active cell.
#[derive(Clone, Debug)]
pub struct GhostedGrid {
    active: GridDims,
    ghost: usize,
    grid: StateGrid,
}

impl GhostedGrid {
    pub fn new(active: GridDims, ghost: usize, dof: usize) -> CoreResult<Self> {
        let pad = |n: usize| if n > 1 { n + 2 * ghost } else { n };
        let total = GridDims::new(pad(active.n1), pad(active.n2), pad(active.n3));
        Ok(Self {
            active,
            ghost,
            grid: StateGrid::new(total, dof)?,
        })
    }

    pub fn active_dims(&self) -> GridDims {
        self.active
    }

    pub fn total_dims(&self) -> GridDims {
        self.grid.dims()
    }

    pub fn num_ghost(&self) -> usize {
        self.ghost
    }

    pub fn grid(&self) -> &StateGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut StateGrid {
        &mut self.grid
    }

    fn offsets(&self) -> (usize, usize, usize) {
        let off = |n: usize| if n > 1 { self.ghost } else { 0 };
        (off(self.active.n1), off(self.active.n2), off(self.active.n3))
    }

    fn total_index(&self, active_cell: usize) -> usize {
        let (i, j, k) = self.active.coords(active_cell);
        let (o1, o2, o3) = self.offsets();
        self.grid.dims().linear_index(i + o1, j + o2, k + o3)
    }

    /// Copy the active domain into a new grid.
    pub fn extract_active(&self) -> StateGrid {
        let dof = self.grid.dof();
        let mut out = StateGrid {
            dims: self.active,
            dof,
            data: vec![0.0; self.active.num_cells() * dof],
        };
        for (cell, values) in out.cells_mut().enumerate() {
            values.copy_from_slice(self.grid.cell(self.total_index(cell)));
        }
        out
    }

    /// Write an active-domain grid back, leaving the ghost margin untouched.
    pub fn write_active(&mut self, active: &StateGrid) -> CoreResult<()> {
        if active.dims() != self.active || active.dof() != self.grid.dof() {
            return Err(CoreError::ShapeMismatch {
                what: "active domain",
                expected: format!("{} cells of {} components", self.active, self.grid.dof()),
                found: active.shape_string(),
            });
        }
        for (cell, values) in active.cells().enumerate() {
            let idx = self.total_index(cell);
            self.grid.cell_mut(idx).copy_from_slice(values);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_index_round_trips_coords() {
        let dims = GridDims::new(4, 3, 2);
        for idx in 0..dims.num_cells() {
            let (i, j, k) = dims.coords(idx);
            assert_eq!(dims.linear_index(i, j, k), idx);
        }
    }

    #[test]
    fn empty_grids_are_rejected() {
        assert!(StateGrid::new(GridDims::new(0, 1, 1), 2).is_err());
        assert!(StateGrid::new(GridDims::new(1, 1, 1), 0).is_err());
    }

    #[test]
    fn cells_are_contiguous() {
        let grid = StateGrid::from_fn(GridDims::new(2, 2, 1), 3, |cell, v| {
            for (var, x) in v.iter_mut().enumerate() {
                *x = (10 * cell + var) as Real;
            }
        })
        .unwrap();

        assert_eq!(grid.cell(2), &[20.0, 21.0, 22.0]);
        assert_eq!(grid.get(1, 1, 0, 2).unwrap(), 32.0);
        assert_eq!(grid.component(1).collect::<Vec<_>>(), vec![1.0, 11.0, 21.0, 31.0]);
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut grid = StateGrid::new(GridDims::new(2, 1, 1), 2).unwrap();
        assert!(matches!(
            grid.get(2, 0, 0, 0),
            Err(CoreError::IndexOob { what: "cell", .. })
        ));
        assert!(matches!(
            grid.set(0, 0, 0, 2, 1.0),
            Err(CoreError::IndexOob { what: "component", .. })
        ));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let a = StateGrid::new(GridDims::new(2, 1, 1), 2).unwrap();
        let b = StateGrid::new(GridDims::new(2, 1, 1), 3).unwrap();
        let err = a.ensure_same_shape(&b, "residual").unwrap_err();
        assert!(format!("{err}").contains("residual"));
    }

    #[test]
    fn l2_norm_is_flattened() {
        let grid =
            StateGrid::from_cells(GridDims::new(2, 1, 1), 2, vec![3.0, 0.0, 0.0, 4.0]).unwrap();
        assert!((grid.l2_norm() - 5.0).abs() < 1e-15);
    }

    #[test]
    fn ghost_margin_only_pads_used_dimensions() {
        let g = GhostedGrid::new(GridDims::new(4, 3, 1), 2, 1).unwrap();
        assert_eq!(g.total_dims(), GridDims::new(8, 7, 1));
    }

    #[test]
    fn active_domain_round_trip_leaves_ghosts_alone() {
        let active_dims = GridDims::new(3, 2, 1);
        let mut ghosted = GhostedGrid::new(active_dims, 1, 2).unwrap();
        ghosted.grid_mut().as_mut_slice().fill(-1.0);

        let active = StateGrid::from_fn(active_dims, 2, |cell, v| {
            v[0] = cell as Real;
            v[1] = 100.0 + cell as Real;
        })
        .unwrap();
        ghosted.write_active(&active).unwrap();

        assert_eq!(ghosted.extract_active(), active);
        // corner ghost cell untouched
        assert_eq!(ghosted.grid().cell(0), &[-1.0, -1.0]);
        // first active cell sits one ghost in along both padded dimensions
        let total = ghosted.total_dims();
        assert_eq!(ghosted.grid().cell(total.linear_index(1, 1, 0)), &[0.0, 100.0]);
    }
}
