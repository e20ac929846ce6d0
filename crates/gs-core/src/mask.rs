//! Per-cell boolean masks.

use rayon::prelude::*;

/// One flag per cell, e.g. "a floor was applied here".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellMask {
    flags: Vec<bool>,
}

impl CellMask {
    pub fn from_vec(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn get(&self, cell: usize) -> bool {
        self.flags.get(cell).copied().unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    pub fn any(&self) -> bool {
        self.flags.par_iter().any(|&f| f)
    }

    pub fn count(&self) -> usize {
        self.flags.par_iter().filter(|&&f| f).count()
    }
}
