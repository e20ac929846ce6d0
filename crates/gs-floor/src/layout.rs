//! Fixed index mapping of the primitive variables.

use serde::{Deserialize, Serialize};

pub const RHO: usize = 0;
pub const U: usize = 1;
pub const U1: usize = 2;
pub const U2: usize = 3;
pub const U3: usize = 4;
pub const B1: usize = 5;
pub const B2: usize = 6;
pub const B3: usize = 7;

/// Components present without extended closures.
pub const NUM_IDEAL_VARS: usize = 8;

/// Optional non-ideal closures, each adding one primitive variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Closures {
    /// Heat flux along the field
    pub conduction: bool,
    /// Pressure anisotropy
    pub viscosity: bool,
}

/// Where every variable lives in a cell's state vector.
///
/// The extended variables follow the ideal ones, heat flux first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarLayout {
    q: Option<usize>,
    dp: Option<usize>,
}

impl VarLayout {
    pub fn new(closures: Closures) -> Self {
        let q = closures.conduction.then_some(NUM_IDEAL_VARS);
        let dp = closures
            .viscosity
            .then_some(NUM_IDEAL_VARS + usize::from(closures.conduction));
        Self { q, dp }
    }

    pub fn ideal() -> Self {
        Self::new(Closures::default())
    }

    pub fn dof(&self) -> usize {
        NUM_IDEAL_VARS + usize::from(self.q.is_some()) + usize::from(self.dp.is_some())
    }

    /// Heat flux index, if conduction is enabled.
    pub fn q(&self) -> Option<usize> {
        self.q
    }

    /// Pressure anisotropy index, if viscosity is enabled.
    pub fn dp(&self) -> Option<usize> {
        self.dp
    }

    pub fn has_closures(&self) -> bool {
        self.q.is_some() || self.dp.is_some()
    }
}
