//! Radial floor profiles.

use gs_core::Real;
use serde::{Deserialize, Serialize};

/// `amplitude · r^slope`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    pub amplitude: Real,
    pub slope: Real,
}

impl PowerLaw {
    pub const fn new(amplitude: Real, slope: Real) -> Self {
        Self { amplitude, slope }
    }

    pub fn eval(&self, radius: Real) -> Real {
        self.amplitude * radius.powf(self.slope)
    }
}
