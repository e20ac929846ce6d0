//! Global reductions.
//!
//! A distributed deployment implements [`Collective`] on top of its
//! communicator; these two reductions are the only cross-worker traffic the
//! solver needs.

use gs_core::Real;

pub trait Collective {
    /// Sum a worker-local partial value over all workers.
    fn sum(&self, local: Real) -> Real;

    /// True if the flag is set on any worker.
    fn any(&self, local: bool) -> bool;
}

/// Single-process reduction: the local value is the global one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn sum(&self, local: Real) -> Real {
        local
    }

    fn any(&self, local: bool) -> bool {
        local
    }
}

impl<T: Collective + ?Sized> Collective for &T {
    fn sum(&self, local: Real) -> Real {
        (**self).sum(local)
    }

    fn any(&self, local: bool) -> bool {
        (**self).any(local)
    }
}
