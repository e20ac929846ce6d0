use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// Pass `v` through if it is finite.
pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Clamp `v` into `[lo, hi]`, mapping NaN to `lo`.
///
/// `f64::clamp` propagates NaN, which is exactly what the projector and the
/// line search must never do.
pub fn clamp_finite(v: Real, lo: Real, hi: Real) -> Real {
    if v.is_nan() {
        lo
    } else {
        v.max(lo).min(hi)
    }
}

/// Half the squared Euclidean norm of a residual vector.
pub fn half_norm_sqr(r: &[Real]) -> Real {
    0.5 * r.iter().map(|x| x * x).sum::<Real>()
}
