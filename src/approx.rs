//! Utilities to approximate equality of floating point gradients.
//!
//! Gradients computed with different summation orders (sequential vs
//! parallel, channel-major vs channel-minor) agree only up to rounding, so
//! comparisons go through a mixed absolute/relative tolerance:
//! `|a - b| <= atol + rtol * |b|`.

/// Absolute tolerance suited to sums of a few thousand `f32` terms.
pub const F32_ATOL: f32 = 1e-5;

/// Relative tolerance suited to sums of a few thousand `f32` terms.
pub const F32_RTOL: f32 = 1e-4;

/// Tolerances for one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub atol: f32,
    pub rtol: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { atol: F32_ATOL, rtol: F32_RTOL }
    }
}

impl Tolerance {
    pub fn new(atol: f32, rtol: f32) -> Self {
        Self { atol, rtol }
    }

    /// `true` if `a` is within tolerance of the reference `b`.
    ///
    /// NaN never compares close, not even to itself.
    pub fn close(&self, a: f32, b: f32) -> bool {
        (a - b).abs() <= self.atol + self.rtol * b.abs()
    }

    /// `true` if both slices have the same length and are pairwise close.
    pub fn all_close(&self, a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| self.close(x, y))
    }
}

/// Approximates equality with the default [`Tolerance`].
pub fn approx_eq(a: &[f32], b: &[f32]) -> bool {
    Tolerance::default().all_close(a, b)
}

/// Largest element-wise absolute difference, or `f32::INFINITY` on a length mismatch.
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_part_scales_with_reference() {
        let tol = Tolerance::new(0.0, 1e-3);
        assert!(tol.close(1000.5, 1000.0));
        assert!(!tol.close(1.5, 1.0));
    }

    #[test]
    fn nan_is_never_close() {
        assert!(!approx_eq(&[f32::NAN], &[f32::NAN]));
        assert!(!approx_eq(&[1.0], &[1.0, 2.0]));
        assert_eq!(max_abs_diff(&[1.0, 2.0], &[1.5, 1.0]), 1.0);
    }
}
