//! Gaussian likelihood kernel.

use std::f64::consts::PI;

/// Density of `N(0, sigma^2)` at `residual`.
///
/// A non-positive or non-finite `sigma` yields `0.0`; callers guarantee a
/// positive experimental uncertainty, so this only triggers on bad input.
pub fn gaussian_density(residual: f64, sigma: f64) -> f64 {
    if !(sigma.is_finite() && sigma > 0.0) || !residual.is_finite() {
        return 0.0;
    }
    let z = residual / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_matches_closed_form() {
        let v = gaussian_density(0.0, 1.0);
        assert!((v - 0.398_942_280_401_432_7).abs() < 1e-12);
    }

    #[test]
    fn symmetric_and_decreasing() {
        assert_eq!(gaussian_density(0.7, 0.3), gaussian_density(-0.7, 0.3));
        assert!(gaussian_density(0.1, 0.3) > gaussian_density(0.5, 0.3));
    }

    #[test]
    fn far_tail_underflows_to_zero() {
        assert_eq!(gaussian_density(1.0e3, 1.0), 0.0);
        assert_eq!(gaussian_density(1.0, 0.0), 0.0);
    }
}
