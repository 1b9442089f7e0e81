//! Evenly spaced points in linear or logarithmic space.
//!
//! Grid edges are spaced evenly (in the parameter's own spacing) and box
//! centers sit halfway between consecutive edges, so every initial box along
//! an axis has the same width in that spacing.

use crate::error::BayesError;

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn lin_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, BayesError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(BayesError::config(format!(
            "Invalid range: min={min}, max={max} (must be finite and max>min)."
        )));
    }
    if steps < 2 {
        return Err(BayesError::config("Spacing needs at least 2 points."));
    }

    let step = (max - min) / (steps as f64 - 1.0);
    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push(min + step * i as f64);
    }
    // Pin the last point so the range closes exactly.
    out[steps - 1] = max;
    Ok(out)
}

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, BayesError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(BayesError::config(format!(
            "Invalid log range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(BayesError::config("Spacing needs at least 2 points."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Arithmetic midpoint.
pub fn lin_mid(a: f64, b: f64) -> f64 {
    0.5 * (a + b)
}

/// Geometric midpoint (the arithmetic midpoint in log space).
pub fn log_mid(a: f64, b: f64) -> f64 {
    (a * b).sqrt()
}
