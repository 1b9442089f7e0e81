//! Ideal-diode forward model and synthetic measurement generation.
//!
//! Current density of an ideal diode:
//!
//! ```text
//! J  = J0 (exp(V / (n kT)) - 1)
//! J0 = B' T^(3/n) exp(-Eg / (n kT))
//! ```
//!
//! The modeled output is `ln J`, which keeps values on a scale where a
//! Gaussian likelihood with additive uncertainty is meaningful.
//!
//! Numerical notes:
//! - `ln(exp(x) - 1)` is evaluated as `x + ln(-expm1(-x))` so neither large
//!   nor small `x` overflow or cancel.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::model_table::ForwardModel;
use crate::data::observations::Observation;
use crate::error::BayesError;

/// Boltzmann constant in eV/K.
pub const K_B_EV: f64 = 8.617_333_262e-5;

/// Silicon band gap in eV.
pub const SI_BAND_GAP_EV: f64 = 1.12;

/// Conditions are `[V, T]`, parameters are `[B', n]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealDiode {
    pub band_gap: f64,
}

impl Default for IdealDiode {
    fn default() -> Self {
        Self {
            band_gap: SI_BAND_GAP_EV,
        }
    }
}

impl IdealDiode {
    /// `ln J` at voltage `v` (V) and temperature `t` (K).
    pub fn ln_current(&self, v: f64, t: f64, b_prime: f64, n: f64) -> f64 {
        let nkt = n * K_B_EV * t;
        let ln_j0 = b_prime.ln() + (3.0 / n) * t.ln() - self.band_gap / nkt;
        let x = v / nkt;
        ln_j0 + x + (-(-x).exp_m1()).ln()
    }
}

impl ForwardModel for IdealDiode {
    fn evaluate(&self, conditions: &[f64], params: &[f64]) -> Result<f64, BayesError> {
        let (&[v, t], &[b_prime, n]) = (conditions, params) else {
            return Err(BayesError::data(format!(
                "Ideal diode expects [V, T] and [B', n], got {conditions:?} and {params:?}."
            )));
        };
        if !(v > 0.0 && t > 0.0 && b_prime > 0.0 && n > 0.0) {
            return Err(BayesError::data(format!(
                "Ideal diode is only defined for positive V, T, B', n (got V={v}, T={t}, B'={b_prime}, n={n})."
            )));
        }
        Ok(self.ln_current(v, t, b_prime, n))
    }
}

/// Sweep settings for a synthetic data set.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub voltages: Vec<f64>,
    pub temperatures: Vec<f64>,
    /// Standard deviation of additive Gaussian noise on the output.
    pub noise: f64,
    pub seed: u64,
}

/// Generate observations of `model` at `truth` over every `(V, T)` of `sweep`.
pub fn synthetic_observations<M: ForwardModel>(
    model: &M,
    truth: &[f64],
    sweep: &Sweep,
) -> Result<Vec<Observation>, BayesError> {
    if sweep.voltages.is_empty() || sweep.temperatures.is_empty() {
        return Err(BayesError::config("Sweep needs at least one voltage and temperature."));
    }
    if !(sweep.noise.is_finite() && sweep.noise >= 0.0) {
        return Err(BayesError::config("Sweep noise must be finite and >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(sweep.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| BayesError::config(format!("Noise distribution error: {e}")))?;

    let mut out = Vec::with_capacity(sweep.voltages.len() * sweep.temperatures.len());
    for &t in &sweep.temperatures {
        for &v in &sweep.voltages {
            let clean = model.evaluate(&[v, t], truth)?;
            let z: f64 = normal.sample(&mut rng);
            out.push(Observation::new(vec![v, t], clean + sweep.noise * z));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_grows_with_voltage() {
        let d = IdealDiode::default();
        let lo = d.ln_current(0.3, 300.0, 258.0, 1.36);
        let hi = d.ln_current(0.5, 300.0, 258.0, 1.36);
        assert!(hi > lo);
        // Far above kT the slope in ln J is 1 / (n kT).
        let slope = (hi - lo) / 0.2;
        let expected = 1.0 / (1.36 * K_B_EV * 300.0);
        assert!((slope - expected).abs() / expected < 1e-3);
    }

    #[test]
    fn small_bias_stays_finite() {
        let d = IdealDiode::default();
        assert!(d.ln_current(1e-9, 150.0, 10.0, 2.0).is_finite());
    }

    #[test]
    fn evaluate_checks_arity_and_domain() {
        let d = IdealDiode::default();
        assert!(d.evaluate(&[0.3], &[258.0, 1.36]).is_err());
        assert!(d.evaluate(&[0.3, 300.0], &[-1.0, 1.36]).is_err());
        assert!(d.evaluate(&[0.3, 300.0], &[258.0, 1.36]).is_ok());
    }

    #[test]
    fn synthetic_data_is_reproducible() {
        let sweep = Sweep {
            voltages: vec![0.2, 0.4],
            temperatures: vec![150.0, 300.0],
            noise: 0.01,
            seed: 3,
        };
        let a = synthetic_observations(&IdealDiode::default(), &[258.0, 1.36], &sweep).unwrap();
        let b = synthetic_observations(&IdealDiode::default(), &[258.0, 1.36], &sweep).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
    }
}
