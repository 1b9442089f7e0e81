//! Run options with their documented defaults.
//!
//! All structs deserialize with `#[serde(default)]`, so a JSON file only has
//! to name the options it overrides.

use serde::{Deserialize, Serialize};

use crate::error::BayesError;

/// Options for one inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Target probability mass for the concentration check.
    pub th_pm: f64,
    /// Fraction of boxes (by count) the target mass must fit in.
    pub th_pv: f64,
    /// Observations to consume before stopping; `None` means 70% of them.
    pub min_num_pts: Option<usize>,
    /// Fraction of the previous posterior mixed into the starting prior.
    pub relaxation: f64,
    /// Seed for the observation shuffle; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            th_pm: 0.8,
            th_pv: 0.05,
            min_num_pts: None,
            relaxation: 0.0,
            seed: None,
        }
    }
}

/// Default share of observations consumed per run.
pub const DEFAULT_MIN_PTS_FRAC: f64 = 0.7;

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), BayesError> {
        if !(self.th_pm.is_finite() && self.th_pm > 0.0 && self.th_pm <= 1.0) {
            return Err(BayesError::config(format!(
                "th_pm must be in (0, 1], got {}.",
                self.th_pm
            )));
        }
        if !(self.th_pv.is_finite() && self.th_pv > 0.0 && self.th_pv <= 1.0) {
            return Err(BayesError::config(format!(
                "th_pv must be in (0, 1], got {}.",
                self.th_pv
            )));
        }
        if !(self.relaxation.is_finite() && (0.0..=1.0).contains(&self.relaxation)) {
            return Err(BayesError::config(format!(
                "relaxation must be in [0, 1], got {}.",
                self.relaxation
            )));
        }
        if self.min_num_pts == Some(0) {
            return Err(BayesError::config("min_num_pts must be >= 1."));
        }
        Ok(())
    }

    /// Observation budget for a run over `n_obs` observations.
    pub fn resolved_min_num_pts(&self, n_obs: usize) -> usize {
        let n = match self.min_num_pts {
            Some(n) => n,
            None => (DEFAULT_MIN_PTS_FRAC * n_obs as f64).ceil() as usize,
        };
        n.clamp(1, n_obs.max(1))
    }
}

/// How observations are ingested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Experimental uncertainty applied to every row, overriding per-row values.
    pub fixed_unc: Option<f64>,
    /// Thin densely sampled rows before use.
    pub thinning: Option<ThinningConfig>,
}

impl ObservationConfig {
    pub fn fixed(unc: f64) -> Self {
        Self {
            fixed_unc: Some(unc),
            thinning: None,
        }
    }

    pub fn validate(&self) -> Result<(), BayesError> {
        if let Some(unc) = self.fixed_unc {
            if !(unc.is_finite() && unc > 0.0) {
                return Err(BayesError::config(format!(
                    "fixed_unc must be finite and > 0, got {unc}."
                )));
            }
        }
        if let Some(thinning) = &self.thinning {
            thinning.validate()?;
        }
        Ok(())
    }
}

/// Options for one subdivision round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivideConfig {
    /// Boxes above this probability (and their neighbors) are kept and split.
    pub threshold_prob: f64,
}

impl Default for SubdivideConfig {
    fn default() -> Self {
        Self {
            threshold_prob: 0.001,
        }
    }
}

impl SubdivideConfig {
    pub fn validate(&self) -> Result<(), BayesError> {
        if !(self.threshold_prob.is_finite() && (0.0..1.0).contains(&self.threshold_prob)) {
            return Err(BayesError::config(format!(
                "threshold_prob must be in [0, 1), got {}.",
                self.threshold_prob
            )));
        }
        Ok(())
    }
}

/// Options for thinning densely sampled observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinningConfig {
    /// Largest x-axis gap allowed between kept points; `None` means 1/20 of
    /// the x range.
    pub max_ec_x_step: Option<f64>,
    /// Output change (as a fraction of the output range) that forces a keep.
    pub thresh_dif_frac: f64,
}

impl Default for ThinningConfig {
    fn default() -> Self {
        Self {
            max_ec_x_step: None,
            thresh_dif_frac: 0.01,
        }
    }
}

impl ThinningConfig {
    pub fn validate(&self) -> Result<(), BayesError> {
        if let Some(step) = self.max_ec_x_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(BayesError::config(format!(
                    "max_ec_x_step must be finite and > 0, got {step}."
                )));
            }
        }
        if !(self.thresh_dif_frac.is_finite() && self.thresh_dif_frac >= 0.0) {
            return Err(BayesError::config(format!(
                "thresh_dif_frac must be finite and >= 0, got {}.",
                self.thresh_dif_frac
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = InferenceConfig::default();
        assert_eq!(cfg.th_pm, 0.8);
        assert_eq!(cfg.th_pv, 0.05);
        assert_eq!(cfg.relaxation, 0.0);
        assert_eq!(SubdivideConfig::default().threshold_prob, 0.001);
    }

    #[test]
    fn min_num_pts_defaults_to_seventy_percent() {
        let cfg = InferenceConfig::default();
        assert_eq!(cfg.resolved_min_num_pts(100), 70);
        assert_eq!(cfg.resolved_min_num_pts(3), 3);

        let all = InferenceConfig {
            min_num_pts: Some(500),
            ..InferenceConfig::default()
        };
        assert_eq!(all.resolved_min_num_pts(100), 100);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: InferenceConfig = serde_json::from_str(r#"{"th_pm": 0.9, "seed": 7}"#).unwrap();
        assert_eq!(cfg.th_pm, 0.9);
        assert_eq!(cfg.th_pv, 0.05);
        assert_eq!(cfg.seed, Some(7));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad = InferenceConfig {
            relaxation: 1.5,
            ..InferenceConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(SubdivideConfig { threshold_prob: 1.0 }.validate().is_err());
        assert!(ObservationConfig::fixed(0.0).validate().is_err());
        assert!(ObservationConfig::default().validate().is_ok());
    }
}
