//! Declarations shared by every stage.
//!
//! Every type here is serializable, so a whole problem declaration can live in
//! a JSON file next to its data.

use serde::{Deserialize, Serialize};

use crate::error::BayesError;
use crate::math::{lin_mid, lin_space, log_mid, log_space};

/// Relative slack when comparing a half width against `min_width`.
const WIDTH_RTOL: f64 = 1e-9;

/// How a fit parameter is discretized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    #[default]
    Linear,
    Log,
}

impl Spacing {
    /// Box width in this spacing: absolute for linear, decades for log.
    pub fn width(self, lo: f64, hi: f64) -> f64 {
        match self {
            Spacing::Linear => hi - lo,
            Spacing::Log => (hi / lo).log10(),
        }
    }

    /// The point halfway between `lo` and `hi` in this spacing.
    pub fn midpoint(self, lo: f64, hi: f64) -> f64 {
        match self {
            Spacing::Linear => lin_mid(lo, hi),
            Spacing::Log => log_mid(lo, hi),
        }
    }

    /// `steps` evenly spaced points over `[min, max]` in this spacing.
    pub fn points(self, min: f64, max: f64, steps: usize) -> Result<Vec<f64>, BayesError> {
        match self {
            Spacing::Linear => lin_space(min, max, steps),
            Spacing::Log => log_space(min, max, steps),
        }
    }

    /// Map a value onto the axis where this spacing is uniform.
    pub fn to_uniform(self, value: f64) -> f64 {
        match self {
            Spacing::Linear => value,
            Spacing::Log => value.log10(),
        }
    }

    pub fn from_uniform(self, value: f64) -> f64 {
        match self {
            Spacing::Linear => value,
            Spacing::Log => 10f64.powf(value),
        }
    }
}

/// An unknown quantity to estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub name: String,
    #[serde(default)]
    pub units: String,
    pub lo: f64,
    pub hi: f64,
    #[serde(default)]
    pub spacing: Spacing,
    /// Number of boxes along this axis in the initial grid.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    /// Subdivision floor, in the same units as [`Spacing::width`].
    #[serde(default)]
    pub min_width: Option<f64>,
}

fn default_resolution() -> usize {
    10
}

impl FitParameter {
    pub fn new(name: impl Into<String>, lo: f64, hi: f64) -> Self {
        Self {
            name: name.into(),
            units: String::new(),
            lo,
            hi,
            spacing: Spacing::Linear,
            resolution: default_resolution(),
            min_width: None,
        }
    }

    pub fn log(mut self) -> Self {
        self.spacing = Spacing::Log;
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_min_width(mut self, min_width: f64) -> Self {
        self.min_width = Some(min_width);
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn validate(&self) -> Result<(), BayesError> {
        if self.name.trim().is_empty() {
            return Err(BayesError::config("Fit parameter name must not be empty."));
        }
        if self.resolution == 0 {
            return Err(BayesError::config(format!(
                "Fit parameter '{}': resolution must be > 0.",
                self.name
            )));
        }
        if !(self.lo.is_finite() && self.hi.is_finite()) || self.hi <= self.lo {
            return Err(BayesError::config(format!(
                "Fit parameter '{}': range [{}, {}] is inverted or not finite.",
                self.name, self.lo, self.hi
            )));
        }
        if self.spacing == Spacing::Log && self.lo <= 0.0 {
            return Err(BayesError::config(format!(
                "Fit parameter '{}': log spacing needs a positive range, got lo={}.",
                self.name, self.lo
            )));
        }
        if let Some(w) = self.min_width {
            if !(w.is_finite() && w > 0.0) {
                return Err(BayesError::config(format!(
                    "Fit parameter '{}': min_width must be finite and > 0.",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Edge positions of the initial partition (`resolution + 1` values).
    pub fn initial_edges(&self) -> Result<Vec<f64>, BayesError> {
        self.validate()?;
        self.spacing.points(self.lo, self.hi, self.resolution + 1)
    }

    /// Whether a box spanning `[lo, hi]` may still be halved along this axis
    /// without either half falling below `min_width`.
    pub fn can_split(&self, lo: f64, hi: f64) -> bool {
        match self.min_width {
            Some(min) => 0.5 * self.spacing.width(lo, hi) >= min * (1.0 - WIDTH_RTOL),
            None => true,
        }
    }
}

/// A controlled or measured independent variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalCondition {
    pub name: String,
    #[serde(default)]
    pub units: String,
    /// Two values closer than this are the same condition.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Display x-axis; also the sort axis for observation thinning.
    #[serde(default)]
    pub is_x: bool,
}

fn default_tolerance() -> f64 {
    1e-9
}

impl ExperimentalCondition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: String::new(),
            tolerance: default_tolerance(),
            is_x: false,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn as_x(mut self) -> Self {
        self.is_x = true;
        self
    }

    pub fn validate(&self) -> Result<(), BayesError> {
        if self.name.trim().is_empty() {
            return Err(BayesError::config("Condition name must not be empty."));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(BayesError::config(format!(
                "Condition '{}': tolerance must be finite and >= 0.",
                self.name
            )));
        }
        Ok(())
    }
}

/// The modeled/observed scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVariable {
    pub name: String,
    #[serde(default)]
    pub units: String,
}

impl OutputVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_width_is_in_decades() {
        assert!((Spacing::Log.width(10.0, 1000.0) - 2.0).abs() < 1e-12);
        assert_eq!(Spacing::Linear.width(1.0, 1.5), 0.5);
    }

    #[test]
    fn validate_rejects_bad_declarations() {
        assert!(FitParameter::new("n", 2.0, 1.0).validate().is_err());
        assert!(FitParameter::new("n", 1.0, 2.0).with_resolution(0).validate().is_err());
        assert!(FitParameter::new("B", 0.0, 10.0).log().validate().is_err());
        assert!(FitParameter::new("n", 1.0, 2.0).validate().is_ok());
    }

    #[test]
    fn min_width_gates_splitting() {
        let p = FitParameter::new("n", 1.0, 2.0).with_min_width(0.1);
        assert!(p.can_split(1.0, 1.2));
        assert!(p.can_split(1.0, 1.5));
        assert!(!p.can_split(1.0, 1.15));
    }

    #[test]
    fn declarations_load_from_json_with_defaults() {
        let p: FitParameter =
            serde_json::from_str(r#"{"name":"Bp","lo":10,"hi":1000,"spacing":"log"}"#).unwrap();
        assert_eq!(p.spacing, Spacing::Log);
        assert_eq!(p.resolution, 10);
        assert_eq!(p.min_width, None);
    }
}
