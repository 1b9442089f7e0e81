//! Observation ingest: condition matching, uncertainties and thinning.
//!
//! Condition values that agree within each condition's declared tolerance are
//! the same condition. Every distinct tuple is interned once in a
//! [`ConditionSet`], and both observations and model outputs refer to it by
//! index, so the likelihood never compares floats directly.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ObservationConfig, ThinningConfig};
use crate::error::BayesError;
use crate::space::ParameterSpace;

/// One measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Values in declaration order of the problem's conditions.
    pub conditions: Vec<f64>,
    pub output: f64,
    /// Per-row experimental uncertainty, if the data carries one.
    #[serde(default)]
    pub uncertainty: Option<f64>,
}

impl Observation {
    pub fn new(conditions: Vec<f64>, output: f64) -> Self {
        Self {
            conditions,
            output,
            uncertainty: None,
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }
}

/// Distinct condition tuples, matched within per-condition tolerances.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSet {
    tolerances: Vec<f64>,
    tuples: Vec<Vec<f64>>,
}

impl ConditionSet {
    pub fn new(tolerances: Vec<f64>) -> Self {
        Self {
            tolerances,
            tuples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&[f64]> {
        self.tuples.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.tuples.iter().map(Vec::as_slice)
    }

    /// Index of the nearest stored tuple within tolerance on every condition.
    pub fn find(&self, values: &[f64]) -> Option<usize> {
        if values.len() != self.tolerances.len() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (id, tuple) in self.tuples.iter().enumerate() {
            let mut distance = 0.0;
            let mut within = true;
            for ((&v, &t), &tol) in values.iter().zip(tuple.iter()).zip(self.tolerances.iter()) {
                let d = (v - t).abs();
                if d > tol {
                    within = false;
                    break;
                }
                distance += d;
            }
            if within && best.is_none_or(|(_, bd)| distance < bd) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Return the index of a matching tuple, storing `values` if none matches.
    pub fn intern(&mut self, values: &[f64]) -> usize {
        if let Some(id) = self.find(values) {
            return id;
        }
        self.tuples.push(values.to_vec());
        self.tuples.len() - 1
    }
}

/// Validated observations with resolved uncertainties.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    rows: Vec<Observation>,
    condition_ids: Vec<usize>,
    uncertainties: Vec<f64>,
    conditions: ConditionSet,
}

impl ObservationSet {
    /// Validate rows against the problem declaration and resolve each row's
    /// experimental uncertainty (`fixed_unc` wins over per-row values).
    pub fn new(
        space: &ParameterSpace,
        rows: Vec<Observation>,
        config: &ObservationConfig,
    ) -> Result<Self, BayesError> {
        config.validate()?;
        if rows.is_empty() {
            return Err(BayesError::data("No observations supplied."));
        }
        let n_cond = space.conditions().len();
        if n_cond == 0 {
            return Err(BayesError::config(
                "At least one experimental condition must be declared.",
            ));
        }

        let tolerances = space.conditions().iter().map(|c| c.tolerance).collect();
        let mut conditions = ConditionSet::new(tolerances);
        let mut condition_ids = Vec::with_capacity(rows.len());
        let mut uncertainties = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            if row.conditions.len() != n_cond {
                return Err(BayesError::data(format!(
                    "Observation {i}: {} condition value(s), expected {n_cond}.",
                    row.conditions.len()
                )));
            }
            if row.conditions.iter().any(|v| !v.is_finite()) || !row.output.is_finite() {
                return Err(BayesError::data(format!(
                    "Observation {i}: non-finite condition or output value."
                )));
            }
            let unc = match (config.fixed_unc, row.uncertainty) {
                (Some(fixed), _) => fixed,
                (None, Some(u)) if u.is_finite() && u > 0.0 => u,
                (None, Some(u)) => {
                    return Err(BayesError::data(format!(
                        "Observation {i}: uncertainty must be finite and > 0, got {u}."
                    )));
                }
                (None, None) => {
                    return Err(BayesError::config(format!(
                        "Observation {i} has no uncertainty and no fixed_unc is configured."
                    )));
                }
            };
            condition_ids.push(conditions.intern(&row.conditions));
            uncertainties.push(unc);
        }

        let set = Self {
            rows,
            condition_ids,
            uncertainties,
            conditions,
        };

        match &config.thinning {
            Some(thinning) => {
                let x_axis = space
                    .x_condition()
                    .ok_or_else(|| BayesError::config("Thinning needs an x-axis condition."))?;
                set.thin(x_axis, thinning)
            }
            None => Ok(set),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &Observation {
        &self.rows[i]
    }

    /// Index of row `i`'s condition tuple in [`Self::conditions`].
    pub fn condition_id(&self, i: usize) -> usize {
        self.condition_ids[i]
    }

    /// Resolved experimental uncertainty of row `i`.
    pub fn uncertainty(&self, i: usize) -> f64 {
        self.uncertainties[i]
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Drop redundant rows from densely sampled sweeps.
    ///
    /// Rows are grouped by every condition except `x_axis` and sorted along
    /// `x_axis`. Within a group the first and last rows are kept; any other
    /// row is kept when its output moved by more than
    /// `thresh_dif_frac × output range` since the last kept row, or when it
    /// lies at least `max_ec_x_step` past the last kept row.
    pub fn thin(&self, x_axis: usize, config: &ThinningConfig) -> Result<Self, BayesError> {
        config.validate()?;
        if x_axis >= self.conditions.tolerances.len() {
            return Err(BayesError::config(format!(
                "x-axis index {x_axis} is out of range."
            )));
        }

        let (out_min, out_max) = min_max(self.rows.iter().map(|r| r.output));
        let (x_min, x_max) = min_max(self.rows.iter().map(|r| r.conditions[x_axis]));
        let out_step = config.thresh_dif_frac * (out_max - out_min);
        let x_step = config.max_ec_x_step.unwrap_or((x_max - x_min) / 20.0);

        let mut groups: HashMap<Vec<u64>, Vec<usize>> = HashMap::new();
        for (i, &cid) in self.condition_ids.iter().enumerate() {
            let key = self.conditions.tuples[cid]
                .iter()
                .enumerate()
                .filter(|&(a, _)| a != x_axis)
                .map(|(_, v)| v.to_bits())
                .collect();
            groups.entry(key).or_default().push(i);
        }

        let mut keep = Vec::new();
        for members in groups.values_mut() {
            members.sort_by(|&a, &b| {
                self.rows[a].conditions[x_axis]
                    .partial_cmp(&self.rows[b].conditions[x_axis])
                    .unwrap_or(Ordering::Equal)
            });
            let mut last = members[0];
            keep.push(last);
            let interior = if members.len() > 2 {
                &members[1..members.len() - 1]
            } else {
                &[][..]
            };
            for &i in interior {
                let dy = (self.rows[i].output - self.rows[last].output).abs();
                let dx = self.rows[i].conditions[x_axis] - self.rows[last].conditions[x_axis];
                if dy > out_step || dx >= x_step {
                    keep.push(i);
                    last = i;
                }
            }
            if members.len() > 1 {
                keep.push(members[members.len() - 1]);
            }
        }
        keep.sort_unstable();

        let dropped = self.rows.len() - keep.len();
        if dropped > 0 {
            warn!(
                kept = keep.len(),
                dropped,
                x_step,
                "thinned densely sampled observations"
            );
        } else {
            info!(kept = keep.len(), "thinning kept every observation");
        }
        Ok(self.subset(&keep))
    }

    fn subset(&self, indices: &[usize]) -> Self {
        let mut conditions = ConditionSet::new(self.conditions.tolerances.clone());
        let mut rows = Vec::with_capacity(indices.len());
        let mut condition_ids = Vec::with_capacity(indices.len());
        let mut uncertainties = Vec::with_capacity(indices.len());
        for &i in indices {
            let tuple = &self.conditions.tuples[self.condition_ids[i]];
            condition_ids.push(conditions.intern(tuple));
            rows.push(self.rows[i].clone());
            uncertainties.push(self.uncertainties[i]);
        }
        Self {
            rows,
            condition_ids,
            uncertainties,
            conditions,
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExperimentalCondition, FitParameter, OutputVariable};

    fn space() -> ParameterSpace {
        let mut space = ParameterSpace::new(OutputVariable::new("y"));
        space.add_fit_param(FitParameter::new("a", 0.0, 1.0)).unwrap();
        space
            .add_condition(ExperimentalCondition::new("x").as_x().with_tolerance(1e-6))
            .unwrap();
        space
            .add_condition(ExperimentalCondition::new("T").with_tolerance(0.5))
            .unwrap();
        space
    }

    #[test]
    fn close_conditions_share_a_tuple() {
        let rows = vec![
            Observation::new(vec![0.1, 300.0], 1.0),
            Observation::new(vec![0.1, 300.2], 1.1),
            Observation::new(vec![0.1, 301.0], 1.2),
        ];
        let obs = ObservationSet::new(&space(), rows, &ObservationConfig::fixed(0.1)).unwrap();
        assert_eq!(obs.conditions().len(), 2);
        assert_eq!(obs.condition_id(0), obs.condition_id(1));
        assert_ne!(obs.condition_id(0), obs.condition_id(2));
    }

    #[test]
    fn nearest_tuple_wins_within_tolerance() {
        let mut set = ConditionSet::new(vec![1.0]);
        set.intern(&[10.0]);
        set.intern(&[11.5]);
        assert_eq!(set.find(&[11.0]), Some(1));
        assert_eq!(set.find(&[10.4]), Some(0));
        assert_eq!(set.find(&[13.0]), None);
    }

    #[test]
    fn uncertainty_is_required_from_somewhere() {
        let rows = vec![Observation::new(vec![0.1, 300.0], 1.0)];
        let err = ObservationSet::new(&space(), rows.clone(), &ObservationConfig::default())
            .unwrap_err();
        assert!(matches!(err, BayesError::Configuration(_)));

        let rows = vec![Observation::new(vec![0.1, 300.0], 1.0).with_uncertainty(0.2)];
        let obs = ObservationSet::new(&space(), rows, &ObservationConfig::default()).unwrap();
        assert_eq!(obs.uncertainty(0), 0.2);
    }

    #[test]
    fn fixed_unc_overrides_rows() {
        let rows = vec![Observation::new(vec![0.1, 300.0], 1.0).with_uncertainty(0.2)];
        let obs = ObservationSet::new(&space(), rows, &ObservationConfig::fixed(0.05)).unwrap();
        assert_eq!(obs.uncertainty(0), 0.05);
    }

    #[test]
    fn wrong_arity_and_nan_are_rejected() {
        let cfg = ObservationConfig::fixed(0.1);
        let short = vec![Observation::new(vec![0.1], 1.0)];
        assert!(ObservationSet::new(&space(), short, &cfg).is_err());
        let nan = vec![Observation::new(vec![0.1, 300.0], f64::NAN)];
        assert!(ObservationSet::new(&space(), nan, &cfg).is_err());
    }

    #[test]
    fn thinning_drops_dense_points_but_keeps_minimum_density() {
        let n = 305;
        let rows: Vec<Observation> = (0..n)
            .map(|i| {
                let x = i as f64 / (n - 1) as f64;
                Observation::new(vec![x, 300.0], x * x)
            })
            .collect();
        let max_step = 0.05;
        let cfg = ObservationConfig {
            fixed_unc: Some(0.01),
            thinning: Some(ThinningConfig {
                max_ec_x_step: Some(max_step),
                thresh_dif_frac: 0.01,
            }),
        };
        let obs = ObservationSet::new(&space(), rows, &cfg).unwrap();
        let min_density = (1.0 / max_step) as usize;
        assert!(obs.len() < n, "kept {}", obs.len());
        assert!(obs.len() > min_density, "kept {}", obs.len());

        // No gap between kept neighbors may exceed the step by more than one
        // original sample spacing.
        let mut xs: Vec<f64> = obs.rows().iter().map(|r| r.conditions[0]).collect();
        xs.sort_by(f64::total_cmp);
        let dx = 1.0 / (n - 1) as f64;
        for w in xs.windows(2) {
            assert!(w[1] - w[0] <= max_step + dx + 1e-12);
        }
    }

    #[test]
    fn thinning_groups_by_other_conditions() {
        let mut rows = Vec::new();
        for t in [250.0, 300.0] {
            for i in 0..50 {
                rows.push(Observation::new(vec![i as f64 * 0.001, t], 1.0));
            }
        }
        let cfg = ObservationConfig {
            fixed_unc: Some(0.01),
            thinning: Some(ThinningConfig::default()),
        };
        let obs = ObservationSet::new(&space(), rows, &cfg).unwrap();
        // Flat output: only endpoints and x-step crossings survive, per group.
        let at_250 = obs.rows().iter().filter(|r| r.conditions[1] == 250.0).count();
        let at_300 = obs.rows().iter().filter(|r| r.conditions[1] == 300.0).count();
        assert_eq!(at_250, at_300);
        assert!(at_250 >= 2 && at_250 < 50);
    }
}
