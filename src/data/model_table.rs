//! Modeled outputs and the forward-model capability.
//!
//! The core never evaluates a model by itself: it asks which points are
//! missing, a [`ForwardModel`] fills them, and the results land in a
//! [`ModelTable`] keyed on exact `(conditions, parameters)` bit patterns.
//! Grid centers are computed deterministically, so a point requested for a
//! box is found again under the same key.

use std::collections::HashMap;

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::observations::ConditionSet;
use crate::error::BayesError;
use crate::space::Grid;

/// Evaluates the modeled output at one point.
///
/// `conditions` follows the declaration order of the problem's experimental
/// conditions, `params` that of its fit parameters.
pub trait ForwardModel {
    fn evaluate(&self, conditions: &[f64], params: &[f64]) -> Result<f64, BayesError>;
}

impl<F> ForwardModel for F
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    fn evaluate(&self, conditions: &[f64], params: &[f64]) -> Result<f64, BayesError> {
        Ok(self(conditions, params))
    }
}

/// One row of the model-output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub conditions: Vec<f64>,
    pub params: Vec<f64>,
    pub output: f64,
}

/// A point that still needs a model evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoint {
    pub conditions: Vec<f64>,
    pub params: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PointKey {
    conditions: Vec<u64>,
    params: Vec<u64>,
}

impl PointKey {
    fn new(conditions: &[f64], params: &[f64]) -> Self {
        Self {
            conditions: conditions.iter().map(|v| v.to_bits()).collect(),
            params: params.iter().map(|v| v.to_bits()).collect(),
        }
    }
}

/// Modeled outputs accumulated across grid generations.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    n_conditions: usize,
    n_params: usize,
    values: HashMap<PointKey, f64>,
}

impl ModelTable {
    pub fn new(n_conditions: usize, n_params: usize) -> Self {
        Self {
            n_conditions,
            n_params,
            values: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn insert(&mut self, point: ModelPoint) -> Result<(), BayesError> {
        if point.conditions.len() != self.n_conditions || point.params.len() != self.n_params {
            return Err(BayesError::data(format!(
                "Model point has {} condition(s) and {} parameter(s), expected {} and {}.",
                point.conditions.len(),
                point.params.len(),
                self.n_conditions,
                self.n_params
            )));
        }
        if !point.output.is_finite() {
            return Err(BayesError::data(format!(
                "Non-finite model output at conditions {:?}, params {:?}.",
                point.conditions, point.params
            )));
        }
        self.values
            .insert(PointKey::new(&point.conditions, &point.params), point.output);
        Ok(())
    }

    pub fn get(&self, conditions: &[f64], params: &[f64]) -> Option<f64> {
        self.values.get(&PointKey::new(conditions, params)).copied()
    }

    /// Every `(box center, condition tuple)` pair of `grid` without a value.
    pub fn missing_points(&self, grid: &Grid, conditions: &ConditionSet) -> Vec<NewPoint> {
        let mut out = Vec::new();
        for b in grid.boxes() {
            for tuple in conditions.iter() {
                if self.get(tuple, &b.center).is_none() {
                    out.push(NewPoint {
                        conditions: tuple.to_vec(),
                        params: b.center.clone(),
                    });
                }
            }
        }
        out
    }

    /// Dense `boxes × conditions` matrix of modeled outputs.
    pub fn output_matrix(
        &self,
        grid: &Grid,
        conditions: &ConditionSet,
    ) -> Result<DMatrix<f64>, BayesError> {
        let mut matrix = DMatrix::<f64>::zeros(grid.len(), conditions.len());
        let mut missing = 0usize;
        let mut example = None;
        for (id, b) in grid.boxes().iter().enumerate() {
            for (c, tuple) in conditions.iter().enumerate() {
                match self.get(tuple, &b.center) {
                    Some(v) => matrix[(id, c)] = v,
                    None => {
                        missing += 1;
                        if example.is_none() {
                            example = Some(format!("conditions {tuple:?}, params {:?}", b.center));
                        }
                    }
                }
            }
        }
        match example {
            Some(example) => Err(BayesError::IncompleteModelData { missing, example }),
            None => Ok(matrix),
        }
    }

    /// Evaluate `points` with `model` in parallel and store the results.
    pub fn evaluate_points<M>(&mut self, model: &M, points: &[NewPoint]) -> Result<usize, BayesError>
    where
        M: ForwardModel + Sync + ?Sized,
    {
        let evaluated: Vec<ModelPoint> = points
            .par_iter()
            .map(|p| {
                model.evaluate(&p.conditions, &p.params).map(|output| ModelPoint {
                    conditions: p.conditions.clone(),
                    params: p.params.clone(),
                    output,
                })
            })
            .collect::<Result<_, _>>()?;

        let n = evaluated.len();
        for point in evaluated {
            self.insert(point)?;
        }
        debug!(evaluated = n, table = self.len(), "filled model points");
        Ok(n)
    }

    /// Drop entries no longer referenced by `grid` × `conditions`.
    pub fn retain_grid(&mut self, grid: &Grid, conditions: &ConditionSet) {
        let live: std::collections::HashSet<PointKey> = grid
            .boxes()
            .iter()
            .flat_map(|b| conditions.iter().map(move |t| PointKey::new(t, &b.center)))
            .collect();
        self.values.retain(|k, _| live.contains(k));
    }
}

impl ForwardModel for ModelTable {
    fn evaluate(&self, conditions: &[f64], params: &[f64]) -> Result<f64, BayesError> {
        self.get(conditions, params)
            .ok_or_else(|| BayesError::IncompleteModelData {
                missing: 1,
                example: format!("conditions {conditions:?}, params {params:?}"),
            })
    }
}
