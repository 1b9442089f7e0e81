//! Probability mass over the boxes of one grid generation.
//!
//! The table never creates or destroys boxes: it holds one mass per
//! [`BoxId`] of the grid it was built for, and subdivision hands it a new
//! grid when the partition changes.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::BayesError;
use crate::space::{BoxId, Grid};

/// Tolerance on `sum == 1` for a normalized table.
pub const NORM_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Pmf {
    generation: u32,
    probs: Vec<f64>,
}

impl Pmf {
    /// Uniform distribution over `grid`.
    pub fn uniform(grid: &Grid) -> Self {
        let mut pmf = Self {
            generation: grid.generation(),
            probs: Vec::new(),
        };
        pmf.initialize_uniform(grid);
        pmf
    }

    /// Wrap raw masses. They need not sum to one.
    pub fn from_probs(generation: u32, probs: Vec<f64>) -> Result<Self, BayesError> {
        if probs.is_empty() {
            return Err(BayesError::data("A probability table needs at least one box."));
        }
        if let Some(bad) = probs.iter().find(|p| !(p.is_finite() && **p >= 0.0)) {
            return Err(BayesError::data(format!(
                "Probability masses must be finite and >= 0, got {bad}."
            )));
        }
        Ok(Self { generation, probs })
    }

    pub fn initialize_uniform(&mut self, grid: &Grid) {
        let n = grid.len();
        self.generation = grid.generation();
        self.probs = vec![1.0 / n as f64; n];
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn get(&self, id: BoxId) -> f64 {
        self.probs[id]
    }

    pub fn total(&self) -> f64 {
        self.probs.iter().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= NORM_TOL
    }

    /// Scale so the masses sum to one.
    pub fn normalize(&mut self) -> Result<(), BayesError> {
        let total = self.total();
        if !(total.is_finite() && total > 0.0) {
            return Err(BayesError::data(format!(
                "Cannot normalize a table with total mass {total}."
            )));
        }
        for p in &mut self.probs {
            *p /= total;
        }
        Ok(())
    }

    /// Multiply by one observation's per-box likelihoods and renormalize.
    ///
    /// Returns the evidence (sum of prior × likelihood) before normalization.
    /// An evidence of exactly zero is a `DegenerateUpdate`: the observation
    /// is inconsistent with every box that still carries mass.
    pub fn bayesian_update(&mut self, likelihoods: &[f64]) -> Result<f64, BayesError> {
        if likelihoods.len() != self.probs.len() {
            return Err(BayesError::data(format!(
                "Got {} likelihoods for {} boxes.",
                likelihoods.len(),
                self.probs.len()
            )));
        }
        if likelihoods.iter().any(|l| !(l.is_finite() && *l >= 0.0)) {
            return Err(BayesError::data("Likelihoods must be finite and >= 0."));
        }

        let joint: Vec<f64> = self
            .probs
            .par_iter()
            .zip(likelihoods.par_iter())
            .map(|(p, l)| p * l)
            .collect();

        // The prior stays in place when the update is rejected.
        let evidence: f64 = joint.iter().sum();
        if evidence == 0.0 {
            return Err(BayesError::DegenerateUpdate {
                observation: None,
                detail: "total likelihood is zero on every box".to_string(),
            });
        }
        self.probs = joint.into_iter().map(|p| p / evidence).collect();
        Ok(evidence)
    }

    /// Mass held by the most probable `th_pv` fraction of boxes.
    ///
    /// Boxes are ranked by probability (descending) and the top
    /// `ceil(th_pv × n)` (at least one) are summed, so the result is
    /// non-decreasing in `th_pv`.
    pub fn concentration(&self, th_pv: f64) -> f64 {
        let n = self.probs.len();
        if n == 0 {
            return 0.0;
        }
        let k = ((th_pv.clamp(0.0, 1.0) * n as f64).ceil() as usize).clamp(1, n);
        let mut sorted = self.probs.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        sorted[..k].iter().sum()
    }

    pub fn is_concentrated(&self, th_pm: f64, th_pv: f64) -> bool {
        self.concentration(th_pv) >= th_pm
    }

    /// Elementwise mean of distributions over the same grid.
    pub fn average(distributions: &[Pmf]) -> Result<Pmf, BayesError> {
        let Some(first) = distributions.first() else {
            return Err(BayesError::data("Cannot average zero distributions."));
        };
        let n = first.len();
        if distributions
            .iter()
            .any(|d| d.len() != n || d.generation != first.generation)
        {
            return Err(BayesError::data(
                "Averaged distributions must share one grid generation.",
            ));
        }
        let count = distributions.len() as f64;
        let mut probs = vec![0.0; n];
        for d in distributions {
            for (acc, p) in probs.iter_mut().zip(d.probs.iter()) {
                *acc += p;
            }
        }
        for p in &mut probs {
            *p /= count;
        }
        Ok(Pmf {
            generation: first.generation,
            probs,
        })
    }

    /// `frac × self + (1 − frac) × other`, both over the same grid.
    pub fn mix(&self, other: &Pmf, frac: f64) -> Result<Pmf, BayesError> {
        if self.len() != other.len() {
            return Err(BayesError::data("Mixed distributions must have equal length."));
        }
        let probs = self
            .probs
            .iter()
            .zip(other.probs.iter())
            .map(|(a, b)| frac * a + (1.0 - frac) * b)
            .collect();
        Ok(Pmf {
            generation: self.generation,
            probs,
        })
    }

    /// Most probable box; ties go to the lowest id.
    pub fn argmax(&self) -> Option<BoxId> {
        let mut best: Option<(BoxId, f64)> = None;
        for (id, &p) in self.probs.iter().enumerate() {
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((id, p));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Box ids sorted by probability, most probable first.
    pub fn ranked(&self) -> Vec<BoxId> {
        let mut ids: Vec<BoxId> = (0..self.probs.len()).collect();
        ids.sort_by(|&a, &b| {
            self.probs[b]
                .partial_cmp(&self.probs[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        ids
    }
}
