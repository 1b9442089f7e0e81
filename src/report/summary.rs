//! Posterior summaries over a grid generation.
//!
//! Boxes after subdivision have uneven sizes, so marginals are built on the
//! distinct edges of each axis and every box spreads its mass over the bins
//! it spans in proportion to width (measured in the axis' spacing).

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::BayesError;
use crate::fit::Pmf;
use crate::space::{BoxId, Grid};

/// One box with its mass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub id: BoxId,
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
    pub center: Vec<f64>,
    pub probability: f64,
}

/// Posterior location and spread of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamEstimate {
    pub name: String,
    /// Posterior mean, averaged in the axis' spacing (log10 for log axes).
    pub mean: f64,
    /// Standard deviation in the axis' spacing (decades for log axes).
    pub spread: f64,
    /// Center of the most probable box.
    pub best: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalBin {
    pub lo: f64,
    pub hi: f64,
    pub probability: f64,
}

/// Joint marginal over two axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Marginal2d {
    pub edges_a: Vec<f64>,
    pub edges_b: Vec<f64>,
    /// `bins_a × bins_b` masses.
    pub probs: DMatrix<f64>,
}

/// Flat probability-table row: per-parameter `[min, max, center]` plus mass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityRow {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub center: Vec<f64>,
    pub probability: f64,
}

fn check(grid: &Grid, pmf: &Pmf) -> Result<(), BayesError> {
    if grid.len() != pmf.len() {
        return Err(BayesError::data(format!(
            "Probability table has {} boxes, grid has {}.",
            pmf.len(),
            grid.len()
        )));
    }
    Ok(())
}

fn check_axis(grid: &Grid, axis: usize) -> Result<(), BayesError> {
    if axis >= grid.dim() {
        return Err(BayesError::config(format!(
            "Axis {axis} out of range for a {}-parameter grid.",
            grid.dim()
        )));
    }
    Ok(())
}

/// The `n` most probable boxes, most probable first.
pub fn most_probable(grid: &Grid, pmf: &Pmf, n: usize) -> Result<Vec<BoxSummary>, BayesError> {
    check(grid, pmf)?;
    Ok(pmf
        .ranked()
        .into_iter()
        .take(n)
        .map(|id| {
            let b = &grid.boxes()[id];
            BoxSummary {
                id,
                lo: b.lo.clone(),
                hi: b.hi.clone(),
                center: b.center.clone(),
                probability: pmf.get(id),
            }
        })
        .collect())
}

pub fn parameter_estimates(grid: &Grid, pmf: &Pmf) -> Result<Vec<ParamEstimate>, BayesError> {
    check(grid, pmf)?;
    let total = pmf.total();
    if !(total.is_finite() && total > 0.0) {
        return Err(BayesError::data("Probability table carries no mass."));
    }
    let best = pmf
        .argmax()
        .ok_or_else(|| BayesError::data("Probability table is empty."))?;

    let mut out = Vec::with_capacity(grid.dim());
    for (a, param) in grid.params().iter().enumerate() {
        let spacing = param.spacing;
        let mut mean_u = 0.0;
        for (id, b) in grid.boxes().iter().enumerate() {
            mean_u += pmf.get(id) * spacing.to_uniform(b.center[a]);
        }
        mean_u /= total;
        let mut var_u = 0.0;
        for (id, b) in grid.boxes().iter().enumerate() {
            let d = spacing.to_uniform(b.center[a]) - mean_u;
            var_u += pmf.get(id) * d * d;
        }
        var_u /= total;
        out.push(ParamEstimate {
            name: param.name.clone(),
            mean: spacing.from_uniform(mean_u),
            spread: var_u.sqrt(),
            best: grid.boxes()[best].center[a],
        });
    }
    Ok(out)
}

/// Share of each box's width (in the axis' spacing) falling in every bin it spans.
fn bin_shares(grid: &Grid, id: BoxId, axis: usize) -> Vec<(usize, f64)> {
    let spacing = grid.params()[axis].spacing;
    let edges = grid.edges(axis);
    let (lo, hi) = grid.edge_span(id, axis);
    let width = spacing.width(edges[lo], edges[hi]);
    (lo..hi)
        .map(|bin| (bin, spacing.width(edges[bin], edges[bin + 1]) / width))
        .collect()
}

pub fn marginal_1d(grid: &Grid, pmf: &Pmf, axis: usize) -> Result<Vec<MarginalBin>, BayesError> {
    check(grid, pmf)?;
    check_axis(grid, axis)?;
    let edges = grid.edges(axis);
    let mut probs = vec![0.0; edges.len() - 1];
    for id in 0..grid.len() {
        for (bin, share) in bin_shares(grid, id, axis) {
            probs[bin] += pmf.get(id) * share;
        }
    }
    Ok(edges
        .windows(2)
        .zip(probs)
        .map(|(w, probability)| MarginalBin {
            lo: w[0],
            hi: w[1],
            probability,
        })
        .collect())
}

pub fn marginal_2d(grid: &Grid, pmf: &Pmf, a: usize, b: usize) -> Result<Marginal2d, BayesError> {
    check(grid, pmf)?;
    check_axis(grid, a)?;
    check_axis(grid, b)?;
    if a == b {
        return Err(BayesError::config("A 2-D marginal needs two distinct axes."));
    }
    let edges_a = grid.edges(a).to_vec();
    let edges_b = grid.edges(b).to_vec();
    let mut probs = DMatrix::<f64>::zeros(edges_a.len() - 1, edges_b.len() - 1);
    for id in 0..grid.len() {
        let shares_b = bin_shares(grid, id, b);
        for (bin_a, share_a) in bin_shares(grid, id, a) {
            for &(bin_b, share_b) in &shares_b {
                probs[(bin_a, bin_b)] += pmf.get(id) * share_a * share_b;
            }
        }
    }
    Ok(Marginal2d {
        edges_a,
        edges_b,
        probs,
    })
}

pub fn probability_rows(grid: &Grid, pmf: &Pmf) -> Result<Vec<ProbabilityRow>, BayesError> {
    check(grid, pmf)?;
    Ok(grid
        .boxes()
        .iter()
        .enumerate()
        .map(|(id, b)| ProbabilityRow {
            min: b.lo.clone(),
            max: b.hi.clone(),
            center: b.center.clone(),
            probability: pmf.get(id),
        })
        .collect())
}
