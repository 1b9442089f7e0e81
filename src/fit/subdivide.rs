//! Grid refinement around the probable region.
//!
//! Responsibilities:
//!
//! - keep boxes above `threshold_prob` plus their one-step neighbors
//! - halve every kept box along each axis still wider than twice `min_width`
//! - drop everything else, mass included
//! - list the `(center, conditions)` points the forward model must fill next

use std::collections::BTreeSet;

use tracing::info;

use crate::data::{ConditionSet, ModelTable, NewPoint};
use crate::domain::SubdivideConfig;
use crate::error::BayesError;
use crate::fit::pmf::Pmf;
use crate::space::{BoxId, Grid};

/// Output of one subdivision round.
#[derive(Debug, Clone)]
pub struct Subdivision {
    /// Next grid generation.
    pub grid: Grid,
    /// Parent box (in the previous generation) of every new box.
    pub parents: Vec<BoxId>,
    /// Parent mass split evenly between its children. Not renormalized: the
    /// sum is one minus the mass of the discarded boxes.
    pub carried: Vec<f64>,
    pub kept: usize,
    pub discarded: usize,
    pub discarded_mass: f64,
    /// Points of the new grid missing from the model table.
    pub new_points: Vec<NewPoint>,
}

/// Refine `grid` according to `pmf`.
pub fn subdivide(
    grid: &Grid,
    pmf: &Pmf,
    table: &ModelTable,
    conditions: &ConditionSet,
    config: &SubdivideConfig,
) -> Result<Subdivision, BayesError> {
    config.validate()?;
    if pmf.len() != grid.len() {
        return Err(BayesError::data(format!(
            "Probability table has {} boxes, grid has {}.",
            pmf.len(),
            grid.len()
        )));
    }

    let seeds: Vec<BoxId> = (0..grid.len())
        .filter(|&id| pmf.get(id) > config.threshold_prob)
        .collect();
    if seeds.is_empty() {
        return Err(BayesError::NoConcentration {
            threshold: config.threshold_prob,
        });
    }

    let mut keep: BTreeSet<BoxId> = seeds.iter().copied().collect();
    for &id in &seeds {
        keep.extend(grid.neighbors(id));
    }

    let params = grid.params();
    let mut bounds = Vec::new();
    let mut parents = Vec::new();
    let mut carried = Vec::new();

    for &id in &keep {
        let b = &grid.boxes()[id];
        // Per-axis pieces: either the whole span or its two halves.
        let pieces: Vec<Vec<(f64, f64)>> = params
            .iter()
            .enumerate()
            .map(|(a, p)| {
                let (lo, hi) = (b.lo[a], b.hi[a]);
                if p.can_split(lo, hi) {
                    let mid = p.spacing.midpoint(lo, hi);
                    vec![(lo, mid), (mid, hi)]
                } else {
                    vec![(lo, hi)]
                }
            })
            .collect();

        let n_children: usize = pieces.iter().map(Vec::len).product();
        let share = pmf.get(id) / n_children as f64;
        let mut counter = vec![0usize; pieces.len()];
        for _ in 0..n_children {
            let lo = counter.iter().enumerate().map(|(a, &k)| pieces[a][k].0).collect();
            let hi = counter.iter().enumerate().map(|(a, &k)| pieces[a][k].1).collect();
            bounds.push((lo, hi));
            parents.push(id);
            carried.push(share);

            for a in (0..pieces.len()).rev() {
                counter[a] += 1;
                if counter[a] < pieces[a].len() {
                    break;
                }
                counter[a] = 0;
            }
        }
    }

    let discarded = grid.len() - keep.len();
    let discarded_mass: f64 = (0..grid.len())
        .filter(|id| !keep.contains(id))
        .map(|id| pmf.get(id))
        .sum();

    let next = Grid::from_bounds(grid.generation() + 1, params.to_vec(), bounds)?;
    let new_points = table.missing_points(&next, conditions);

    info!(
        generation = next.generation(),
        seeds = seeds.len(),
        kept = keep.len(),
        discarded,
        discarded_mass,
        boxes = next.len(),
        new_points = new_points.len(),
        "subdivided grid"
    );

    Ok(Subdivision {
        grid: next,
        parents,
        carried,
        kept: keep.len(),
        discarded,
        discarded_mass,
        new_points,
    })
}
