//! Model uncertainty from grid coarseness.
//!
//! For each box and condition tuple the uncertainty is the largest absolute
//! change in modeled output between the box and any box adjacent to it along
//! a single fit-parameter axis. Boxes on the edge of the grid only compare
//! against the neighbors that exist.

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::warn;

use crate::error::BayesError;
use crate::space::{BoxId, Grid};

/// Non-negative `boxes × conditions` table of model uncertainties.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUncertainty {
    values: DMatrix<f64>,
    isolated: usize,
}

impl ModelUncertainty {
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn get(&self, id: BoxId, condition: usize) -> f64 {
        self.values[(id, condition)]
    }

    /// Boxes with no neighbor at all; their uncertainty is reported as zero.
    pub fn isolated_boxes(&self) -> usize {
        self.isolated
    }
}

/// Estimate model uncertainty for every `(box, condition)` pair.
///
/// `outputs` is the dense `boxes × conditions` matrix of modeled outputs for
/// `grid`.
pub fn estimate_model_uncertainty(
    grid: &Grid,
    outputs: &DMatrix<f64>,
) -> Result<ModelUncertainty, BayesError> {
    if outputs.nrows() != grid.len() {
        return Err(BayesError::data(format!(
            "Output table has {} rows for {} boxes.",
            outputs.nrows(),
            grid.len()
        )));
    }
    let n_cond = outputs.ncols();

    let rows: Vec<(Vec<f64>, bool)> = (0..grid.len())
        .into_par_iter()
        .map(|id| {
            let neighbors = grid.neighbors(id);
            let mut row = vec![0.0; n_cond];
            for (c, slot) in row.iter_mut().enumerate() {
                let here = outputs[(id, c)];
                *slot = neighbors
                    .iter()
                    .map(|&nb| (outputs[(nb, c)] - here).abs())
                    .fold(0.0, f64::max);
            }
            (row, neighbors.is_empty())
        })
        .collect();

    let isolated = rows.iter().filter(|(_, alone)| *alone).count();
    if isolated > 0 {
        warn!(
            isolated,
            boxes = grid.len(),
            "model uncertainty undefined for boxes without neighbors; using zero"
        );
    }

    let flat: Vec<f64> = rows.into_iter().flat_map(|(row, _)| row).collect();
    Ok(ModelUncertainty {
        values: DMatrix::from_row_slice(grid.len(), n_cond, &flat),
        isolated,
    })
}
