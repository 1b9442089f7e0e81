//! Reporting: posterior summaries, marginals and text output.

pub mod format;
pub mod summary;

pub use format::*;
pub use summary::*;

use crate::error::BayesError;
use crate::fit::Pmf;
use crate::space::Grid;

/// The probability table as pretty-printed JSON rows.
pub fn probability_table_json(grid: &Grid, pmf: &Pmf) -> Result<String, BayesError> {
    let rows = probability_rows(grid, pmf)?;
    serde_json::to_string_pretty(&rows)
        .map_err(|e| BayesError::data(format!("Failed to encode probability table: {e}")))
}
