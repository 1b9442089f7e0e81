//! Adaptive-grid Bayesian inference.
//!
//! Responsibilities:
//!
//! - estimate model uncertainty from neighboring boxes
//! - hold and update the probability table
//! - run the shuffled cycle-and-average inference loop
//! - refine the grid around the probable region

pub mod inference;
pub mod pmf;
pub mod subdivide;
pub mod uncertainty;

pub use inference::*;
pub use pmf::*;
pub use subdivide::*;
pub use uncertainty::*;
