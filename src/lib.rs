//! `gridbayes` library crate.
//!
//! Bayesian parameter estimation for expensive forward models on an
//! adaptively refined grid:
//!
//! - declare fit parameters and experimental conditions (`space`)
//! - attach observations and modeled outputs (`data`)
//! - run shuffled, cycle-averaged Bayesian updates (`fit`)
//! - subdivide around the probable region and repeat
//!
//! [`pipeline::Estimator`] ties the stages together; the individual modules
//! stay usable on their own.

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod pipeline;
pub mod report;
pub mod space;
