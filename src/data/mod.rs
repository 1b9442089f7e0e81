//! Data inputs: observations, modeled outputs and a reference forward model.

pub mod diode;
pub mod model_table;
pub mod observations;

pub use diode::*;
pub use model_table::*;
pub use observations::*;
