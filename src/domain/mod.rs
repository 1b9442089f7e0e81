//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - problem declarations (`FitParameter`, `ExperimentalCondition`, `OutputVariable`)
//! - run options (`InferenceConfig`, `ObservationConfig`, `SubdivideConfig`, `ThinningConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
