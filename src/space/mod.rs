//! Parameter space declarations and the box grid built over them.

pub mod grid;
pub mod params;

pub use grid::*;
pub use params::*;
