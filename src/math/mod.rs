//! Numerical utilities: grid spacing and the Gaussian likelihood kernel.

pub mod gaussian;
pub mod spacing;

pub use gaussian::*;
pub use spacing::*;
