//! Mean functions.

pub mod kron;
pub mod linear;

pub use kron::KronMean;
pub use linear::LinearMean;
