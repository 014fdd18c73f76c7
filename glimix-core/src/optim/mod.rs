//! Numerical optimisers used to fit the variance parameters.

pub mod brent;
pub mod lbfgs;

pub use brent::{brent, BrentConfig, BrentResult};
pub use lbfgs::{lbfgs, LbfgsConfig, LbfgsResult};
