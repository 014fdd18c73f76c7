//! glimix-core: Linear mixed models for glimix-rs
//!
//! Implements maximum-likelihood and restricted maximum-likelihood
//! estimation of linear mixed models:
//!
//! - [`Lmm`]: single-trait model `y ~ N(Xβ, s((1-δ)K + δI))`
//! - [`FastScanner`]: association scan of candidate covariates against a
//!   fitted single-trait model
//! - [`MtLmm`]: several traits sharing the variance components
//! - [`Kron2Sum`]: multi-trait model with covariance `C₀ ⊗ GG' + C₁ ⊗ I`
//! - [`RKron2Sum`]: restricted-likelihood variant of `Kron2Sum`
//!
//! Supporting modules provide the covariance and mean functions, the
//! numerical optimisers, and fitted-model persistence.

pub mod cov;
pub mod error;
pub mod lmm;
pub mod mean;
pub mod model;
pub mod optim;
pub mod util;

pub use error::{LmmError, Result};
pub use lmm::{FastScanner, Kron2Sum, Lmm, MtLmm, RKron2Sum};
