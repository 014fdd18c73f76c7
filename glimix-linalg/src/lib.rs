//! glimix-linalg: Linear algebra wrappers for glimix-rs
//!
//! Provides the dense matrix type, Cholesky and symmetric
//! eigendecompositions, and the economic eigendecomposition of kinship
//! matrices used by every mixed model in glimix-core.

pub mod decomposition;
pub mod dense;
pub mod economic;

pub use decomposition::{CholeskyDecomp, LinalgError, SymmetricEigen};
pub use dense::DenseMatrix;
pub use economic::EconomicQs;
