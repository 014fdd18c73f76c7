//! glimix-io: Text input for glimix-rs
//!
//! Reads the labelled matrices the models consume (phenotypes,
//! covariates, kinship, `G` and candidate markers) from tab or space
//! delimited files, and aligns them on shared sample IDs.
//! Missing marker calls are mean-imputed rather than dropping samples.

pub mod imputation;
pub mod matrix_file;
pub mod sample;

pub use imputation::impute_missing_mean;
pub use matrix_file::{read_matrix_file, LabeledMatrix};
pub use sample::{align_inputs, intersect_samples, AlignedInputs, SampleIntersection};
