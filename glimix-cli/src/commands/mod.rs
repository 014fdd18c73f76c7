pub mod fit_kron2sum;
pub mod fit_lmm;
pub mod fit_mtlmm;
pub mod inputs;
pub mod scan;
pub mod summary;
