//! Linear mixed models.

mod dot;
pub mod fast_scanner;
pub mod kron2sum;
pub mod mt_lmm;
pub mod rkron2sum;
pub mod single_trait;

pub use fast_scanner::{CandidateResult, FastScanner, ScanResult};
pub use kron2sum::{Kron2Sum, Kron2SumFitResult};
pub use mt_lmm::MtLmm;
pub use rkron2sum::RKron2Sum;
pub use single_trait::{Lmm, LmmFitConfig, LmmFitResult, LmmParam};
