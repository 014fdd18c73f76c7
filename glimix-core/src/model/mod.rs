pub mod fitted;
pub mod report;
pub mod serialization;

pub use fitted::{FittedModel, ModelKind};
