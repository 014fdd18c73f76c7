//! Error type shared by the models.

use glimix_linalg::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LmmError {
    #[error("{what}: expected {expected} rows, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{0} contains NaN or infinite values")]
    NonFinite(&'static str),

    #[error("Outcome has no samples")]
    Empty,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

pub type Result<T> = std::result::Result<T, LmmError>;

/// Fail with `DimensionMismatch` unless `got == expected`.
pub(crate) fn check_rows(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(LmmError::DimensionMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}
