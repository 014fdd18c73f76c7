//! FittedModel: the persisted outcome of fitting one of the models.
//!
//! Holds everything needed to report or reuse a fit:
//! - Sample, trait and covariate labels in model order
//! - Log marginal likelihood and optimiser status
//! - Effect sizes and their standard errors
//! - Variance parameters (δ and scale, or the trait covariances C₀ and C₁)

use serde::{Deserialize, Serialize};

use glimix_linalg::DenseMatrix;

use crate::cov::Covariance;
use crate::error::{LmmError, Result};
use crate::lmm::{Kron2Sum, Kron2SumFitResult, Lmm, LmmFitResult, MtLmm, RKron2Sum};

/// Which model produced the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Lmm,
    MtLmm,
    Kron2Sum,
    RKron2Sum,
}

/// A fitted model, serialized to .glimix.model files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    /// Version number for forward compatibility.
    pub version: u32,
    pub kind: ModelKind,
    /// Restricted (REML) or plain likelihood.
    pub restricted: bool,
    /// Sample IDs in model order.
    pub sample_ids: Vec<String>,
    pub trait_names: Vec<String>,
    pub covariate_names: Vec<String>,
    /// Log marginal likelihood at the optimum.
    pub lml: f64,
    /// Effect sizes. Trait by trait for multi-trait fits; `vec(B)` for the
    /// Kronecker models.
    pub beta: Vec<f64>,
    pub beta_se: Vec<f64>,
    /// Residual share of the variance (single-covariance models).
    pub delta: Option<f64>,
    /// Total variance scale (single-covariance models).
    pub scale: Option<f64>,
    /// Genetic trait covariance, flat col-major (p x p).
    pub c0: Option<Vec<f64>>,
    /// Residual trait covariance, flat col-major (p x p).
    pub c1: Option<Vec<f64>>,
    pub converged: bool,
    pub iterations: usize,
}

fn standard_errors(cov: &DenseMatrix) -> Vec<f64> {
    cov.diag().iter().map(|v| v.max(0.0).sqrt()).collect()
}

fn check_labels(what: &'static str, expected: usize, labels: &[String]) -> Result<()> {
    if labels.len() != expected {
        return Err(LmmError::DimensionMismatch {
            what,
            expected,
            got: labels.len(),
        });
    }
    Ok(())
}

impl FittedModel {
    /// Magic bytes: "GLMX".
    pub const MAGIC: [u8; 4] = *b"GLMX";
    /// Current model version.
    pub const VERSION: u32 = 1;

    pub fn from_lmm(
        lmm: &Lmm,
        fit: &LmmFitResult,
        sample_ids: Vec<String>,
        trait_name: String,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        check_labels("sample IDs", lmm.nsamples(), &sample_ids)?;
        check_labels("covariate names", lmm.ncovariates(), &covariate_names)?;
        Ok(Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            kind: ModelKind::Lmm,
            restricted: lmm.is_restricted(),
            sample_ids,
            trait_names: vec![trait_name],
            covariate_names,
            lml: lmm.lml(),
            beta: lmm.beta().to_vec(),
            beta_se: standard_errors(&lmm.beta_covariance()?),
            delta: Some(lmm.delta()),
            scale: Some(lmm.scale()),
            c0: None,
            c1: None,
            converged: fit.converged,
            iterations: fit.iterations,
        })
    }

    pub fn from_mtlmm(
        model: &MtLmm,
        fit: &LmmFitResult,
        sample_ids: Vec<String>,
        trait_names: Vec<String>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        check_labels("sample IDs", model.nsamples(), &sample_ids)?;
        check_labels("trait names", model.ntraits(), &trait_names)?;
        let lmm = model.lmm();
        Ok(Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            kind: ModelKind::MtLmm,
            restricted: lmm.is_restricted(),
            sample_ids,
            trait_names,
            covariate_names,
            lml: model.lml(),
            beta: lmm.beta().to_vec(),
            beta_se: standard_errors(&lmm.beta_covariance()?),
            delta: Some(model.delta()),
            scale: Some(model.scale()),
            c0: None,
            c1: None,
            converged: fit.converged,
            iterations: fit.iterations,
        })
    }

    pub fn from_kron2sum(
        model: &Kron2Sum,
        fit: &Kron2SumFitResult,
        sample_ids: Vec<String>,
        trait_names: Vec<String>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        check_labels("sample IDs", model.nsamples(), &sample_ids)?;
        check_labels("trait names", model.ntraits(), &trait_names)?;
        check_labels("covariate names", model.ncovariates(), &covariate_names)?;
        let cov = model.cov();
        Ok(Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            kind: if model.is_restricted() {
                ModelKind::RKron2Sum
            } else {
                ModelKind::Kron2Sum
            },
            restricted: model.is_restricted(),
            sample_ids,
            trait_names,
            covariate_names,
            lml: model.lml(),
            beta: model.beta().to_col_major(),
            beta_se: standard_errors(&model.beta_covariance()),
            delta: None,
            scale: None,
            c0: Some(cov.c0().value().to_col_major()),
            c1: Some(cov.c1().value().to_col_major()),
            converged: fit.converged,
            iterations: fit.iterations,
        })
    }

    pub fn from_rkron2sum(
        model: &RKron2Sum,
        fit: &Kron2SumFitResult,
        sample_ids: Vec<String>,
        trait_names: Vec<String>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        Self::from_kron2sum(model.as_kron2sum(), fit, sample_ids, trait_names, covariate_names)
    }

    pub fn nsamples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn ntraits(&self) -> usize {
        self.trait_names.len()
    }

    pub fn c0_matrix(&self) -> Option<DenseMatrix> {
        let p = self.ntraits();
        self.c0
            .as_ref()
            .map(|c| DenseMatrix::from_col_major(p, p, c.clone()))
    }

    pub fn c1_matrix(&self) -> Option<DenseMatrix> {
        let p = self.ntraits();
        self.c1
            .as_ref()
            .map(|c| DenseMatrix::from_col_major(p, p, c.clone()))
    }

    /// Share of variance due to the random effect, `1 - δ`.
    pub fn heritability(&self) -> Option<f64> {
        self.delta.map(|d| 1.0 - d)
    }
}
