//! Multi-trait linear mixed model with shared variance components.
//!
//! `p` traits measured on the same `n` samples are stacked trait by trait:
//!
//! ```text
//! vec(Y) ~ N(blockdiag(X₁, ..., X_p) vec(β), s((1-δ)(I_p ⊗ K) + δI))
//! ```
//!
//! Each trait has its own fixed effects while δ and s are shared.

use glimix_linalg::{DenseMatrix, EconomicQs};
use tracing::info;

use super::single_trait::{Lmm, LmmFitConfig, LmmFitResult};
use crate::error::{check_rows, LmmError, Result};
use crate::util::math::all_finite;

/// Multi-trait linear mixed model.
#[derive(Debug, Clone)]
pub struct MtLmm {
    lmm: Lmm,
    nsamples: usize,
    ncovariates: Vec<usize>,
}

impl MtLmm {
    /// `xs` holds either one design matrix shared by every trait or one
    /// per trait.
    pub fn new(
        ys: &[Vec<f64>],
        xs: &[DenseMatrix],
        qs: Option<&EconomicQs>,
        restricted: bool,
    ) -> Result<Self> {
        let p = ys.len();
        if p == 0 {
            return Err(LmmError::Empty);
        }
        let n = ys[0].len();
        if n == 0 {
            return Err(LmmError::Empty);
        }
        for y in ys {
            check_rows("trait", n, y.len())?;
            if !all_finite(y) {
                return Err(LmmError::NonFinite("outcome"));
            }
        }
        if xs.len() != 1 && xs.len() != p {
            return Err(LmmError::InvalidArgument(format!(
                "expected 1 or {} covariate matrices, got {}",
                p,
                xs.len()
            )));
        }
        for x in xs {
            check_rows("covariates", n, x.nrows())?;
            if !x.is_finite() {
                return Err(LmmError::NonFinite("covariates"));
            }
        }
        if let Some(qs) = qs {
            check_rows("QS", n, qs.nsamples())?;
        }

        let designs: Vec<&DenseMatrix> = (0..p).map(|i| if xs.len() == 1 { &xs[0] } else { &xs[i] }).collect();
        let ncovariates: Vec<usize> = designs.iter().map(|x| x.ncols()).collect();
        let total: usize = ncovariates.iter().sum();

        let mut x = DenseMatrix::zeros(n * p, total);
        let mut offset = 0;
        for (t, design) in designs.iter().enumerate() {
            for j in 0..design.ncols() {
                for i in 0..n {
                    x.set(t * n + i, offset + j, design.get(i, j));
                }
            }
            offset += design.ncols();
        }

        let y: Vec<f64> = ys.iter().flat_map(|y| y.iter().cloned()).collect();
        let stacked_qs = match qs {
            Some(qs) => qs.repeat_block_diagonal(p),
            None => EconomicQs::empty(n * p),
        };

        info!("Pooling {} traits over {} samples", p, n);
        let lmm = Lmm::new(&y, &x, Some(&stacked_qs), restricted)?;
        Ok(Self {
            lmm,
            nsamples: n,
            ncovariates,
        })
    }

    pub fn fit(&mut self, config: &LmmFitConfig) -> Result<LmmFitResult> {
        self.lmm.fit(config)
    }

    pub fn lml(&self) -> f64 {
        self.lmm.lml()
    }

    /// Fixed effects split per trait.
    pub fn beta(&self) -> Vec<Vec<f64>> {
        let beta = self.lmm.beta();
        let mut out = Vec::with_capacity(self.ntraits());
        let mut offset = 0;
        for &c in &self.ncovariates {
            out.push(beta[offset..offset + c].to_vec());
            offset += c;
        }
        out
    }

    pub fn delta(&self) -> f64 {
        self.lmm.delta()
    }

    pub fn scale(&self) -> f64 {
        self.lmm.scale()
    }

    pub fn ntraits(&self) -> usize {
        self.ncovariates.len()
    }

    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    /// Underlying pooled single-trait model.
    pub fn lmm(&self) -> &Lmm {
        &self.lmm
    }
}
