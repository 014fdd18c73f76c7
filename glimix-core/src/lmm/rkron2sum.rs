//! Restricted maximum likelihood for the Kronecker sum model.
//!
//! The restricted likelihood (LaMotte 2007) integrates out the effect
//! sizes:
//!
//! ```text
//! 2 lml = -(np - cq) log 2π + log|M'M| - log|K| - log|M'K⁻¹M| - r'K⁻¹r
//! ```
//!
//! with `M = A ⊗ F` and `r = y - M vec(B̂)`.

use glimix_linalg::DenseMatrix;

use super::kron2sum::{Kron2Sum, Kron2SumFitResult};
use crate::cov::Kron2SumCov;
use crate::error::Result;
use crate::mean::KronMean;
use crate::optim::LbfgsConfig;

/// Kronecker-structured multi-trait LMM, fitted by restricted maximum
/// likelihood.
#[derive(Debug, Clone)]
pub struct RKron2Sum {
    inner: Kron2Sum,
}

impl RKron2Sum {
    /// Same arguments as [`Kron2Sum::new`].
    pub fn new(
        y: &DenseMatrix,
        a: &DenseMatrix,
        f: &DenseMatrix,
        g: &DenseMatrix,
        rank: usize,
    ) -> Result<Self> {
        Ok(Self {
            inner: Kron2Sum::build(y, a, f, g, rank, true)?,
        })
    }

    pub fn lml(&self) -> f64 {
        self.inner.lml()
    }

    pub fn lml_gradient(&self) -> Vec<f64> {
        self.inner.lml_gradient()
    }

    pub fn fit(&mut self, config: &LbfgsConfig) -> Result<Kron2SumFitResult> {
        self.inner.fit(config)
    }

    pub fn params(&self) -> Vec<f64> {
        self.inner.params()
    }

    pub fn set_params(&mut self, params: &[f64]) -> Result<()> {
        self.inner.set_params(params)
    }

    pub fn param_names(&self) -> Vec<String> {
        self.inner.param_names()
    }

    pub fn mean(&self) -> &KronMean {
        self.inner.mean()
    }

    pub fn cov(&self) -> &Kron2SumCov {
        self.inner.cov()
    }

    pub fn beta(&self) -> &DenseMatrix {
        self.inner.beta()
    }

    pub fn beta_covariance(&self) -> DenseMatrix {
        self.inner.beta_covariance()
    }

    pub fn z(&self) -> Vec<f64> {
        self.inner.z()
    }

    pub fn nsamples(&self) -> usize {
        self.inner.nsamples()
    }

    pub fn ntraits(&self) -> usize {
        self.inner.ntraits()
    }

    pub fn ncovariates(&self) -> usize {
        self.inner.ncovariates()
    }

    /// The shared model state.
    pub fn as_kron2sum(&self) -> &Kron2Sum {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::kron2sum::tests::{check_gradient, dense_reference, perturbed_params, simulate};

    #[test]
    fn test_reml_matches_dense() {
        let d = simulate(12, 3, 3, 21);
        let mut model = RKron2Sum::new(&d.y, &d.a, &d.f, &d.g, 2).unwrap();
        model.set_params(&perturbed_params(model.params().len())).unwrap();
        let (_, reml, b, _) = dense_reference(model.as_kron2sum());
        assert!((model.lml() - reml).abs() < 1e-7, "{} vs {}", model.lml(), reml);
        for (x, y) in model.beta().to_col_major().iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-7);
        }
    }

    #[test]
    fn test_reml_with_trait_design() {
        let d = simulate(10, 3, 2, 22);
        let model = RKron2Sum::new(&d.y, &d.a, &d.f, &d.g, 2).unwrap();
        let (_, reml, _, _) = dense_reference(model.as_kron2sum());
        assert!((model.lml() - reml).abs() < 1e-7);
    }

    #[test]
    fn test_reml_gradient() {
        let d = simulate(10, 2, 2, 23);
        let mut model = RKron2Sum::new(&d.y, &d.a, &d.f, &d.g, 1).unwrap();
        model.set_params(&perturbed_params(model.params().len())).unwrap();
        check_gradient(&mut model.inner);
    }

    #[test]
    fn test_reml_gradient_trait_design() {
        let d = simulate(9, 3, 2, 24);
        let mut model = RKron2Sum::new(&d.y, &d.a, &d.f, &d.g, 2).unwrap();
        check_gradient(&mut model.inner);
    }

    #[test]
    fn test_reml_fit() {
        let d = simulate(25, 2, 2, 25);
        let mut model = RKron2Sum::new(&d.y, &d.a, &d.f, &d.g, 1).unwrap();
        let before = model.lml();
        let res = model.fit(&LbfgsConfig::default()).unwrap();
        assert!(res.lml >= before);
        let (_, reml, _, _) = dense_reference(model.as_kron2sum());
        assert!((model.lml() - reml).abs() < 1e-6);
    }
}
