//! Fixed matrix scaled by a free parameter: `s K0`.

use super::{Covariance, LOG_SCALE_BOUNDS};
use crate::util::math::tiny;
use glimix_linalg::DenseMatrix;

#[derive(Debug, Clone)]
pub struct GivenCov {
    k0: DenseMatrix,
    logscale: f64,
}

impl GivenCov {
    pub fn new(k0: DenseMatrix) -> Self {
        assert!(k0.is_square(), "GivenCov requires a square matrix");
        Self { k0, logscale: 0.0 }
    }

    pub fn scale(&self) -> f64 {
        self.logscale.exp()
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.logscale = scale.max(tiny()).ln();
    }

    pub fn k0(&self) -> &DenseMatrix {
        &self.k0
    }
}

impl Covariance for GivenCov {
    fn dim(&self) -> usize {
        self.k0.nrows()
    }

    fn value(&self) -> DenseMatrix {
        self.k0.scale(self.scale())
    }

    fn params(&self) -> Vec<f64> {
        vec![self.logscale]
    }

    fn set_params(&mut self, params: &[f64]) {
        assert_eq!(params.len(), 1);
        self.logscale = params[0];
    }

    fn gradient(&self) -> Vec<DenseMatrix> {
        vec![self.value()]
    }

    fn param_names(&self) -> Vec<String> {
        vec!["logscale".to_string()]
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![LOG_SCALE_BOUNDS]
    }
}
