//! Scaled identity `s I`.

use super::{Covariance, LOG_SCALE_BOUNDS};
use crate::util::math::tiny;
use glimix_linalg::DenseMatrix;

#[derive(Debug, Clone)]
pub struct EyeCov {
    dim: usize,
    logscale: f64,
}

impl EyeCov {
    pub fn new(dim: usize) -> Self {
        Self { dim, logscale: 0.0 }
    }

    pub fn scale(&self) -> f64 {
        self.logscale.exp()
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.logscale = scale.max(tiny()).ln();
    }
}

impl Covariance for EyeCov {
    fn dim(&self) -> usize {
        self.dim
    }

    fn value(&self) -> DenseMatrix {
        DenseMatrix::identity(self.dim).scale(self.scale())
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
