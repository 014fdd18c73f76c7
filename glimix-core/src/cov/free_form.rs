//! General positive definite matrix `L L' + εI`.
//!
//! `L` is lower triangular. Its entries are stored row by row
//! (`(0,0), (1,0), (1,1), (2,0), ...`) with the diagonal kept as logs so
//! that it stays positive.

use super::{outer_product_derivative, Covariance, LOG_SCALE_BOUNDS};
use crate::error::{LmmError, Result};
use glimix_linalg::{CholeskyDecomp, DenseMatrix, SymmetricEigen};

#[derive(Debug, Clone)]
pub struct FreeFormCov {
    dim: usize,
    lu: Vec<f64>,
    epsilon: f64,
}

/// Lower-triangular positions in parameter order.
fn tril_indices(dim: usize) -> Vec<(usize, usize)> {
    (0..dim).flat_map(|i| (0..=i).map(move |j| (i, j))).collect()
}

impl FreeFormCov {
    /// Starts at `L = I`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            lu: vec![0.0; dim * (dim + 1) / 2],
            epsilon: 1000.0 * f64::EPSILON.sqrt(),
        }
    }

    /// Diagonal jitter added to `L L'`.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Lower-triangular factor.
    pub fn l(&self) -> DenseMatrix {
        let mut l = DenseMatrix::zeros(self.dim, self.dim);
        for (k, (i, j)) in tril_indices(self.dim).into_iter().enumerate() {
            let v = if i == j { self.lu[k].exp() } else { self.lu[k] };
            l.set(i, j, v);
        }
        l
    }

    /// Set the factor from the lower triangle of `l`.
    pub fn set_l(&mut self, l: &DenseMatrix) -> Result<()> {
        if l.nrows() != self.dim || l.ncols() != self.dim {
            return Err(LmmError::InvalidArgument(format!(
                "expected a {0}x{0} factor, got {1}x{2}",
                self.dim,
                l.nrows(),
                l.ncols()
            )));
        }
        let mut lu = Vec::with_capacity(self.lu.len());
        for (i, j) in tril_indices(self.dim) {
            let v = l.get(i, j);
            if i == j {
                if v <= 0.0 || v.is_nan() {
                    return Err(LmmError::InvalidArgument(format!(
                        "diagonal entry {} of the factor must be positive",
                        i
                    )));
                }
                lu.push(v.ln());
            } else {
                lu.push(v);
            }
        }
        self.lu = lu;
        Ok(())
    }

    pub fn eigh(&self) -> Result<SymmetricEigen> {
        Ok(SymmetricEigen::new(&self.value())?)
    }

    pub fn logdet(&self) -> Result<f64> {
        Ok(CholeskyDecomp::new(&self.value())?.logdet())
    }
}

impl Covariance for FreeFormCov {
    fn dim(&self) -> usize {
        self.dim
    }

    fn value(&self) -> DenseMatrix {
        let l = self.l();
        let mut k = l.mat_mul(&l.transpose());
        for i in 0..self.dim {
            k.set(i, i, k.get(i, i) + self.epsilon);
        }
        k.symmetrize();
        k
    }

    fn params(&self) -> Vec<f64> {
        self.lu.clone()
    }

    fn set_params(&mut self, params: &[f64]) {
        assert_eq!(params.len(), self.lu.len());
        self.lu.copy_from_slice(params);
    }

    fn gradient(&self) -> Vec<DenseMatrix> {
        let l = self.l();
        tril_indices(self.dim)
            .into_iter()
            .map(|(i, j)| {
                // d exp(u) / du = exp(u) on the diagonal
                let factor = if i == j { l.get(i, i) } else { 1.0 };
                outer_product_derivative(&l, i, j, factor)
            })
            .collect()
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.lu.len()).map(|k| format!("Lu[{}]", k)).collect()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        tril_indices(self.dim)
            .into_iter()
            .map(|(i, j)| {
                if i == j {
                    LOG_SCALE_BOUNDS
                } else {
                    (f64::NEG_INFINITY, f64::INFINITY)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cov::testing::check_gradient;

    #[test]
    fn test_free_form_default_is_identity() {
        let cov = FreeFormCov::new(3);
        assert_eq!(cov.n_params(), 6);
        let expected = DenseMatrix::identity(3).scale(1.0 + cov.epsilon());
        assert!(cov.value().max_abs_diff(&expected) < 1e-12);
    }

    #[test]
    fn test_free_form_set_l() {
        let mut cov = FreeFormCov::new(2);
        let l = DenseMatrix::from_row_major(2, 2, &[1.0, 0.0, 2.0, 1.5]);
        cov.set_l(&l).unwrap();
        assert!(cov.l().max_abs_diff(&l) < 1e-12);

        // params: log(1), 2, log(1.5)
        let p = cov.params();
        assert!(p[0].abs() < 1e-12);
        assert!((p[1] - 2.0).abs() < 1e-12);
        assert!((p[2] - 1.5f64.ln()).abs() < 1e-12);

        let k = cov.value();
        assert!((k.get(1, 0) - 2.0).abs() < 1e-12);
        assert!((k.get(1, 1) - (4.0 + 2.25 + cov.epsilon())).abs() < 1e-12);
    }

    #[test]
    fn test_free_form_rejects_non_positive_diagonal() {
        let mut cov = FreeFormCov::new(2);
        let l = DenseMatrix::from_row_major(2, 2, &[1.0, 0.0, 2.0, -1.0]);
        assert!(cov.set_l(&l).is_err());
    }

    #[test]
    fn test_free_form_gradient() {
        let mut cov = FreeFormCov::new(3);
        cov.set_params(&[0.1, -0.4, 0.3, 0.7, 0.2, -0.5]);
        check_gradient(&mut cov, 1e-5);
    }

    #[test]
    fn test_free_form_logdet() {
        let mut cov = FreeFormCov::new(2);
        cov.set_params(&[0.2, 0.5, -0.3]);
        let eig = cov.eigh().unwrap();
        let expected: f64 = eig.values.iter().map(|v| v.ln()).sum();
        assert!((cov.logdet().unwrap() - expected).abs() < 1e-10);
    }
}
