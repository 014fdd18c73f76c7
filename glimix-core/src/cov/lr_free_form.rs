//! Low-rank positive semi-definite matrix `L L'` with `L` of size `dim x rank`.

use super::{outer_product_derivative, Covariance};
use crate::error::{LmmError, Result};
use glimix_linalg::DenseMatrix;

#[derive(Debug, Clone)]
pub struct LrFreeFormCov {
    l: DenseMatrix,
}

impl LrFreeFormCov {
    /// Starts with row `i` loading on column `i mod rank`.
    pub fn new(dim: usize, rank: usize) -> Self {
        assert!(rank >= 1, "rank must be positive");
        let l = DenseMatrix::from_fn(dim, rank, |i, j| if i % rank == j { 1.0 } else { 0.0 });
        Self { l }
    }

    pub fn rank(&self) -> usize {
        self.l.ncols()
    }

    pub fn l(&self) -> &DenseMatrix {
        &self.l
    }

    pub fn set_l(&mut self, l: &DenseMatrix) -> Result<()> {
        if l.nrows() != self.l.nrows() || l.ncols() != self.l.ncols() {
            return Err(LmmError::InvalidArgument(format!(
                "expected a {}x{} factor, got {}x{}",
                self.l.nrows(),
                self.l.ncols(),
                l.nrows(),
                l.ncols()
            )));
        }
        self.l = l.clone();
        Ok(())
    }
}

impl Covariance for LrFreeFormCov {
    fn dim(&self) -> usize {
        self.l.nrows()
    }

    fn value(&self) -> DenseMatrix {
        let mut k = self.l.mat_mul(&self.l.transpose());
        k.symmetrize();
        k
    }

    /// `vec(L)`, column-major.
    fn params(&self) -> Vec<f64> {
        self.l.to_col_major()
    }

    fn set_params(&mut self, params: &[f64]) {
        let (d, r) = (self.l.nrows(), self.l.ncols());
        assert_eq!(params.len(), d * r);
        self.l = DenseMatrix::from_col_major(d, r, params.to_vec());
    }

    fn gradient(&self) -> Vec<DenseMatrix> {
        let (d, r) = (self.l.nrows(), self.l.ncols());
        (0..r)
            .flat_map(|j| (0..d).map(move |i| (i, j)))
            .map(|(i, j)| outer_product_derivative(&self.l, i, j, 1.0))
            .collect()
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.l.nrows() * self.l.ncols())
            .map(|k| format!("Lu[{}]", k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cov::testing::check_gradient;

    #[test]
    fn test_lr_free_form_initial_value() {
        let cov = LrFreeFormCov::new(3, 2);
        assert_eq!(cov.n_params(), 6);
        let k = cov.value();
        // rows 0 and 2 share column 0
        assert_eq!(k.get(0, 2), 1.0);
        assert_eq!(k.get(0, 1), 0.0);
        assert_eq!(k.get(1, 1), 1.0);
    }

    #[test]
    fn test_lr_free_form_params_column_major() {
        let mut cov = LrFreeFormCov::new(2, 2);
        cov.set_params(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(cov.l().get(1, 0), 2.0);
        assert_eq!(cov.l().get(0, 1), 3.0);
        assert_eq!(cov.params(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_lr_free_form_gradient() {
        let mut cov = LrFreeFormCov::new(3, 2);
        cov.set_params(&[0.5, -1.0, 0.2, 0.3, 0.9, -0.4]);
        check_gradient(&mut cov, 1e-5);
    }

    #[test]
    fn test_lr_free_form_rank() {
        let mut cov = LrFreeFormCov::new(4, 1);
        cov.set_params(&[1.0, 2.0, 0.5, -1.0]);
        let rank = glimix_linalg::decomposition::matrix_rank(&cov.value()).unwrap();
        assert_eq!(rank, 1);
    }
}
