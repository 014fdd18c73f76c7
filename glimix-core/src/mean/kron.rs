//! Kronecker mean `vec(m) = (A ⊗ F) vec(B)`.
//!
//! `A` (p x q) acts on traits, `F` (n x c) on samples and the effect
//! sizes `B` are `c x q`, so the mean as an `n x p` matrix is `F B A'`.

use glimix_linalg::DenseMatrix;

#[derive(Debug, Clone)]
pub struct KronMean {
    a: DenseMatrix,
    f: DenseMatrix,
    b: DenseMatrix,
}

impl KronMean {
    pub fn new(a: DenseMatrix, f: DenseMatrix) -> Self {
        let b = DenseMatrix::zeros(f.ncols(), a.ncols());
        Self { a, f, b }
    }

    pub fn a(&self) -> &DenseMatrix {
        &self.a
    }

    pub fn f(&self) -> &DenseMatrix {
        &self.f
    }

    /// Effect sizes (c x q).
    pub fn b(&self) -> &DenseMatrix {
        &self.b
    }

    pub fn set_b(&mut self, b: &DenseMatrix) {
        assert_eq!(b.nrows(), self.f.ncols());
        assert_eq!(b.ncols(), self.a.ncols());
        self.b = b.clone();
    }

    pub fn n_params(&self) -> usize {
        self.f.ncols() * self.a.ncols()
    }

    /// Mean as an `n x p` matrix.
    pub fn value(&self) -> DenseMatrix {
        self.f.mat_mul(&self.b).mat_mul(&self.a.transpose())
    }

    /// `vec` of [`KronMean::value`].
    pub fn vec_value(&self) -> Vec<f64> {
        self.value().to_col_major()
    }

    /// `A ⊗ F`, the derivative of the mean with respect to `vec(B)`.
    pub fn af(&self) -> DenseMatrix {
        DenseMatrix::kron(&self.a, &self.f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kron_mean_matches_af() {
        let a = DenseMatrix::from_row_major(3, 2, &[1.0, 0.0, 0.5, 1.0, -1.0, 2.0]);
        let f = DenseMatrix::from_row_major(4, 2, &[1.0, 0.1, 1.0, -0.2, 1.0, 0.3, 1.0, 0.7]);
        let mut mean = KronMean::new(a, f);
        assert_eq!(mean.n_params(), 4);
        let b = vec![0.5, -1.0, 2.0, 0.25];
        mean.set_b(&DenseMatrix::from_col_major(2, 2, b.clone()));
        let direct = mean.af().mat_vec(&b);
        let value = mean.vec_value();
        for (x, y) in direct.iter().zip(value.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
        assert_eq!(mean.value().nrows(), 4);
        assert_eq!(mean.value().ncols(), 3);
    }
}
