#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! Cholesky factorisation for the small symmetric positive definite
//! systems the models solve (`X'V⁻¹X`, `M'K⁻¹M`), and faer's symmetric
//! eigendecomposition for covariance spectra.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Singular matrix encountered")]
    SingularMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix contains NaN or infinite values")]
    NonFinite,
}

/// Result of a Cholesky decomposition.
#[derive(Debug, Clone)]
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || diag.is_nan() {
                return Err(LinalgError::NotPositiveDefinite);
            }
            let ljj = diag.sqrt();
            l.set(j, j, ljj);

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / ljj);
            }
        }

        Ok(CholeskyDecomp { l })
    }

    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.dim();
        assert_eq!(b.len(), n);

        // L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }

    /// Solve A * X = B column by column.
    pub fn solve_matrix(&self, b: &DenseMatrix) -> DenseMatrix {
        assert_eq!(b.nrows(), self.dim());
        let cols: Vec<Vec<f64>> = (0..b.ncols()).map(|j| self.solve(&b.col(j))).collect();
        DenseMatrix::from_columns(self.dim(), &cols)
    }

    /// Inverse of the factorised matrix.
    pub fn inverse(&self) -> DenseMatrix {
        let mut inv = self.solve_matrix(&DenseMatrix::identity(self.dim()));
        inv.symmetrize();
        inv
    }

    /// log|A| = 2 * sum(log L_ii).
    pub fn logdet(&self) -> f64 {
        2.0 * self.l.diag().iter().map(|d| d.ln()).sum::<f64>()
    }
}

/// Symmetric eigendecomposition A = U diag(s) U'.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues in ascending order.
    pub values: Vec<f64>,
    /// Eigenvectors stored as columns, matching `values`.
    pub vectors: DenseMatrix,
}

impl SymmetricEigen {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        if !a.is_finite() {
            return Err(LinalgError::NonFinite);
        }
        if n == 0 {
            return Ok(Self {
                values: Vec::new(),
                vectors: DenseMatrix::zeros(0, 0),
            });
        }

        let evd = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
        let s = evd.s().column_vector();
        let u = evd.u();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| s.read(i).total_cmp(&s.read(j)));

        let values = order.iter().map(|&i| s.read(i)).collect();
        let vectors = DenseMatrix::from_fn(n, n, |i, j| u.read(i, order[j]));
        Ok(Self { values, vectors })
    }
}

/// Numerical rank of `a`.
///
/// Counts eigenvalues of the Gram matrix above `sqrt(eps)` times the
/// largest one; squaring the singular values makes a tighter cut unreliable.
pub fn matrix_rank(a: &DenseMatrix) -> Result<usize, LinalgError> {
    let (m, n) = (a.nrows(), a.ncols());
    if m == 0 || n == 0 {
        return Ok(0);
    }
    let gram = if n <= m { a.t_mat_mul(a) } else { a.mat_mul(&a.transpose()) };
    let values = SymmetricEigen::new(&gram)?.values;
    let lmax = values.iter().cloned().fold(0.0, f64::max);
    if lmax <= 0.0 {
        return Ok(0);
    }
    let tol = lmax * f64::EPSILON.sqrt();
    Ok(values.iter().filter(|&&v| v > tol).count())
}
