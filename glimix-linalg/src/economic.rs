//! Economic eigendecomposition of a kinship matrix.
//!
//! `K = Q0 diag(S0) Q0'` keeps only the eigenpairs with a non-negligible
//! eigenvalue. The orthogonal complement `Q1` is never stored: every
//! quantity the models need from it can be written as
//! `(Q1'a)'(Q1'b) = a'b - (Q0'a)'(Q0'b)`.

use crate::decomposition::{LinalgError, SymmetricEigen};
use crate::dense::DenseMatrix;

/// Eigenvalues below this threshold are treated as zero.
pub fn eigenvalue_threshold() -> f64 {
    f64::EPSILON.sqrt()
}

/// Economic eigendecomposition `K = Q0 diag(S0) Q0'`.
#[derive(Debug, Clone)]
pub struct EconomicQs {
    /// Eigenvectors with non-zero eigenvalue (n x k).
    pub q0: DenseMatrix,
    /// Non-zero eigenvalues (k), ascending.
    pub s0: Vec<f64>,
}

impl EconomicQs {
    /// Decompose a symmetric positive semi-definite kinship matrix.
    pub fn from_kinship(k: &DenseMatrix) -> Result<Self, LinalgError> {
        let eig = SymmetricEigen::new(k)?;
        let thr = eigenvalue_threshold();
        let keep: Vec<usize> = (0..eig.values.len())
            .filter(|&i| eig.values[i] >= thr)
            .collect();
        Ok(Self {
            q0: eig.vectors.select_columns(&keep),
            s0: keep.iter().map(|&i| eig.values[i]).collect(),
        })
    }

    /// Decompose `K = G G'` without forming K when `G` is tall.
    pub fn from_linear(g: &DenseMatrix) -> Result<Self, LinalgError> {
        let (n, r) = (g.nrows(), g.ncols());
        if r >= n {
            return Self::from_kinship(&g.mat_mul(&g.transpose()));
        }
        // G'G = V diag(S) V'  =>  G G' = (G V S^{-1/2}) diag(S) (G V S^{-1/2})'
        let eig = SymmetricEigen::new(&g.t_mat_mul(g))?;
        let thr = eigenvalue_threshold();
        let keep: Vec<usize> = (0..r).filter(|&i| eig.values[i] >= thr).collect();
        let gv = g.mat_mul(&eig.vectors.select_columns(&keep));
        let s0: Vec<f64> = keep.iter().map(|&i| eig.values[i]).collect();
        let q0 = DenseMatrix::from_fn(n, keep.len(), |i, j| gv.get(i, j) / s0[j].sqrt());
        Ok(Self { q0, s0 })
    }

    /// No random effect: `K = 0`.
    pub fn empty(n: usize) -> Self {
        Self {
            q0: DenseMatrix::zeros(n, 0),
            s0: Vec::new(),
        }
    }

    /// Number of samples.
    pub fn nsamples(&self) -> usize {
        self.q0.nrows()
    }

    /// Rank `k` of the decomposition.
    pub fn rank(&self) -> usize {
        self.s0.len()
    }

    /// True if the complement `Q1` is empty.
    pub fn is_full_rank(&self) -> bool {
        self.rank() == self.nsamples()
    }

    /// `Q0' a`.
    pub fn rotate(&self, a: &DenseMatrix) -> DenseMatrix {
        self.q0.t_mat_mul(a)
    }

    /// Reconstruct `Q0 diag(S0) Q0'`.
    pub fn kinship(&self) -> DenseMatrix {
        let qs = DenseMatrix::from_fn(self.q0.nrows(), self.rank(), |i, j| {
            self.q0.get(i, j) * self.s0[j]
        });
        qs.mat_mul(&self.q0.transpose())
    }

    /// Block-diagonal decomposition of `I_p ⊗ K`.
    pub fn repeat_block_diagonal(&self, p: usize) -> Self {
        let (n, k) = (self.nsamples(), self.rank());
        if k == 0 {
            return Self::empty(n * p);
        }
        let q0 = DenseMatrix::from_fn(n * p, k * p, |i, j| {
            if i / n == j / k {
                self.q0.get(i % n, j % k)
            } else {
                0.0
            }
        });
        let s0 = (0..p).flat_map(|_| self.s0.iter().cloned()).collect();
        Self { q0, s0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, m: usize, seed: u64) -> DenseMatrix {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        DenseMatrix::from_fn(n, m, |_, _| rng.gen::<f64>() - 0.5)
    }

    #[test]
    fn test_from_kinship_reconstructs() {
        let g = random_matrix(6, 3, 1);
        let k = g.mat_mul(&g.transpose());
        let qs = EconomicQs::from_kinship(&k).unwrap();
        assert_eq!(qs.rank(), 3);
        assert!(!qs.is_full_rank());
        assert!(qs.kinship().max_abs_diff(&k) < 1e-10);
    }

    #[test]
    fn test_from_linear_matches_kinship() {
        let g = random_matrix(7, 2, 2);
        let qs = EconomicQs::from_linear(&g).unwrap();
        assert_eq!(qs.rank(), 2);
        let k = g.mat_mul(&g.transpose());
        assert!(qs.kinship().max_abs_diff(&k) < 1e-10);

        // Columns of Q0 are orthonormal
        let qtq = qs.q0.t_mat_mul(&qs.q0);
        assert!(qtq.max_abs_diff(&DenseMatrix::identity(2)) < 1e-10);
    }

    #[test]
    fn test_from_linear_wide() {
        let g = random_matrix(4, 6, 3);
        let qs = EconomicQs::from_linear(&g).unwrap();
        assert!(qs.is_full_rank());
        assert!(qs.kinship().max_abs_diff(&g.mat_mul(&g.transpose())) < 1e-10);
    }

    #[test]
    fn test_empty() {
        let qs = EconomicQs::empty(5);
        assert_eq!(qs.nsamples(), 5);
        assert_eq!(qs.rank(), 0);
        assert_eq!(qs.kinship().max_abs_diff(&DenseMatrix::zeros(5, 5)), 0.0);
    }

    #[test]
    fn test_repeat_block_diagonal() {
        let g = random_matrix(4, 2, 4);
        let qs = EconomicQs::from_linear(&g).unwrap();
        let k = qs.kinship();
        let block = qs.repeat_block_diagonal(3);
        assert_eq!(block.nsamples(), 12);
        assert_eq!(block.rank(), 6);
        let expected = DenseMatrix::kron(&DenseMatrix::identity(3), &k);
        assert!(block.kinship().max_abs_diff(&expected) < 1e-10);
    }
}
