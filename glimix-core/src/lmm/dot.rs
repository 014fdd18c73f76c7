//! Inner products under `V = Q0 diag(e0) Q0' + e1 Q1 Q1'`.
//!
//! Only `Q0' a` is ever formed; the `Q1` part of `a'V⁻¹b` comes from
//! `a'b - (Q0'a)'(Q0'b)`.

use glimix_linalg::DenseMatrix;

/// Eigenvalues of `V` in the basis `[Q0, Q1]`.
#[derive(Debug, Clone)]
pub(crate) struct Spectrum {
    pub e0: Vec<f64>,
    pub e1: f64,
    pub n: usize,
}

impl Spectrum {
    pub fn new(e0: Vec<f64>, e1: f64, n: usize) -> Self {
        Self { e0, e1, n }
    }

    fn has_complement(&self) -> bool {
        self.e0.len() < self.n
    }

    /// `log|V|`.
    pub fn logdet(&self) -> f64 {
        let mut ld: f64 = self.e0.iter().map(|e| e.ln()).sum();
        if self.has_complement() {
            ld += (self.n - self.e0.len()) as f64 * self.e1.ln();
        }
        ld
    }
}

/// `A'V⁻¹B` from the rotated blocks `Q0'A`, `Q0'B` and the plain `A'B`.
pub(crate) fn weighted_cross(
    qa: &DenseMatrix,
    qb: &DenseMatrix,
    ab: &DenseMatrix,
    spectrum: &Spectrum,
) -> DenseMatrix {
    let k = qa.nrows();
    let scaled = DenseMatrix::from_fn(k, qa.ncols(), |r, i| qa.get(r, i) / spectrum.e0[r]);
    let mut out = scaled.t_mat_mul(qb);
    if spectrum.has_complement() {
        let complement = ab.sub(&qa.t_mat_mul(qb));
        out = out.add(&complement.scale(1.0 / spectrum.e1));
    }
    out
}

/// Cached pieces of `A'V⁻¹B` that do not depend on the spectrum.
#[derive(Debug, Clone)]
pub(crate) struct CrossProduct {
    qa: DenseMatrix,
    qb: DenseMatrix,
    ab: DenseMatrix,
}

impl CrossProduct {
    pub fn new(qa: DenseMatrix, qb: DenseMatrix, ab: DenseMatrix) -> Self {
        Self { qa, qb, ab }
    }

    pub fn weighted(&self, spectrum: &Spectrum) -> DenseMatrix {
        weighted_cross(&self.qa, &self.qb, &self.ab, spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimix_linalg::{CholeskyDecomp, EconomicQs};
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_weighted_cross_matches_dense() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        let g = DenseMatrix::from_fn(8, 3, |_, _| rng.gen::<f64>() - 0.5);
        let a = DenseMatrix::from_fn(8, 2, |_, _| rng.gen::<f64>());
        let b = DenseMatrix::from_fn(8, 1, |_, _| rng.gen::<f64>());
        let qs = EconomicQs::from_linear(&g).unwrap();

        let delta = 0.3;
        let e0: Vec<f64> = qs.s0.iter().map(|s| (1.0 - delta) * s + delta).collect();
        let spectrum = Spectrum::new(e0, delta, 8);

        let v = qs
            .kinship()
            .scale(1.0 - delta)
            .add(&DenseMatrix::identity(8).scale(delta));
        let chol = CholeskyDecomp::new(&v).unwrap();
        let expected = a.t_mat_mul(&chol.solve_matrix(&b));

        let got = weighted_cross(&qs.rotate(&a), &qs.rotate(&b), &a.t_mat_mul(&b), &spectrum);
        assert!(got.max_abs_diff(&expected) < 1e-9);
        assert!((spectrum.logdet() - chol.logdet()).abs() < 1e-9);
    }
}
