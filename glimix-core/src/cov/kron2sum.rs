#![allow(clippy::needless_range_loop)]
//! Kronecker sum covariance `K = C₀ ⊗ GG' + C₁ ⊗ I`.
//!
//! Rows follow `vec(Y)` of an `n x p` outcome, so the `p` traits form
//! consecutive blocks of `n` samples. `C₀` is low rank ([`LrFreeFormCov`])
//! and `C₁` is full rank ([`FreeFormCov`]).
//!
//! With `GG' = Uₓ Sₓ Uₓ'`, `C₁ = U₁ S₁ U₁'` and
//! `S₁^{-½} U₁' C₀ U₁ S₁^{-½} = Uₕ Sₕ Uₕ'`, setting `Lₓ = Uₓ'` and
//! `Lₕ = Uₕ' S₁^{-½} U₁'` gives
//!
//! ```text
//! K⁻¹ = (Lₕ ⊗ Lₓ)' D (Lₕ ⊗ Lₓ),    D = diag(1 / (Sₕ ⊗ Sₓ + 1))
//! ```
//!
//! so solves and log-determinants never touch an `np x np` matrix.

use super::{Covariance, FreeFormCov, LrFreeFormCov};
use crate::error::{LmmError, Result};
use glimix_linalg::{DenseMatrix, LinalgError, SymmetricEigen};

/// Which of the two trait covariances a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kron2SumBlock {
    C0,
    C1,
}

#[derive(Debug, Clone)]
struct Spectrum {
    lh: DenseMatrix,
    d: DenseMatrix,
    logdet: f64,
}

#[derive(Debug, Clone)]
pub struct Kron2SumCov {
    g: DenseMatrix,
    c0: LrFreeFormCov,
    c1: FreeFormCov,
    lx: DenseMatrix,
    sx: Vec<f64>,
    spectrum: Spectrum,
}

impl Kron2SumCov {
    /// `g` is `n x r`; `C₀` gets `rank` columns.
    pub fn new(g: &DenseMatrix, ntraits: usize, rank: usize) -> Result<Self> {
        if !g.is_finite() {
            return Err(LmmError::NonFinite("G"));
        }
        if ntraits == 0 {
            return Err(LmmError::InvalidArgument("at least one trait is required".into()));
        }
        if rank == 0 || rank > ntraits {
            return Err(LmmError::InvalidArgument(format!(
                "rank must lie in [1, {}], got {}",
                ntraits, rank
            )));
        }

        let eig = SymmetricEigen::new(&g.mat_mul(&g.transpose()))?;
        let sx: Vec<f64> = eig.values.iter().map(|v| v.max(0.0)).collect();
        let lx = eig.vectors.transpose();

        let c0 = LrFreeFormCov::new(ntraits, rank);
        let c1 = FreeFormCov::new(ntraits);
        let spectrum = compute_spectrum(&c0, &c1, &sx)?;

        Ok(Self {
            g: g.clone(),
            c0,
            c1,
            lx,
            sx,
            spectrum,
        })
    }

    pub fn nsamples(&self) -> usize {
        self.g.nrows()
    }

    pub fn ntraits(&self) -> usize {
        self.c1.dim()
    }

    pub fn g(&self) -> &DenseMatrix {
        &self.g
    }

    pub fn c0(&self) -> &LrFreeFormCov {
        &self.c0
    }

    pub fn c1(&self) -> &FreeFormCov {
        &self.c1
    }

    /// `Lₕ` (p x p).
    pub fn lh(&self) -> &DenseMatrix {
        &self.spectrum.lh
    }

    /// `Lₓ = Uₓ'` (n x n).
    pub fn lx(&self) -> &DenseMatrix {
        &self.lx
    }

    /// Eigenvalues of `GG'`, matching the rows of `Lₓ`.
    pub fn sx(&self) -> &[f64] {
        &self.sx
    }

    /// `D` reshaped to `n x p`: `D[i, a] = 1 / (Sₕ[a] Sₓ[i] + 1)`.
    pub fn d(&self) -> &DenseMatrix {
        &self.spectrum.d
    }

    pub fn set_c0_l(&mut self, l: &DenseMatrix) -> Result<()> {
        let old = self.c0.clone();
        self.c0.set_l(l)?;
        if let Err(e) = self.refresh() {
            self.c0 = old;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_c1_l(&mut self, l: &DenseMatrix) -> Result<()> {
        let old = self.c1.clone();
        self.c1.set_l(l)?;
        if let Err(e) = self.refresh() {
            self.c1 = old;
            return Err(e);
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.spectrum = compute_spectrum(&self.c0, &self.c1, &self.sx)?;
        Ok(())
    }

    pub fn n_params(&self) -> usize {
        self.c0.n_params() + self.c1.n_params()
    }

    /// `[C₀ params, C₁ params]`.
    pub fn params(&self) -> Vec<f64> {
        let mut p = self.c0.params();
        p.extend(self.c1.params());
        p
    }

    /// Replace every parameter and rebuild the spectral cache. On failure the
    /// previous parameters are kept.
    pub fn set_params(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(LmmError::InvalidArgument(format!(
                "expected {} parameters, got {}",
                self.n_params(),
                params.len()
            )));
        }
        let old = self.params();
        let n0 = self.c0.n_params();
        self.c0.set_params(&params[..n0]);
        self.c1.set_params(&params[n0..]);
        if let Err(e) = self.refresh() {
            self.c0.set_params(&old[..n0]);
            self.c1.set_params(&old[n0..]);
            return Err(e);
        }
        Ok(())
    }

    pub fn bounds(&self) -> Vec<(f64, f64)> {
        let mut b = self.c0.bounds();
        b.extend(self.c1.bounds());
        b
    }

    pub fn param_names(&self) -> Vec<String> {
        self.c0
            .param_names()
            .into_iter()
            .map(|s| format!("C0.{}", s))
            .chain(self.c1.param_names().into_iter().map(|s| format!("C1.{}", s)))
            .collect()
    }

    fn ggt(&self) -> DenseMatrix {
        self.g.mat_mul(&self.g.transpose())
    }

    /// Dense `np x np` covariance.
    pub fn value(&self) -> DenseMatrix {
        let n = self.nsamples();
        DenseMatrix::kron(&self.c0.value(), &self.ggt())
            .add(&DenseMatrix::kron(&self.c1.value(), &DenseMatrix::identity(n)))
    }

    /// Dense derivative of the covariance for each parameter.
    pub fn gradient(&self) -> Vec<DenseMatrix> {
        let ggt = self.ggt();
        let eye = DenseMatrix::identity(self.nsamples());
        self.c0
            .gradient()
            .iter()
            .map(|dc| DenseMatrix::kron(dc, &ggt))
            .chain(self.c1.gradient().iter().map(|dc| DenseMatrix::kron(dc, &eye)))
            .collect()
    }

    /// `log|K|`.
    pub fn logdet(&self) -> f64 {
        self.spectrum.logdet
    }

    /// `K⁻¹ v` for `v = vec(V)`, `V` of size `n x p`.
    pub fn solve(&self, v: &[f64]) -> Vec<f64> {
        let (n, p) = (self.nsamples(), self.ntraits());
        assert_eq!(v.len(), n * p);
        let vm = DenseMatrix::from_col_major(n, p, v.to_vec());
        let lh = self.lh();
        let rotated = self.lx.mat_mul(&vm).mat_mul(&lh.transpose());
        let weighted = rotated.hadamard(self.d());
        self.lx.t_mat_mul(&weighted).mat_mul(lh).to_col_major()
    }

    /// `K⁻¹ V` column by column.
    pub fn solve_matrix(&self, v: &DenseMatrix) -> DenseMatrix {
        let cols: Vec<Vec<f64>> = (0..v.ncols()).map(|j| self.solve(&v.col(j))).collect();
        DenseMatrix::from_columns(v.nrows(), &cols)
    }

    /// `L` with `L'L = K⁻¹`: `diag(√D) (Lₕ ⊗ Lₓ)`.
    pub fn l(&self) -> DenseMatrix {
        let sqrt_d: Vec<f64> = self.d().to_col_major().iter().map(|v| v.sqrt()).collect();
        let kron = DenseMatrix::kron(self.lh(), &self.lx);
        DenseMatrix::from_fn(kron.nrows(), kron.ncols(), |i, j| sqrt_d[i] * kron.get(i, j))
    }

    /// `Lₕ ∂C Lₕ'` for every parameter.
    pub(crate) fn rotated_derivatives(&self) -> Vec<(Kron2SumBlock, DenseMatrix)> {
        let lh = self.lh();
        let rotate = |dc: &DenseMatrix| {
            let mut e = lh.mat_mul(dc).mat_mul(&lh.transpose());
            e.symmetrize();
            e
        };
        self.c0
            .gradient()
            .iter()
            .map(|dc| (Kron2SumBlock::C0, rotate(dc)))
            .chain(
                self.c1
                    .gradient()
                    .iter()
                    .map(|dc| (Kron2SumBlock::C1, rotate(dc))),
            )
            .collect()
    }

    /// Diagonal of `Lₓ X Lₓ'` for the sample matrix of `block`.
    pub(crate) fn sample_diagonal(&self, block: Kron2SumBlock) -> Vec<f64> {
        match block {
            Kron2SumBlock::C0 => self.sx.clone(),
            Kron2SumBlock::C1 => vec![1.0; self.nsamples()],
        }
    }

    /// `tr(K⁻¹ ∂K)` for each parameter.
    pub fn logdet_gradient(&self) -> Vec<f64> {
        let d = self.d();
        let (n, p) = (self.nsamples(), self.ntraits());
        self.rotated_derivatives()
            .iter()
            .map(|(block, e)| {
                let xd = self.sample_diagonal(*block);
                let mut tr = 0.0;
                for a in 0..p {
                    let eaa = e.get(a, a);
                    for i in 0..n {
                        tr += d.get(i, a) * xd[i] * eaa;
                    }
                }
                tr
            })
            .collect()
    }

    /// `(∂C ⊗ X) v` for each parameter of `block`, with `X = GG'` for `C₀`
    /// and `X = I` for `C₁`.
    pub fn gradient_dot(&self, v: &[f64], block: Kron2SumBlock) -> Vec<Vec<f64>> {
        let (n, p) = (self.nsamples(), self.ntraits());
        assert_eq!(v.len(), n * p);
        let vm = DenseMatrix::from_col_major(n, p, v.to_vec());
        let (xv, grads) = match block {
            Kron2SumBlock::C0 => (self.g.mat_mul(&self.g.t_mat_mul(&vm)), self.c0.gradient()),
            Kron2SumBlock::C1 => (vm, self.c1.gradient()),
        };
        grads
            .iter()
            .map(|dc| xv.mat_mul(&dc.transpose()).to_col_major())
            .collect()
    }
}

fn compute_spectrum(c0: &LrFreeFormCov, c1: &FreeFormCov, sx: &[f64]) -> Result<Spectrum> {
    let p = c1.dim();
    let n = sx.len();

    let eig1 = SymmetricEigen::new(&c1.value())?;
    if eig1.values.iter().any(|&s| s <= 0.0 || s.is_nan()) {
        return Err(LinalgError::NotPositiveDefinite.into());
    }
    let s1 = &eig1.values;
    let lh0 = DenseMatrix::from_fn(p, p, |a, b| eig1.vectors.get(b, a) / s1[a].sqrt());

    let mut c0t = lh0.mat_mul(&c0.value()).mat_mul(&lh0.transpose());
    c0t.symmetrize();
    let eigh = SymmetricEigen::new(&c0t)?;
    let sh: Vec<f64> = eigh.values.iter().map(|v| v.max(0.0)).collect();
    let lh = eigh.vectors.t_mat_mul(&lh0);

    let d = DenseMatrix::from_fn(n, p, |i, a| 1.0 / (sh[a] * sx[i] + 1.0));
    let mut logdet = n as f64 * s1.iter().map(|s| s.ln()).sum::<f64>();
    for a in 0..p {
        for i in 0..n {
            logdet += (sh[a] * sx[i]).ln_1p();
        }
    }

    Ok(Spectrum { lh, d, logdet })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimix_linalg::CholeskyDecomp;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, m: usize, seed: u64) -> DenseMatrix {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        DenseMatrix::from_fn(n, m, |_, _| rng.gen::<f64>() - 0.5)
    }

    fn example_cov() -> Kron2SumCov {
        let g = random_matrix(5, 4, 11);
        let mut cov = Kron2SumCov::new(&g, 3, 2).unwrap();
        cov.set_c0_l(&DenseMatrix::from_row_major(3, 2, &[1.0, 0.3, -0.5, 1.2, 0.4, 0.7]))
            .unwrap();
        cov.set_c1_l(&DenseMatrix::from_row_major(
            3,
            3,
            &[0.9, 0.0, 0.0, 0.2, 1.1, 0.0, -0.3, 0.5, 0.8],
        ))
        .unwrap();
        cov
    }

    #[test]
    fn test_value_matches_definition() {
        let cov = example_cov();
        let k = cov.value();
        assert_eq!(k.nrows(), 15);
        // block (trait 1, trait 2) = C0[1,2] GG' + C1[1,2] I
        let ggt = cov.g().mat_mul(&cov.g().transpose());
        let (c0, c1) = (cov.c0().value(), cov.c1().value());
        for i in 0..5 {
            for j in 0..5 {
                let eye = if i == j { 1.0 } else { 0.0 };
                let expected = c0.get(1, 2) * ggt.get(i, j) + c1.get(1, 2) * eye;
                assert!((k.get(5 + i, 10 + j) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_solve_and_logdet() {
        let cov = example_cov();
        let k = cov.value();
        let chol = CholeskyDecomp::new(&k).unwrap();
        assert!((cov.logdet() - chol.logdet()).abs() < 1e-8);

        let v: Vec<f64> = (0..15).map(|i| (i as f64 * 0.37).sin()).collect();
        let x = cov.solve(&v);
        let expected = chol.solve(&v);
        for (a, b) in x.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_l_factor() {
        let cov = example_cov();
        let l = cov.l();
        let kinv = CholeskyDecomp::new(&cov.value()).unwrap().inverse();
        assert!(l.t_mat_mul(&l).max_abs_diff(&kinv) < 1e-8);
    }

    #[test]
    fn test_logdet_gradient_matches_trace() {
        let cov = example_cov();
        let kinv = CholeskyDecomp::new(&cov.value()).unwrap().inverse();
        let analytical = cov.logdet_gradient();
        for (k, dk) in cov.gradient().iter().enumerate() {
            let expected = kinv.mat_mul(dk).trace();
            assert!(
                (analytical[k] - expected).abs() < 1e-7,
                "param {}: {} vs {}",
                k,
                analytical[k],
                expected
            );
        }
    }

    #[test]
    fn test_logdet_gradient_finite_difference() {
        let mut cov = example_cov();
        let theta = cov.params();
        let grad = cov.logdet_gradient();
        let h = 1e-6;
        for k in 0..theta.len() {
            let mut plus = theta.clone();
            plus[k] += h;
            cov.set_params(&plus).unwrap();
            let fp = cov.logdet();
            let mut minus = theta.clone();
            minus[k] -= h;
            cov.set_params(&minus).unwrap();
            let fm = cov.logdet();
            cov.set_params(&theta).unwrap();
            let fd = (fp - fm) / (2.0 * h);
            assert!((fd - grad[k]).abs() < 1e-5, "param {}: {} vs {}", k, fd, grad[k]);
        }
    }

    #[test]
    fn test_gradient_dot() {
        let cov = example_cov();
        let v: Vec<f64> = (0..15).map(|i| (i as f64 * 0.11).cos()).collect();
        let grads = cov.gradient();
        let n0 = cov.c0().n_params();
        let c0_dots = cov.gradient_dot(&v, Kron2SumBlock::C0);
        let c1_dots = cov.gradient_dot(&v, Kron2SumBlock::C1);
        assert_eq!(c0_dots.len() + c1_dots.len(), grads.len());
        for (k, dk) in grads.iter().enumerate() {
            let expected = dk.mat_vec(&v);
            let got = if k < n0 { &c0_dots[k] } else { &c1_dots[k - n0] };
            for (a, b) in got.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_param_names_and_blocks() {
        let cov = example_cov();
        let names = cov.param_names();
        assert_eq!(names.len(), 6 + 6);
        assert_eq!(names[0], "C0.Lu[0]");
        assert_eq!(names[6], "C1.Lu[0]");
        let blocks: Vec<Kron2SumBlock> =
            cov.rotated_derivatives().into_iter().map(|(b, _)| b).collect();
        assert_eq!(blocks.len(), names.len());
        assert_eq!(blocks[5], Kron2SumBlock::C0);
        assert_eq!(blocks[6], Kron2SumBlock::C1);
    }

    #[test]
    fn test_set_params_roundtrip() {
        let mut cov = example_cov();
        let theta = cov.params();
        let k = cov.value();
        let mut other = example_cov();
        other.set_params(&vec![0.1; theta.len()]).unwrap();
        other.set_params(&theta).unwrap();
        assert!(other.value().max_abs_diff(&k) < 1e-12);
        assert!(cov.set_params(&[1.0]).is_err());
    }

    #[test]
    fn test_invalid_rank() {
        let g = random_matrix(4, 2, 3);
        assert!(Kron2SumCov::new(&g, 2, 0).is_err());
        assert!(Kron2SumCov::new(&g, 2, 3).is_err());
    }
}
