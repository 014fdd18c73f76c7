#![allow(clippy::needless_range_loop)]
//! Multi-trait linear mixed model with Kronecker sum covariance.
//!
//! ```text
//! vec(Y) ~ N((A ⊗ F) vec(B), C₀ ⊗ GG' + C₁ ⊗ I)
//! ```
//!
//! `Y` is `n x p`, `A` (p x q) is the trait design, `F` (n x c) the
//! sample covariates and `B` (c x q) the effect sizes. All likelihood
//! terms are evaluated after rotating by `Lₕ ⊗ Lₓ` (see
//! [`Kron2SumCov`]), where the covariance becomes the diagonal `D⁻¹`.

use glimix_linalg::decomposition::matrix_rank;
use glimix_linalg::{CholeskyDecomp, DenseMatrix};
use tracing::{info, warn};

use crate::cov::kron2sum::{Kron2SumBlock, Kron2SumCov};
use crate::error::{check_rows, LmmError, Result};
use crate::mean::KronMean;
use crate::optim::{lbfgs, LbfgsConfig};
use crate::util::math::LOG2PI;

/// Result of [`Kron2Sum::fit`].
#[derive(Debug, Clone)]
pub struct Kron2SumFitResult {
    pub lml: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Terms that depend on the covariance parameters.
#[derive(Debug, Clone)]
struct Terms {
    /// `Lₓ Y Lₕ'`.
    yh: DenseMatrix,
    /// `Lₕ A`.
    la: DenseMatrix,
    h_inv: DenseMatrix,
    logdet_h: f64,
    /// `D ∘ (Yₕ - Mₕ B)`.
    wh: DenseMatrix,
    quad: f64,
}

/// Kronecker-structured multi-trait LMM, fitted by maximum likelihood.
///
/// See [`RKron2Sum`](super::RKron2Sum) for the restricted variant.
#[derive(Debug, Clone)]
pub struct Kron2Sum {
    y: DenseMatrix,
    mean: KronMean,
    cov: Kron2SumCov,
    restricted: bool,
    yx: DenseMatrix,
    fx: DenseMatrix,
    logdet_mm: f64,
    terms: Terms,
}

impl Kron2Sum {
    /// `y` is `n x p`, `a` is `p x q`, `f` is `n x c`, `g` is `n x r`; `C₀`
    /// gets `rank` factors.
    pub fn new(
        y: &DenseMatrix,
        a: &DenseMatrix,
        f: &DenseMatrix,
        g: &DenseMatrix,
        rank: usize,
    ) -> Result<Self> {
        Self::build(y, a, f, g, rank, false)
    }

    pub(crate) fn build(
        y: &DenseMatrix,
        a: &DenseMatrix,
        f: &DenseMatrix,
        g: &DenseMatrix,
        rank: usize,
        restricted: bool,
    ) -> Result<Self> {
        let (n, p) = (y.nrows(), y.ncols());
        if n == 0 || p == 0 {
            return Err(LmmError::Empty);
        }
        if !y.is_finite() {
            return Err(LmmError::NonFinite("outcome"));
        }
        check_rows("A", p, a.nrows())?;
        check_rows("F", n, f.nrows())?;
        check_rows("G", n, g.nrows())?;
        if !a.is_finite() {
            return Err(LmmError::NonFinite("A"));
        }
        if !f.is_finite() {
            return Err(LmmError::NonFinite("F"));
        }

        let logdet_ata = CholeskyDecomp::new(&a.t_mat_mul(a))
            .map_err(|_| LmmError::InvalidArgument("A must have full column rank".into()))?
            .logdet();
        let logdet_ftf = CholeskyDecomp::new(&f.t_mat_mul(f))
            .map_err(|_| LmmError::InvalidArgument("F must have full column rank".into()))?
            .logdet();
        let (c, q) = (f.ncols(), a.ncols());
        if restricted && n * p <= c * q {
            return Err(LmmError::InvalidArgument(format!(
                "restricted likelihood needs more observations ({}) than effects ({})",
                n * p,
                c * q
            )));
        }

        if matrix_rank(y)? < p {
            warn!("Outcome matrix is not full column rank; trait covariances may be unidentifiable");
        }

        let mut cov = Kron2SumCov::new(g, p, rank)?;
        let variances: Vec<f64> = y
            .column_variances()
            .into_iter()
            .map(|v| if v > 0.0 { v } else { 1.0 })
            .collect();
        let c0_l = DenseMatrix::from_fn(p, rank, |t, k| {
            if t % rank == k {
                (variances[t] / (2.0 * rank as f64)).sqrt()
            } else {
                0.0
            }
        });
        let c1_l = DenseMatrix::from_diag(&variances.iter().map(|v| (v / 2.0).sqrt()).collect::<Vec<_>>());
        cov.set_c0_l(&c0_l)?;
        cov.set_c1_l(&c1_l)?;

        let yx = cov.lx().mat_mul(y);
        let fx = cov.lx().mat_mul(f);
        let mean = KronMean::new(a.clone(), f.clone());
        let (terms, b) = compute_terms(&cov, &yx, &fx, a)?;

        let mut model = Self {
            y: y.clone(),
            mean,
            cov,
            restricted,
            yx,
            fx,
            logdet_mm: c as f64 * logdet_ata + q as f64 * logdet_ftf,
            terms,
        };
        model.mean.set_b(&b);
        Ok(model)
    }

    /// Log marginal likelihood (restricted for [`RKron2Sum`](super::RKron2Sum)).
    pub fn lml(&self) -> f64 {
        let np = (self.nsamples() * self.ntraits()) as f64;
        let logdet_k = self.cov.logdet();
        let t = &self.terms;
        if self.restricted {
            let cq = (self.ncovariates() * self.mean.a().ncols()) as f64;
            -0.5 * ((np - cq) * LOG2PI - self.logdet_mm + logdet_k + t.logdet_h + t.quad)
        } else {
            -0.5 * (np * LOG2PI + logdet_k + t.quad)
        }
    }

    /// Derivative of [`Kron2Sum::lml`] with respect to every covariance
    /// parameter.
    pub fn lml_gradient(&self) -> Vec<f64> {
        let d = self.cov.d();
        let (n, p) = (self.nsamples(), self.ntraits());
        let wh = &self.terms.wh;

        let sx = self.cov.sx();
        let wxw_c0 = DenseMatrix::from_fn(n, p, |i, a| sx[i] * wh.get(i, a)).t_mat_mul(wh);
        let wxw_c1 = wh.t_mat_mul(wh);
        let correction = if self.restricted {
            Some(self.reml_correction())
        } else {
            None
        };

        self.cov
            .rotated_derivatives()
            .iter()
            .map(|(block, e)| {
                let xd = self.cov.sample_diagonal(*block);
                let mut trace = 0.0;
                for a in 0..p {
                    let eaa = e.get(a, a);
                    for i in 0..n {
                        trace += d.get(i, a) * xd[i] * eaa;
                    }
                }
                let wxw = match block {
                    Kron2SumBlock::C0 => &wxw_c0,
                    Kron2SumBlock::C1 => &wxw_c1,
                };
                let mut g = -0.5 * trace + 0.5 * wxw.frobenius_dot(e);
                if let Some((q0, q1)) = &correction {
                    let qm = match block {
                        Kron2SumBlock::C0 => q0,
                        Kron2SumBlock::C1 => q1,
                    };
                    g += 0.5 * qm.frobenius_dot(e);
                }
                g
            })
            .collect()
    }

    /// `tr(H⁻¹ Mₕ'D(E ⊗ X)DMₕ)` written as `⟨Q, E⟩`; returns `Q` for both
    /// sample matrices (`GG'` then `I`).
    fn reml_correction(&self) -> (DenseMatrix, DenseMatrix) {
        let d = self.cov.d();
        let sx = self.cov.sx();
        let (n, p) = (self.nsamples(), self.ntraits());
        let c = self.ncovariates();
        let q = self.mean.a().ncols();
        let hinv = &self.terms.h_inv;
        let la = &self.terms.la;

        let mut q0 = DenseMatrix::zeros(p, p);
        let mut q1 = DenseMatrix::zeros(p, p);
        for i in 0..n {
            let fi = self.fx.row(i);
            let pi = DenseMatrix::from_fn(q, q, |u, v| {
                let mut s = 0.0;
                for k in 0..c {
                    for l in 0..c {
                        s += hinv.get(u * c + k, v * c + l) * fi[k] * fi[l];
                    }
                }
                s
            });
            let lpl = la.mat_mul(&pi).mat_mul(&la.transpose());
            for a in 0..p {
                for b in 0..p {
                    let w = d.get(i, a) * d.get(i, b) * lpl.get(a, b);
                    q0.set(a, b, q0.get(a, b) + sx[i] * w);
                    q1.set(a, b, q1.get(a, b) + w);
                }
            }
        }
        (q0, q1)
    }

    /// Replace the covariance parameters and recompute the effect sizes.
    /// On failure the previous parameters are kept.
    pub fn set_params(&mut self, params: &[f64]) -> Result<()> {
        let old = self.cov.params();
        self.cov.set_params(params)?;
        match compute_terms(&self.cov, &self.yx, &self.fx, self.mean.a()) {
            Ok((terms, b)) => {
                self.terms = terms;
                self.mean.set_b(&b);
                Ok(())
            }
            Err(e) => {
                self.cov.set_params(&old)?;
                Err(e)
            }
        }
    }

    pub fn params(&self) -> Vec<f64> {
        self.cov.params()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.cov.param_names()
    }

    /// Maximise the likelihood over the covariance parameters by L-BFGS.
    pub fn fit(&mut self, config: &LbfgsConfig) -> Result<Kron2SumFitResult> {
        info!(
            "Fitting {}: n={}, traits={}, covariates={}, params={}",
            if self.restricted { "RKron2Sum" } else { "Kron2Sum" },
            self.nsamples(),
            self.ntraits(),
            self.ncovariates(),
            self.cov.n_params()
        );
        let x0 = self.cov.params();
        let bounds = self.cov.bounds();
        let res = lbfgs(
            |theta| {
                self.set_params(theta)?;
                let grad = self.lml_gradient().into_iter().map(|g| -g).collect();
                Ok::<_, LmmError>((-self.lml(), grad))
            },
            &x0,
            &bounds,
            config,
        )?;
        self.set_params(&res.x)?;
        if !res.converged {
            warn!("L-BFGS did not converge after {} iterations", res.iterations);
        }
        info!("Fit finished after {} iterations: lml={:.6}", res.iterations, self.lml());
        Ok(Kron2SumFitResult {
            lml: self.lml(),
            iterations: res.iterations,
            converged: res.converged,
        })
    }

    pub fn mean(&self) -> &KronMean {
        &self.mean
    }

    pub fn cov(&self) -> &Kron2SumCov {
        &self.cov
    }

    /// Effect sizes `B` (c x q).
    pub fn beta(&self) -> &DenseMatrix {
        self.mean.b()
    }

    /// Covariance of `vec(B)`, `(M'K⁻¹M)⁻¹`.
    pub fn beta_covariance(&self) -> DenseMatrix {
        self.terms.h_inv.clone()
    }

    /// `L y` with `L'L = K⁻¹`.
    pub fn z(&self) -> Vec<f64> {
        let d = self.cov.d();
        DenseMatrix::from_fn(self.nsamples(), self.ntraits(), |i, a| {
            d.get(i, a).sqrt() * self.terms.yh.get(i, a)
        })
        .to_col_major()
    }

    pub fn y(&self) -> &DenseMatrix {
        &self.y
    }

    pub fn nsamples(&self) -> usize {
        self.y.nrows()
    }

    pub fn ntraits(&self) -> usize {
        self.y.ncols()
    }

    /// Number of sample covariates `c`.
    pub fn ncovariates(&self) -> usize {
        self.mean.f().ncols()
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }
}

/// Rotated terms and the optimal effect sizes for the current covariance.
fn compute_terms(
    cov: &Kron2SumCov,
    yx: &DenseMatrix,
    fx: &DenseMatrix,
    a: &DenseMatrix,
) -> Result<(Terms, DenseMatrix)> {
    let lh = cov.lh();
    let d = cov.d();
    let (n, p) = (yx.nrows(), yx.ncols());
    let (c, q) = (fx.ncols(), a.ncols());

    let yh = yx.mat_mul(&lh.transpose());
    let la = lh.mat_mul(a);

    // H[(u,k),(v,l)] = Σ_a la[a,u] la[a,v] (Fₓ' diag(D[:,a]) Fₓ)[k,l]
    let mut h = DenseMatrix::zeros(c * q, c * q);
    for t in 0..p {
        let dfx = DenseMatrix::from_fn(n, c, |i, k| d.get(i, t) * fx.get(i, k));
        let w = fx.t_mat_mul(&dfx);
        for u in 0..q {
            for v in 0..q {
                let coef = la.get(t, u) * la.get(t, v);
                if coef == 0.0 {
                    continue;
                }
                for k in 0..c {
                    for l in 0..c {
                        let idx = (u * c + k, v * c + l);
                        h.set(idx.0, idx.1, h.get(idx.0, idx.1) + coef * w.get(k, l));
                    }
                }
            }
        }
    }
    h.symmetrize();

    let rhs = fx.t_mat_mul(&d.hadamard(&yh)).mat_mul(&la).to_col_major();
    let chol = CholeskyDecomp::new(&h)?;
    let b = DenseMatrix::from_col_major(c, q, chol.solve(&rhs));

    let mh = fx.mat_mul(&b).mat_mul(&la.transpose());
    let rh = yh.sub(&mh);
    let wh = d.hadamard(&rh);
    let quad = rh.frobenius_dot(&wh);

    let terms = Terms {
        yh,
        la,
        h_inv: chol.inverse(),
        logdet_h: chol.logdet(),
        wh,
        quad,
    };
    Ok((terms, b))
}
