//! Single-trait linear mixed model.
//!
//! ```text
//! y ~ N(Xβ, s((1-δ)K + δI)),   K = Q0 diag(S0) Q0'
//! ```
//!
//! β and s are profiled out in closed form for a given δ, so fitting
//! reduces to a bounded scalar search over `logit(δ)`.

use glimix_linalg::{CholeskyDecomp, DenseMatrix, EconomicQs};
use tracing::{debug, info, warn};

use super::dot::{CrossProduct, Spectrum};
use super::fast_scanner::FastScanner;
use crate::cov::{Covariance, EyeCov, GivenCov};
use crate::error::{check_rows, LmmError, Result};
use crate::mean::LinearMean;
use crate::optim::{brent, BrentConfig};
use crate::util::math::{all_finite, logistic, tiny, LOG2PI};

/// Parameters that can be held fixed during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmmParam {
    Delta,
    Scale,
    Beta,
}

/// Configuration for [`Lmm::fit`].
#[derive(Debug, Clone)]
pub struct LmmFitConfig {
    /// Scalar search settings.
    pub brent: BrentConfig,
    /// Search interval for `logit(δ)`.
    pub logit_bounds: (f64, f64),
}

impl Default for LmmFitConfig {
    fn default() -> Self {
        Self {
            brent: BrentConfig::default(),
            logit_bounds: (-20.0, 20.0),
        }
    }
}

/// Result of [`Lmm::fit`].
#[derive(Debug, Clone)]
pub struct LmmFitResult {
    pub lml: f64,
    pub delta: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Profile of the likelihood at one δ.
struct Evaluation {
    beta: Vec<f64>,
    scale: f64,
    lml: f64,
    xvx: DenseMatrix,
}

/// Single-trait linear mixed model, fitted by maximum likelihood or
/// restricted maximum likelihood.
///
/// # Example
/// ```
/// use glimix_core::Lmm;
/// use glimix_linalg::{DenseMatrix, EconomicQs};
///
/// let y = vec![1.2, 0.3, -0.5, 2.1, 0.9, -1.1];
/// let x = DenseMatrix::from_fn(6, 1, |_, _| 1.0);
/// let g = DenseMatrix::from_row_major(6, 2, &[1.0, 0.0, 0.9, 0.1, 0.0, 1.0, 0.1, 0.8, 0.5, 0.5, 0.3, 0.2]);
/// let qs = EconomicQs::from_linear(&g).unwrap();
/// let mut lmm = Lmm::new(&y, &x, Some(&qs), false).unwrap();
/// lmm.fit(&Default::default()).unwrap();
/// assert!(lmm.lml().is_finite());
/// ```
#[derive(Debug, Clone)]
pub struct Lmm {
    y: Vec<f64>,
    x: DenseMatrix,
    qs: EconomicQs,
    restricted: bool,
    xx: CrossProduct,
    xy: CrossProduct,
    yy: CrossProduct,
    logdet_xtx: f64,
    delta: f64,
    scale: f64,
    beta: Vec<f64>,
    fixed_delta: bool,
    fixed_scale: bool,
    fixed_beta: bool,
    lml: f64,
    xvx: DenseMatrix,
}

impl Lmm {
    /// `qs = None` drops the random effect (`K = 0`).
    pub fn new(y: &[f64], x: &DenseMatrix, qs: Option<&EconomicQs>, restricted: bool) -> Result<Self> {
        let n = y.len();
        if n == 0 {
            return Err(LmmError::Empty);
        }
        if !all_finite(y) {
            return Err(LmmError::NonFinite("outcome"));
        }
        check_rows("covariates", n, x.nrows())?;
        if !x.is_finite() {
            return Err(LmmError::NonFinite("covariates"));
        }
        let qs = match qs {
            Some(qs) => {
                check_rows("QS", n, qs.nsamples())?;
                if !qs.q0.is_finite() || !all_finite(&qs.s0) {
                    return Err(LmmError::NonFinite("QS"));
                }
                qs.clone()
            }
            None => EconomicQs::empty(n),
        };
        let c = x.ncols();
        if restricted && n <= c {
            return Err(LmmError::InvalidArgument(format!(
                "restricted likelihood needs more samples ({}) than covariates ({})",
                n, c
            )));
        }

        let xtx = x.t_mat_mul(x);
        let logdet_xtx = CholeskyDecomp::new(&xtx)
            .map_err(|_| LmmError::InvalidArgument("covariates are linearly dependent".into()))?
            .logdet();

        let ym = DenseMatrix::from_vec(y);
        let qx = qs.rotate(x);
        let qy = qs.rotate(&ym);
        let xx = CrossProduct::new(qx.clone(), qx.clone(), xtx);
        let xy = CrossProduct::new(qx, qy.clone(), x.t_mat_mul(&ym));
        let yy = CrossProduct::new(qy.clone(), qy, ym.t_mat_mul(&ym));

        // Without a random effect only s·δ is identifiable.
        let delta = if qs.rank() == 0 { 1.0 } else { 0.5 };

        let mut lmm = Self {
            y: y.to_vec(),
            x: x.clone(),
            qs,
            restricted,
            xx,
            xy,
            yy,
            logdet_xtx,
            delta,
            scale: 1.0,
            beta: vec![0.0; c],
            fixed_delta: false,
            fixed_scale: false,
            fixed_beta: false,
            lml: f64::NEG_INFINITY,
            xvx: DenseMatrix::zeros(c, c),
        };
        lmm.refresh()?;
        Ok(lmm)
    }

    fn spectrum(&self, delta: f64) -> Spectrum {
        let e0 = self.qs.s0.iter().map(|s| (1.0 - delta) * s + delta).collect();
        Spectrum::new(e0, delta, self.nsamples())
    }

    fn evaluate(&self, delta: f64) -> Result<Evaluation> {
        let spectrum = self.spectrum(delta);
        let xvx = self.xx.weighted(&spectrum);
        let xvy = self.xy.weighted(&spectrum).col(0);
        let yvy = self.yy.weighted(&spectrum).get(0, 0);
        let logdet_v = spectrum.logdet();

        let chol = CholeskyDecomp::new(&xvx)?;
        let beta = if self.fixed_beta {
            self.beta.clone()
        } else {
            chol.solve(&xvy)
        };
        let xvx_beta = xvx.mat_vec(&beta);
        let quad =
            (yvy - 2.0 * DenseMatrix::dot(&beta, &xvy) + DenseMatrix::dot(&beta, &xvx_beta)).max(0.0);

        let n = self.nsamples() as f64;
        let dof = if self.restricted {
            n - self.ncovariates() as f64
        } else {
            n
        };
        let scale = if self.fixed_scale {
            self.scale
        } else {
            (quad / dof).max(tiny())
        };

        let lml = if self.restricted {
            -0.5 * (dof * LOG2PI + dof * scale.ln() + logdet_v + chol.logdet() - self.logdet_xtx
                + quad / scale)
        } else {
            -0.5 * (n * LOG2PI + n * scale.ln() + logdet_v + quad / scale)
        };

        Ok(Evaluation {
            beta,
            scale,
            lml,
            xvx,
        })
    }

    fn refresh(&mut self) -> Result<()> {
        let eval = self.evaluate(self.delta)?;
        self.beta = eval.beta;
        self.scale = eval.scale;
        self.lml = eval.lml;
        self.xvx = eval.xvx;
        Ok(())
    }

    /// Maximise the (restricted) likelihood over δ.
    pub fn fit(&mut self, config: &LmmFitConfig) -> Result<LmmFitResult> {
        info!(
            "Fitting LMM: n={}, covariates={}, rank(K)={}, restricted={}",
            self.nsamples(),
            self.ncovariates(),
            self.qs.rank(),
            self.restricted
        );

        let mut iterations = 0;
        let mut converged = true;
        if !self.fixed_delta && self.qs.rank() > 0 {
            let (lo, hi) = config.logit_bounds;
            let res = brent(
                |t| match self.evaluate(logistic(t)) {
                    Ok(eval) => -eval.lml,
                    Err(e) => {
                        debug!("lml evaluation failed at logit(delta)={:.4}: {}", t, e);
                        f64::INFINITY
                    }
                },
                lo,
                hi,
                &config.brent,
            );
            if !res.converged {
                warn!("Delta search did not converge after {} iterations", res.iterations);
            }
            self.delta = logistic(res.x);
            iterations = res.iterations;
            converged = res.converged;
        }
        self.refresh()?;

        info!(
            "LMM fit: delta={:.6}, scale={:.6}, lml={:.6}",
            self.delta, self.scale, self.lml
        );
        Ok(LmmFitResult {
            lml: self.lml,
            delta: self.delta,
            iterations,
            converged,
        })
    }

    /// Log marginal likelihood at the current parameters.
    pub fn lml(&self) -> f64 {
        self.lml
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn set_delta(&mut self, delta: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&delta) {
            return Err(LmmError::InvalidArgument(format!("delta must lie in [0, 1], got {}", delta)));
        }
        if delta == 0.0 && !self.qs.is_full_rank() {
            return Err(LmmError::InvalidArgument(
                "delta = 0 makes the covariance singular for a low-rank K".into(),
            ));
        }
        let old = self.delta;
        self.delta = delta;
        if let Err(e) = self.refresh() {
            self.delta = old;
            return Err(e);
        }
        Ok(())
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Set and fix the scale.
    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        if scale <= 0.0 || !scale.is_finite() {
            return Err(LmmError::InvalidArgument(format!("scale must be positive, got {}", scale)));
        }
        let (old, was_fixed) = (self.scale, self.fixed_scale);
        self.scale = scale;
        self.fixed_scale = true;
        if let Err(e) = self.refresh() {
            self.scale = old;
            self.fixed_scale = was_fixed;
            return Err(e);
        }
        Ok(())
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    /// Set and fix the fixed effects.
    pub fn set_beta(&mut self, beta: &[f64]) -> Result<()> {
        if beta.len() != self.ncovariates() {
            return Err(LmmError::InvalidArgument(format!(
                "expected {} effect sizes, got {}",
                self.ncovariates(),
                beta.len()
            )));
        }
        if !all_finite(beta) {
            return Err(LmmError::NonFinite("effect sizes"));
        }
        let (old, was_fixed) = (self.beta.clone(), self.fixed_beta);
        self.beta = beta.to_vec();
        self.fixed_beta = true;
        if let Err(e) = self.refresh() {
            self.beta = old;
            self.fixed_beta = was_fixed;
            return Err(e);
        }
        Ok(())
    }

    pub fn fix(&mut self, param: LmmParam) {
        match param {
            LmmParam::Delta => self.fixed_delta = true,
            LmmParam::Scale => self.fixed_scale = true,
            LmmParam::Beta => self.fixed_beta = true,
        }
    }

    /// Release a parameter; β and s return to their optimum.
    pub fn unfix(&mut self, param: LmmParam) -> Result<()> {
        match param {
            LmmParam::Delta => self.fixed_delta = false,
            LmmParam::Scale => self.fixed_scale = false,
            LmmParam::Beta => self.fixed_beta = false,
        }
        self.refresh()
    }

    pub fn is_fixed(&self, param: LmmParam) -> bool {
        match param {
            LmmParam::Delta => self.fixed_delta,
            LmmParam::Scale => self.fixed_scale,
            LmmParam::Beta => self.fixed_beta,
        }
    }

    /// `s (X'V⁻¹X)⁻¹`.
    pub fn beta_covariance(&self) -> Result<DenseMatrix> {
        Ok(CholeskyDecomp::new(&self.xvx)?.inverse().scale(self.scale))
    }

    /// Variance of the random effect, `s(1-δ)`.
    pub fn v0(&self) -> f64 {
        self.scale * (1.0 - self.delta)
    }

    /// Residual variance, `sδ`.
    pub fn v1(&self) -> f64 {
        self.scale * self.delta
    }

    /// Fitted mean `Xβ`.
    pub fn mean(&self) -> Vec<f64> {
        let mut mean = LinearMean::new(self.x.clone());
        mean.set_beta(&self.beta);
        mean.value()
    }

    /// Dense covariance `v0 K + v1 I`.
    pub fn covariance(&self) -> DenseMatrix {
        let mut genetic = GivenCov::new(self.qs.kinship());
        genetic.set_scale(self.v0());
        let mut noise = EyeCov::new(self.nsamples());
        noise.set_scale(self.v1());
        genetic.value().add(&noise.value())
    }

    pub fn nsamples(&self) -> usize {
        self.y.len()
    }

    pub fn ncovariates(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> &DenseMatrix {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn qs(&self) -> &EconomicQs {
        &self.qs
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Scanner over candidate covariates with the current δ held fixed.
    ///
    /// The scanner's covariance is `s'(K + vI)` with `v = δ/(1-δ)`, which
    /// spans the same family as this model for fixed δ.
    pub fn get_fast_scanner(&self) -> Result<FastScanner> {
        let v = if self.qs.rank() == 0 {
            1.0
        } else if self.delta < 1.0 {
            self.delta / (1.0 - self.delta)
        } else {
            return Err(LmmError::InvalidArgument(
                "delta = 1 leaves no random effect to scan against".into(),
            ));
        };
        FastScanner::new(&self.y, &self.x, Some(&self.qs), v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    struct Data {
        y: Vec<f64>,
        x: DenseMatrix,
        k: DenseMatrix,
        qs: EconomicQs,
    }

    fn simulate(n: usize, r: usize, seed: u64) -> Data {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let g = DenseMatrix::from_fn(n, r, |_, _| rng.gen::<f64>() - 0.5);
        let x = DenseMatrix::from_fn(n, 2, |_, j| if j == 0 { 1.0 } else { rng.gen::<f64>() });
        let u: Vec<f64> = (0..r).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();
        let gu = g.mat_vec(&u);
        let y = (0..n)
            .map(|i| 0.5 + 1.5 * x.get(i, 1) + gu[i] + 0.5 * (rng.gen::<f64>() - 0.5))
            .collect();
        let k = g.mat_mul(&g.transpose());
        let qs = EconomicQs::from_linear(&g).unwrap();
        Data { y, x, k, qs }
    }

    /// Dense reference: ML or REML log-likelihood of y under N(Xβ, Σ).
    fn dense_lml(y: &[f64], x: &DenseMatrix, sigma: &DenseMatrix, beta: &[f64], restricted: bool) -> f64 {
        let n = y.len() as f64;
        let c = x.ncols() as f64;
        let chol = CholeskyDecomp::new(sigma).unwrap();
        let xb = x.mat_vec(beta);
        let r: Vec<f64> = y.iter().zip(xb.iter()).map(|(a, b)| a - b).collect();
        let quad = DenseMatrix::dot(&r, &chol.solve(&r));
        if restricted {
            let xsx = x.t_mat_mul(&chol.solve_matrix(x));
            let ld_xsx = CholeskyDecomp::new(&xsx).unwrap().logdet();
            let ld_xtx = CholeskyDecomp::new(&x.t_mat_mul(x)).unwrap().logdet();
            -0.5 * ((n - c) * LOG2PI + chol.logdet() + ld_xsx - ld_xtx + quad)
        } else {
            -0.5 * (n * LOG2PI + chol.logdet() + quad)
        }
    }

    #[test]
    fn test_lml_matches_dense_ml() {
        let d = simulate(20, 4, 1);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        lmm.set_delta(0.35).unwrap();
        let sigma = lmm.covariance();
        let expected = dense_lml(&d.y, &d.x, &sigma, lmm.beta(), false);
        assert!((lmm.lml() - expected).abs() < 1e-8, "{} vs {}", lmm.lml(), expected);
    }

    #[test]
    fn test_lml_matches_dense_reml() {
        let d = simulate(20, 4, 2);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), true).unwrap();
        lmm.set_delta(0.6).unwrap();
        let sigma = lmm.covariance();
        let expected = dense_lml(&d.y, &d.x, &sigma, lmm.beta(), true);
        assert!((lmm.lml() - expected).abs() < 1e-8, "{} vs {}", lmm.lml(), expected);
    }

    #[test]
    fn test_full_rank_kinship() {
        let d = simulate(10, 12, 3);
        assert!(d.qs.is_full_rank());
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        lmm.set_delta(0.2).unwrap();
        let expected = dense_lml(&d.y, &d.x, &lmm.covariance(), lmm.beta(), false);
        assert!((lmm.lml() - expected).abs() < 1e-8);
        assert!(lmm.covariance().max_abs_diff(
            &d.k.scale(lmm.v0()).add(&DenseMatrix::identity(10).scale(lmm.v1()))
        ) < 1e-8);
    }

    #[test]
    fn test_fit_improves_lml() {
        let d = simulate(40, 5, 4);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        let before = lmm.lml();
        let res = lmm.fit(&LmmFitConfig::default()).unwrap();
        assert!(res.converged);
        assert!(lmm.lml() >= before - 1e-10);
        assert!(lmm.delta() > 0.0 && lmm.delta() < 1.0);

        // Grid check: no δ does noticeably better
        for &delta in &[0.01, 0.1, 0.3, 0.5, 0.7, 0.9, 0.99] {
            let mut other = lmm.clone();
            other.set_delta(delta).unwrap();
            assert!(other.lml() <= lmm.lml() + 1e-6, "delta={}", delta);
        }
    }

    #[test]
    fn test_fix_and_unfix() {
        let d = simulate(15, 3, 5);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        let optimal_scale = lmm.scale();
        lmm.set_scale(optimal_scale * 3.0).unwrap();
        assert!(lmm.is_fixed(LmmParam::Scale));
        assert!((lmm.scale() - optimal_scale * 3.0).abs() < 1e-12);
        let fixed_lml = lmm.lml();
        lmm.unfix(LmmParam::Scale).unwrap();
        assert!((lmm.scale() - optimal_scale).abs() < 1e-10);
        assert!(lmm.lml() > fixed_lml);

        lmm.fix(LmmParam::Delta);
        let delta = lmm.delta();
        lmm.fit(&LmmFitConfig::default()).unwrap();
        assert_eq!(lmm.delta(), delta);
    }

    #[test]
    fn test_set_beta_fixes_effects() {
        let d = simulate(15, 3, 6);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        let best = lmm.lml();
        lmm.set_beta(&[0.0, 0.0]).unwrap();
        assert_eq!(lmm.beta(), &[0.0, 0.0]);
        assert!(lmm.lml() < best);
        assert!(lmm.set_beta(&[1.0]).is_err());
    }

    #[test]
    fn test_rejected_values_leave_state_unchanged() {
        let d = simulate(15, 3, 10);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        let (scale, beta, lml) = (lmm.scale(), lmm.beta().to_vec(), lmm.lml());

        assert!(lmm.set_scale(-1.0).is_err());
        assert!(lmm.set_scale(f64::NAN).is_err());
        assert!(!lmm.is_fixed(LmmParam::Scale));
        assert_eq!(lmm.scale(), scale);

        assert!(lmm.set_beta(&[1.0, f64::INFINITY]).is_err());
        assert!(!lmm.is_fixed(LmmParam::Beta));
        assert_eq!(lmm.beta(), beta.as_slice());
        assert_eq!(lmm.lml(), lml);

        // a later refit still profiles the scale
        lmm.set_delta(0.3).unwrap();
        let mut reference = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        reference.set_delta(0.3).unwrap();
        assert!((lmm.scale() - reference.scale()).abs() < 1e-12);
    }

    #[test]
    fn test_mean_and_covariance() {
        let d = simulate(12, 3, 11);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        lmm.set_delta(0.25).unwrap();
        let expected_mean = d.x.mat_vec(lmm.beta());
        for (a, b) in lmm.mean().iter().zip(expected_mean.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        let expected = d
            .qs
            .kinship()
            .scale(lmm.v0())
            .add(&DenseMatrix::identity(12).scale(lmm.v1()));
        assert!(lmm.covariance().max_abs_diff(&expected) < 1e-10);
    }

    #[test]
    fn test_beta_covariance() {
        let d = simulate(25, 4, 7);
        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        lmm.set_delta(0.4).unwrap();
        let chol = CholeskyDecomp::new(&lmm.covariance()).unwrap();
        let expected = CholeskyDecomp::new(&d.x.t_mat_mul(&chol.solve_matrix(&d.x)))
            .unwrap()
            .inverse();
        assert!(lmm.beta_covariance().unwrap().max_abs_diff(&expected) < 1e-8);
    }

    #[test]
    fn test_no_random_effect_is_linear_regression() {
        let d = simulate(30, 2, 8);
        let mut lmm = Lmm::new(&d.y, &d.x, None, false).unwrap();
        lmm.fit(&LmmFitConfig::default()).unwrap();
        assert_eq!(lmm.delta(), 1.0);
        assert_eq!(lmm.v0(), 0.0);
        let xtx = d.x.t_mat_mul(&d.x);
        let ols = CholeskyDecomp::new(&xtx).unwrap().solve(&d.x.t_mat_vec(&d.y));
        for (a, b) in lmm.beta().iter().zip(ols.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let d = simulate(10, 2, 9);
        assert!(matches!(Lmm::new(&[], &d.x, None, false), Err(LmmError::Empty)));
        assert!(matches!(
            Lmm::new(&d.y[..9], &d.x, None, false),
            Err(LmmError::DimensionMismatch { .. })
        ));
        let mut y = d.y.clone();
        y[3] = f64::NAN;
        assert!(matches!(Lmm::new(&y, &d.x, None, false), Err(LmmError::NonFinite(_))));

        let collinear = DenseMatrix::from_fn(10, 2, |_, _| 1.0);
        assert!(Lmm::new(&d.y, &collinear, None, false).is_err());

        let mut lmm = Lmm::new(&d.y, &d.x, Some(&d.qs), false).unwrap();
        assert!(lmm.set_delta(1.5).is_err());
        assert!(lmm.set_delta(0.0).is_err());
    }
}
