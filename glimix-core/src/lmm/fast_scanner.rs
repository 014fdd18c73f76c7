//! Association scan of candidate covariates.
//!
//! ```text
//! y ~ N(Xβ + Mα, s(K + vI))
//! ```
//!
//! `v` is held fixed (typically from a fitted null [`Lmm`](super::Lmm)),
//! so every candidate only needs a small `(c + t) x (c + t)` solve on
//! top of inner products that are cached once.

use glimix_linalg::{CholeskyDecomp, DenseMatrix, EconomicQs};
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{info, warn};

use super::dot::{weighted_cross, Spectrum};
use crate::error::{check_rows, LmmError, Result};
use crate::util::math::{all_finite, tiny, LOG2PI};

/// Outcome of testing a single candidate column.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub lml: f64,
    /// Covariate effect sizes under the alternative.
    pub effsizes0: Vec<f64>,
    pub effsizes0_se: Vec<f64>,
    /// Candidate effect size.
    pub effsize1: f64,
    pub effsize1_se: f64,
    pub scale: f64,
    /// Likelihood-ratio p-value against the null.
    pub pvalue: f64,
}

/// Outcome of a joint test of several candidate columns.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub lml: f64,
    pub effsizes0: Vec<f64>,
    pub effsizes0_se: Vec<f64>,
    pub effsizes1: Vec<f64>,
    pub effsizes1_se: Vec<f64>,
    pub scale: f64,
    pub pvalue: f64,
}

#[derive(Debug, Clone)]
struct NullFit {
    beta: Vec<f64>,
    quad: f64,
    scale: f64,
    lml: f64,
    beta_covariance: DenseMatrix,
}

/// Candidates whose residual variance after projecting out the covariates
/// falls below this fraction of their own variance count as collinear.
const COLLINEAR_TOL: f64 = 1e-8;

/// Fast association scanner for a linear mixed model with fixed variance
/// ratio.
#[derive(Debug, Clone)]
pub struct FastScanner {
    y: DenseMatrix,
    x: DenseMatrix,
    qs: EconomicQs,
    v: f64,
    spectrum: Spectrum,
    qy: DenseMatrix,
    qx: DenseMatrix,
    xvx: DenseMatrix,
    xvy: Vec<f64>,
    yvy: f64,
    logdet_v: f64,
    null: NullFit,
}

impl FastScanner {
    pub fn new(y: &[f64], x: &DenseMatrix, qs: Option<&EconomicQs>, v: f64) -> Result<Self> {
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
                qs.clone()
            }
            None => EconomicQs::empty(n),
        };
        if !v.is_finite() || v < 0.0 {
            return Err(LmmError::InvalidArgument(format!("v must be non-negative, got {}", v)));
        }
        if v == 0.0 && !qs.is_full_rank() {
            return Err(LmmError::InvalidArgument(
                "v = 0 makes the covariance singular for a low-rank K".into(),
            ));
        }

        let e0 = qs.s0.iter().map(|s| s + v).collect();
        let spectrum = Spectrum::new(e0, v, n);

        let ym = DenseMatrix::from_vec(y);
        let qy = qs.rotate(&ym);
        let qx = qs.rotate(x);
        let xvx = weighted_cross(&qx, &qx, &x.t_mat_mul(x), &spectrum);
        let xvy = weighted_cross(&qx, &qy, &x.t_mat_mul(&ym), &spectrum).col(0);
        let yvy = weighted_cross(&qy, &qy, &ym.t_mat_mul(&ym), &spectrum).get(0, 0);
        let logdet_v = spectrum.logdet();

        let chol = CholeskyDecomp::new(&xvx)
            .map_err(|_| LmmError::InvalidArgument("covariates are linearly dependent".into()))?;
        let beta = chol.solve(&xvy);
        let quad = (yvy - DenseMatrix::dot(&beta, &xvy)).max(0.0);
        let scale = (quad / n as f64).max(tiny());

        let mut scanner = Self {
            y: ym,
            x: x.clone(),
            qs,
            v,
            spectrum,
            qy,
            qx,
            xvx,
            xvy,
            yvy,
            logdet_v,
            null: NullFit {
                beta,
                quad,
                scale,
                lml: 0.0,
                beta_covariance: chol.inverse().scale(scale),
            },
        };
        scanner.null.lml = scanner.lml_at(quad, scale);
        Ok(scanner)
    }

    fn lml_at(&self, quad: f64, scale: f64) -> f64 {
        let n = self.nsamples() as f64;
        -0.5 * (n * LOG2PI + n * scale.ln() + self.logdet_v + quad / scale)
    }

    pub fn nsamples(&self) -> usize {
        self.y.nrows()
    }

    pub fn ncovariates(&self) -> usize {
        self.x.ncols()
    }

    /// Residual-to-genetic variance ratio.
    pub fn v(&self) -> f64 {
        self.v
    }

    pub fn null_lml(&self) -> f64 {
        self.null.lml
    }

    pub fn null_beta(&self) -> &[f64] {
        &self.null.beta
    }

    pub fn null_beta_covariance(&self) -> &DenseMatrix {
        &self.null.beta_covariance
    }

    pub fn null_scale(&self) -> f64 {
        self.null.scale
    }

    fn check_candidates(&self, m: &DenseMatrix) -> Result<()> {
        check_rows("candidates", self.nsamples(), m.nrows())?;
        if !m.is_finite() {
            return Err(LmmError::NonFinite("candidates"));
        }
        Ok(())
    }

    /// Joint fit of covariates and candidates; `None` if the candidates are
    /// collinear with the covariates.
    fn fit_candidates(&self, m: &DenseMatrix, scale: Option<f64>) -> Option<ScanResult> {
        let c = self.ncovariates();
        let t = m.ncols();
        let sp = &self.spectrum;

        let qm = self.qs.rotate(m);
        let xvm = weighted_cross(&self.qx, &qm, &self.x.t_mat_mul(m), sp);
        let mvm = weighted_cross(&qm, &qm, &m.t_mat_mul(m), sp);
        let mvy = weighted_cross(&qm, &self.qy, &m.t_mat_mul(&self.y), sp).col(0);

        let h = DenseMatrix::from_fn(c + t, c + t, |i, j| match (i < c, j < c) {
            (true, true) => self.xvx.get(i, j),
            (true, false) => xvm.get(i, j - c),
            (false, true) => xvm.get(j, i - c),
            (false, false) => mvm.get(i - c, j - c),
        });
        let chol = CholeskyDecomp::new(&h).ok()?;
        for j in c..c + t {
            let pivot = chol.l.get(j, j).powi(2);
            if pivot <= COLLINEAR_TOL * h.get(j, j) {
                return None;
            }
        }

        let mut b = self.xvy.clone();
        b.extend_from_slice(&mvy);
        let theta = chol.solve(&b);
        let quad = (self.yvy - DenseMatrix::dot(&theta, &b)).max(0.0);
        let fixed_scale = scale;
        let scale = fixed_scale.unwrap_or_else(|| (quad / self.nsamples() as f64).max(tiny()));
        let lml = self.lml_at(quad, scale);

        let hinv = chol.inverse();
        let se: Vec<f64> = (0..c + t).map(|i| (scale * hinv.get(i, i)).max(0.0).sqrt()).collect();

        // Compare against the null at the same scale when it is fixed.
        let null_lml = match fixed_scale {
            Some(s) => self.lml_at(self.null.quad, s),
            None => self.null.lml,
        };
        let pvalue = chi2_sf(2.0 * (lml - null_lml), t);

        Some(ScanResult {
            lml,
            effsizes0: theta[..c].to_vec(),
            effsizes0_se: se[..c].to_vec(),
            effsizes1: theta[c..].to_vec(),
            effsizes1_se: se[c..].to_vec(),
            scale,
            pvalue,
        })
    }

    /// Null fit reported for collinear or empty candidate sets, at `scale`
    /// when it is fixed.
    fn null_result(&self, t: usize, scale: Option<f64>) -> ScanResult {
        let (lml, scale) = match scale {
            Some(s) => (self.lml_at(self.null.quad, s), s),
            None => (self.null.lml, self.null.scale),
        };
        let ratio = scale / self.null.scale;
        let se = self
            .null
            .beta_covariance
            .diag()
            .iter()
            .map(|v| (v * ratio).max(0.0).sqrt())
            .collect();
        ScanResult {
            lml,
            effsizes0: self.null.beta.clone(),
            effsizes0_se: se,
            effsizes1: vec![0.0; t],
            effsizes1_se: vec![f64::NAN; t],
            scale,
            pvalue: 1.0,
        }
    }

    /// Test every column of `m` on its own, in parallel.
    pub fn fast_scan(&self, m: &DenseMatrix) -> Result<Vec<CandidateResult>> {
        self.check_candidates(m)?;
        info!("Scanning {} candidates over {} samples", m.ncols(), self.nsamples());

        let results = (0..m.ncols())
            .into_par_iter()
            .map(|j| {
                let col = m.select_columns(&[j]);
                let res = self.fit_candidates(&col, None).unwrap_or_else(|| {
                    warn!("Candidate {} is collinear with the covariates", j);
                    self.null_result(1, None)
                });
                CandidateResult {
                    lml: res.lml,
                    effsizes0: res.effsizes0,
                    effsizes0_se: res.effsizes0_se,
                    effsize1: res.effsizes1[0],
                    effsize1_se: res.effsizes1_se[0],
                    scale: res.scale,
                    pvalue: res.pvalue,
                }
            })
            .collect();
        Ok(results)
    }

    /// Joint test of all columns of `m`, optionally at a fixed scale.
    pub fn scan(&self, m: &DenseMatrix, scale: Option<f64>) -> Result<ScanResult> {
        self.check_candidates(m)?;
        if let Some(s) = scale {
            if s <= 0.0 || !s.is_finite() {
                return Err(LmmError::InvalidArgument(format!("scale must be positive, got {}", s)));
            }
        }
        if m.ncols() == 0 {
            return Ok(self.null_result(0, scale));
        }
        Ok(self.fit_candidates(m, scale).unwrap_or_else(|| {
            warn!("Candidate set is collinear with the covariates");
            self.null_result(m.ncols(), scale)
        }))
    }
}

/// Survival function of χ² with `df` degrees of freedom.
fn chi2_sf(stat: f64, df: usize) -> f64 {
    let stat = stat.max(0.0);
    match ChiSquared::new(df as f64) {
        Ok(dist) => dist.sf(stat).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}
