//! Parametrised covariance functions.
//!
//! Every covariance exposes its free parameters as a flat vector so the
//! optimisers can drive it, plus the derivative of its value with respect
//! to each parameter.

pub mod eye;
pub mod free_form;
pub mod given;
pub mod kron2sum;
pub mod lr_free_form;

pub use eye::EyeCov;
pub use free_form::FreeFormCov;
pub use given::GivenCov;
pub use kron2sum::Kron2SumCov;
pub use lr_free_form::LrFreeFormCov;

use glimix_linalg::DenseMatrix;

/// Lower and upper bound for the log-scale parameters.
pub const LOG_SCALE_BOUNDS: (f64, f64) = (-20.0, 10.0);

pub trait Covariance {
    /// Side of the (square) covariance matrix.
    fn dim(&self) -> usize;

    /// Current covariance matrix.
    fn value(&self) -> DenseMatrix;

    /// Free parameters, in the order used by [`Covariance::gradient`].
    fn params(&self) -> Vec<f64>;

    /// Replace the free parameters. Panics on a length mismatch.
    fn set_params(&mut self, params: &[f64]);

    /// Derivative of [`Covariance::value`] with respect to each parameter.
    fn gradient(&self) -> Vec<DenseMatrix>;

    fn param_names(&self) -> Vec<String>;

    fn n_params(&self) -> usize {
        self.params().len()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); self.n_params()]
    }
}

/// Derivative of `L L'` with respect to `L[i, j]`, scaled by `factor`:
/// `factor * (e_i L[:, j]' + L[:, j] e_i')`.
pub(crate) fn outer_product_derivative(l: &DenseMatrix, i: usize, j: usize, factor: f64) -> DenseMatrix {
    let d = l.nrows();
    let mut out = DenseMatrix::zeros(d, d);
    for b in 0..d {
        let v = factor * l.get(b, j);
        out.set(i, b, out.get(i, b) + v);
        out.set(b, i, out.get(b, i) + v);
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Covariance;

    /// Compare the analytical gradient against central finite differences.
    pub fn check_gradient<C: Covariance>(cov: &mut C, tol: f64) {
        let theta = cov.params();
        let grad = cov.gradient();
        let h = 1e-6;
        for (k, g) in grad.iter().enumerate() {
            let mut plus = theta.clone();
            plus[k] += h;
            cov.set_params(&plus);
            let vp = cov.value();
            let mut minus = theta.clone();
            minus[k] -= h;
            cov.set_params(&minus);
            let vm = cov.value();
            cov.set_params(&theta);
            let fd = vp.sub(&vm).scale(0.5 / h);
            let err = fd.max_abs_diff(g);
            assert!(err < tol, "param {}: gradient error {}", k, err);
        }
    }
}
