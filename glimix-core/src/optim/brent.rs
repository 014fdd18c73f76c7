//! Brent's bounded scalar minimisation.
//!
//! Golden-section search accelerated by successive parabolic
//! interpolation (Brent 1973, `fmin`). The objective is never evaluated at
//! the interval end points.

use tracing::debug;

/// Configuration for Brent's method.
#[derive(Debug, Clone)]
pub struct BrentConfig {
    /// Absolute tolerance on the minimiser.
    pub tol: f64,
    /// Maximum number of objective evaluations.
    pub max_iter: usize,
}

impl Default for BrentConfig {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_iter: 500,
        }
    }
}

/// Result of Brent's method.
#[derive(Debug, Clone)]
pub struct BrentResult {
    /// Location of the minimum.
    pub x: f64,
    /// Objective value at `x`.
    pub fx: f64,
    /// Number of iterations.
    pub iterations: usize,
    /// Whether the interval shrank below tolerance.
    pub converged: bool,
}

/// Minimise `f` over `[lo, hi]`.
pub fn brent<F>(mut f: F, lo: f64, hi: f64, config: &BrentConfig) -> BrentResult
where
    F: FnMut(f64) -> f64,
{
    assert!(lo < hi, "empty search interval");
    let golden = 0.5 * (3.0 - 5f64.sqrt());
    let eps = f64::EPSILON.sqrt();

    let (mut a, mut b) = (lo, hi);
    let mut x = a + golden * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = f(x);
    let (mut fw, mut fv) = (fx, fx);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 0..config.max_iter {
        let xm = 0.5 * (a + b);
        let tol1 = eps * x.abs() + config.tol / 3.0;
        let tol2 = 2.0 * tol1;

        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            debug!("Brent converged after {} iterations: x={:.6}, f={:.6}", iter, x, fx);
            return BrentResult {
                x,
                fx,
                iterations: iter,
                converged: true,
            };
        }

        let mut take_golden = true;
        if e.abs() > tol1 {
            // Parabola through (v, fv), (w, fw), (x, fx)
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            let e_prev = e;
            e = d;
            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                take_golden = false;
            }
        }
        if take_golden {
            e = if x >= xm { a - x } else { b - x };
            d = golden * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    BrentResult {
        x,
        fx,
        iterations: config.max_iter,
        converged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brent_quadratic() {
        let res = brent(|x| (x - 1.3).powi(2) + 0.5, -5.0, 5.0, &BrentConfig::default());
        assert!(res.converged);
        assert!((res.x - 1.3).abs() < 1e-5);
        assert!((res.fx - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_brent_boundary_minimum() {
        // Monotone decreasing: minimum at the upper bound
        let res = brent(|x| -x, 0.0, 2.0, &BrentConfig::default());
        assert!(res.x > 2.0 - 1e-4);
        assert!(res.x <= 2.0);
    }

    #[test]
    fn test_brent_non_smooth() {
        let res = brent(|x: f64| (x + 0.7).abs(), -3.0, 4.0, &BrentConfig::default());
        assert!((res.x + 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_brent_infinite_values_ignored() {
        let f = |x: f64| if x < -1.0 { f64::INFINITY } else { (x - 0.25).powi(2) };
        let res = brent(f, -4.0, 4.0, &BrentConfig::default());
        assert!((res.x - 0.25).abs() < 1e-5);
    }
}
