#![allow(clippy::needless_range_loop)]
//! Limited-memory BFGS with simple box constraints.
//!
//! Bounds are enforced by projecting every trial point onto the box and
//! freezing the coordinates held at an active bound. Steps are chosen by
//! Armijo backtracking along the projected path.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Configuration for L-BFGS.
#[derive(Debug, Clone)]
pub struct LbfgsConfig {
    /// Number of correction pairs kept.
    pub memory: usize,
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Stop when the projected gradient's max norm falls below this.
    pub pgtol: f64,
    /// Stop when the relative decrease of the objective falls below this.
    pub ftol: f64,
    /// Maximum number of backtracking steps per iteration.
    pub max_line_search: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iter: 500,
            pgtol: 1e-5,
            ftol: 1e-10,
            max_line_search: 40,
        }
    }
}

/// Result of L-BFGS.
#[derive(Debug, Clone)]
pub struct LbfgsResult {
    /// Final point.
    pub x: Vec<f64>,
    /// Objective at `x`.
    pub fx: f64,
    /// Gradient at `x`.
    pub grad: Vec<f64>,
    /// Number of iterations.
    pub iterations: usize,
    /// Whether a stopping criterion was met.
    pub converged: bool,
}

const ARMIJO: f64 = 1e-4;

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds.iter()) {
        *xi = xi.clamp(lo, hi);
    }
}

/// Coordinates that sit on a bound and whose gradient pushes outwards.
fn active_set(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> Vec<bool> {
    x.iter()
        .zip(g.iter())
        .zip(bounds.iter())
        .map(|((&xi, &gi), &(lo, hi))| (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0))
        .collect()
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> f64 {
    active_set(x, g, bounds)
        .iter()
        .zip(g.iter())
        .filter(|(active, _)| !**active)
        .map(|(_, gi)| gi.abs())
        .fold(0.0, f64::max)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Two-loop recursion: approximate `-H g` on the free coordinates.
fn search_direction(g: &[f64], free: &[bool], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q: Vec<f64> = g
        .iter()
        .zip(free.iter())
        .map(|(&gi, &f)| if f { gi } else { 0.0 })
        .collect();
    let mut alpha = vec![0.0; history.len()];
    for (k, (s, y, rho)) in history.iter().enumerate().rev() {
        alpha[k] = rho * dot(s, &q);
        for i in 0..q.len() {
            q[i] -= alpha[k] * y[i];
        }
    }
    if let Some((s, y, _)) = history.back() {
        let yy = dot(y, y);
        if yy > 0.0 {
            let gamma = dot(s, y) / yy;
            q.iter_mut().for_each(|v| *v *= gamma);
        }
    }
    for (k, (s, y, rho)) in history.iter().enumerate() {
        let beta = rho * dot(y, &q);
        for i in 0..q.len() {
            q[i] += s[i] * (alpha[k] - beta);
        }
    }
    q.iter()
        .zip(free.iter())
        .map(|(&v, &f)| if f { -v } else { 0.0 })
        .collect()
}

/// Minimise `objective` starting from `x0` within `bounds`.
///
/// The objective returns the value and gradient. An error at the starting
/// point is returned; errors at trial points are treated as an infinite
/// value and shorten the step.
pub fn lbfgs<F, E>(
    mut objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &LbfgsConfig,
) -> Result<LbfgsResult, E>
where
    F: FnMut(&[f64]) -> Result<(f64, Vec<f64>), E>,
{
    assert_eq!(x0.len(), bounds.len());
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let (mut fx, mut g) = objective(&x)?;

    let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(config.memory);
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..config.max_iter {
        iterations = iter + 1;
        let pg = projected_gradient_norm(&x, &g, bounds);
        debug!("L-BFGS iteration {}: f={:.8}, |pg|={:.3e}", iter, fx, pg);
        if pg < config.pgtol {
            converged = true;
            iterations = iter;
            break;
        }

        let free: Vec<bool> = active_set(&x, &g, bounds).iter().map(|a| !a).collect();
        let mut dir = search_direction(&g, &free, &history);
        let mut slope = dot(&g, &dir);
        if slope >= 0.0 {
            // Not a descent direction: restart from steepest descent.
            history.clear();
            dir = search_direction(&g, &free, &history);
            slope = dot(&g, &dir);
            if slope >= 0.0 {
                converged = true;
                break;
            }
        }

        let mut step = if history.is_empty() {
            let norm = dot(&dir, &dir).sqrt();
            (1.0 / norm).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..config.max_line_search {
            let mut trial: Vec<f64> = x.iter().zip(dir.iter()).map(|(xi, di)| xi + step * di).collect();
            project(&mut trial, bounds);
            let moved: Vec<f64> = trial.iter().zip(x.iter()).map(|(t, xi)| t - xi).collect();
            if let Ok((ft, gt)) = objective(&trial) {
                if ft.is_finite() && ft <= fx + ARMIJO * dot(&g, &moved) {
                    accepted = Some((trial, ft, gt, moved));
                    break;
                }
            }
            step *= 0.5;
        }

        let (x_new, f_new, g_new, s) = match accepted {
            Some(v) => v,
            None => {
                warn!("L-BFGS line search failed at iteration {}", iter);
                break;
            }
        };

        let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&y, &y) {
            if history.len() == config.memory {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        let decrease = fx - f_new;
        x = x_new;
        g = g_new;
        let scale = fx.abs().max(f_new.abs()).max(1.0);
        fx = f_new;
        if decrease <= config.ftol * scale {
            converged = true;
            break;
        }
    }

    Ok(LbfgsResult {
        x,
        fx,
        grad: g,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64]) -> Result<(f64, Vec<f64>), String> {
        let (a, b) = (x[0], x[1]);
        let f = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
        let g = vec![
            -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
            200.0 * (b - a * a),
        ];
        Ok((f, g))
    }

    #[test]
    fn test_lbfgs_rosenbrock() {
        let unbounded = vec![(f64::NEG_INFINITY, f64::INFINITY); 2];
        let config = LbfgsConfig {
            ftol: 0.0,
            pgtol: 1e-8,
            ..Default::default()
        };
        let res = lbfgs(rosenbrock, &[-1.2, 1.0], &unbounded, &config).unwrap();
        assert!((res.x[0] - 1.0).abs() < 1e-4, "x = {:?}", res.x);
        assert!((res.x[1] - 1.0).abs() < 1e-4, "x = {:?}", res.x);
    }

    #[test]
    fn test_lbfgs_respects_bounds() {
        // Unconstrained minimum at (2, -3); box keeps x0 <= 1 and x1 >= -1
        let f = |x: &[f64]| -> Result<(f64, Vec<f64>), String> {
            let v = (x[0] - 2.0).powi(2) + (x[1] + 3.0).powi(2);
            Ok((v, vec![2.0 * (x[0] - 2.0), 2.0 * (x[1] + 3.0)]))
        };
        let bounds = vec![(-5.0, 1.0), (-1.0, 5.0)];
        let res = lbfgs(f, &[0.0, 0.0], &bounds, &LbfgsConfig::default()).unwrap();
        assert!(res.converged);
        assert!((res.x[0] - 1.0).abs() < 1e-8);
        assert!((res.x[1] + 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_lbfgs_error_at_start() {
        let f = |_: &[f64]| -> Result<(f64, Vec<f64>), String> { Err("bad".to_string()) };
        let bounds = vec![(f64::NEG_INFINITY, f64::INFINITY)];
        assert!(lbfgs(f, &[0.0], &bounds, &LbfgsConfig::default()).is_err());
    }

    #[test]
    fn test_lbfgs_error_shortens_step() {
        // Objective fails for x > 1.5; minimum of the quadratic at 1.0
        let f = |x: &[f64]| -> Result<(f64, Vec<f64>), String> {
            if x[0] > 1.5 {
                return Err("outside domain".to_string());
            }
            Ok(((x[0] - 1.0).powi(2), vec![2.0 * (x[0] - 1.0)]))
        };
        let bounds = vec![(f64::NEG_INFINITY, f64::INFINITY)];
        let res = lbfgs(f, &[-10.0], &bounds, &LbfgsConfig::default()).unwrap();
        assert!((res.x[0] - 1.0).abs() < 1e-4);
    }
}
