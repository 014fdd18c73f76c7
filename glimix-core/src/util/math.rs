//! Mathematical utility functions.

/// ln(2π).
pub const LOG2PI: f64 = 1.837_877_066_409_345_5;

/// Logistic function 1 / (1 + exp(-x)).
pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Smallest positive normal number; scales are clamped to it.
pub fn tiny() -> f64 {
    f64::MIN_POSITIVE
}

/// True if every value is finite.
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2pi() {
        assert!((LOG2PI - (2.0 * std::f64::consts::PI).ln()).abs() < 1e-15);
    }

    #[test]
    fn test_logistic() {
        for &x in &[-30.0, -2.5, 0.0, 0.7, 12.0] {
            let p = logistic(x);
            assert!(p > 0.0 && p < 1.0);
            if x.abs() < 20.0 {
                assert!(((p / (1.0 - p)).ln() - x).abs() < 1e-8, "x={}", x);
            }
        }
        assert_eq!(logistic(0.0), 0.5);
        assert!(logistic(-800.0) >= 0.0 && logistic(800.0) <= 1.0);
    }
}
