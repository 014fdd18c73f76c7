//! Missing-value imputation for candidate columns.

/// Replace NaN entries with the mean of the observed ones.
///
/// A column with no observed value becomes all zeros. Returns the number
/// of imputed entries.
pub fn impute_missing_mean(values: &mut [f64]) -> usize {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    let mean = if n > 0 { sum / n as f64 } else { 0.0 };
    let mut imputed = 0;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = mean;
            imputed += 1;
        }
    }
    imputed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impute_missing_mean() {
        let mut v = vec![1.0, f64::NAN, 2.0, 0.0, f64::NAN];
        assert_eq!(impute_missing_mean(&mut v), 2);
        assert_eq!(v, vec![1.0, 1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_impute_all_missing() {
        let mut v = vec![f64::NAN; 3];
        assert_eq!(impute_missing_mean(&mut v), 3);
        assert_eq!(v, vec![0.0; 3]);

        let mut complete = vec![0.5, 1.5];
        assert_eq!(impute_missing_mean(&mut complete), 0);
        assert_eq!(complete, vec![0.5, 1.5]);
    }
}
