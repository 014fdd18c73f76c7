//! Sample ID intersection across input files.
//!
//! Phenotype, covariate, kinship and marker files rarely list the same
//! samples in the same order; every model needs them aligned.

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::info;

use crate::matrix_file::LabeledMatrix;

/// Result of intersecting sample IDs from several sources.
#[derive(Debug, Clone)]
pub struct SampleIntersection {
    /// Shared sample IDs, in the order of the first source.
    pub ids: Vec<String>,
    /// `indices[s][i]` is the position of `ids[i]` in source `s`.
    pub indices: Vec<Vec<usize>>,
}

/// Intersect sample IDs from several sources.
///
/// The result keeps the order of the first source.
pub fn intersect_samples(sources: &[&[String]]) -> SampleIntersection {
    if sources.is_empty() {
        return SampleIntersection {
            ids: Vec::new(),
            indices: Vec::new(),
        };
    }

    let maps: Vec<HashMap<&str, usize>> = sources
        .iter()
        .map(|ids| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect()
        })
        .collect();

    let mut ids = Vec::new();
    let mut indices: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];
    for (first_idx, id) in sources[0].iter().enumerate() {
        let positions: Option<Vec<usize>> =
            maps[1..].iter().map(|m| m.get(id.as_str()).copied()).collect();
        if let Some(positions) = positions {
            ids.push(id.clone());
            indices[0].push(first_idx);
            for (s, pos) in positions.into_iter().enumerate() {
                indices[s + 1].push(pos);
            }
        }
    }

    SampleIntersection { ids, indices }
}

/// Inputs restricted to a shared sample set, all in the same row order.
#[derive(Debug, Clone)]
pub struct AlignedInputs {
    /// Shared sample IDs.
    pub ids: Vec<String>,
    /// The inputs that had to be complete, in the order passed.
    pub complete: Vec<LabeledMatrix>,
    /// Square kinship over `ids`.
    pub kinship: Option<LabeledMatrix>,
    /// Candidate markers over `ids`, missing calls left as NaN.
    pub markers: Option<LabeledMatrix>,
}

/// Align inputs on the samples usable by every one of them.
///
/// A sample is kept when it has no missing value in any of `complete`,
/// appears as both a row and a column of `kinship` with a complete row
/// over the other kept samples, and is listed in `markers`. Marker calls
/// may be missing. Row order follows the first input.
pub fn align_inputs(
    complete: &[&LabeledMatrix],
    kinship: Option<&LabeledMatrix>,
    markers: Option<&LabeledMatrix>,
) -> Result<AlignedInputs> {
    let mut sources: Vec<Vec<String>> = complete.iter().map(|m| m.complete_rows()).collect();
    if let Some(k) = kinship {
        sources.push(k.row_ids.clone());
        sources.push(k.col_names.clone());
    }
    if let Some(m) = markers {
        sources.push(m.row_ids.clone());
    }
    let refs: Vec<&[String]> = sources.iter().map(|ids| ids.as_slice()).collect();
    let mut ids = intersect_samples(&refs).ids;

    // Dropping rows only shrinks the column set, so one pass leaves every
    // kept kinship row complete.
    if let Some(k) = kinship {
        let usable = k.complete_rows_over(&ids)?;
        let dropped = ids.len() - usable.len();
        if dropped > 0 {
            info!("{} samples dropped for missing kinship entries", dropped);
        }
        ids = intersect_samples(&[&ids, &usable]).ids;
    }
    if ids.is_empty() {
        bail!("No sample is usable in every input file");
    }
    info!("{} samples shared across inputs", ids.len());

    Ok(AlignedInputs {
        complete: complete
            .iter()
            .map(|m| m.select_rows(&ids))
            .collect::<Result<_>>()?,
        kinship: kinship.map(|k| k.select_square(&ids)).transpose()?,
        markers: markers.map(|m| m.select_rows(&ids)).transpose()?,
        ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimix_linalg::DenseMatrix;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_intersect_two_sources() {
        let src1 = ids(&["A", "B", "C", "D"]);
        let src2 = ids(&["C", "A", "E"]);

        let result = intersect_samples(&[&src1, &src2]);
        assert_eq!(result.ids, vec!["A", "C"]);
        assert_eq!(result.indices[0], vec![0, 2]);
        assert_eq!(result.indices[1], vec![1, 0]);
    }

    #[test]
    fn test_intersect_three_sources() {
        let s1 = ids(&["A", "B", "C"]);
        let s2 = ids(&["B", "C", "D"]);
        let s3 = ids(&["C", "B", "E"]);

        let result = intersect_samples(&[&s1, &s2, &s3]);
        assert_eq!(result.ids, vec!["B", "C"]);
        assert_eq!(result.indices[2], vec![1, 0]);
    }

    #[test]
    fn test_empty_intersection() {
        let s1 = ids(&["A", "B"]);
        let s2 = ids(&["C", "D"]);
        assert!(intersect_samples(&[&s1, &s2]).ids.is_empty());
    }

    fn labeled(rows: &[&str], cols: &[&str], values: &[f64]) -> LabeledMatrix {
        LabeledMatrix {
            row_ids: ids(rows),
            col_names: ids(cols),
            data: DenseMatrix::from_row_major(rows.len(), cols.len(), values),
        }
    }

    #[test]
    fn test_align_drops_incomplete_rows() {
        let pheno = labeled(&["A", "B", "C"], &["y"], &[1.0, f64::NAN, 3.0]);
        let covar = labeled(&["C", "B", "A"], &["age"], &[30.0, 20.0, 10.0]);
        let aligned = align_inputs(&[&pheno, &covar], None, None).unwrap();
        assert_eq!(aligned.ids, vec!["A", "C"]);
        assert_eq!(aligned.complete[1].data.col(0), vec![10.0, 30.0]);
        assert!(aligned.kinship.is_none());
    }

    #[test]
    fn test_markers_with_missing_calls_keep_every_sample() {
        let samples = ["A", "B", "C", "D", "E", "F"];
        let pheno = labeled(&samples, &["y"], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut values = vec![1.0; 36];
        for i in 0..6 {
            values[i * 6 + i] = f64::NAN;
        }
        values[1] = 0.0;
        let markers = labeled(&samples, &["m1", "m2", "m3", "m4", "m5", "m6"], &values);

        let aligned = align_inputs(&[&pheno], None, Some(&markers)).unwrap();
        assert_eq!(aligned.ids.len(), 6);

        let mut m = aligned.markers.unwrap();
        assert_eq!(m.impute_column_means(), 6);
        assert!(m.data.is_finite());
        // Column m2 observed {0, 1, 1, 1, 1} before imputing B.
        assert_eq!(m.data.get(1, 1), 0.8);
        assert_eq!(m.data.get(0, 0), 1.0);
    }

    #[test]
    fn test_kinship_gap_outside_kept_samples() {
        let pheno = labeled(&["A", "B", "C"], &["y"], &[1.0, 2.0, f64::NAN]);
        let kin = labeled(
            &["C", "B", "A"],
            &["A", "B", "C"],
            &[f64::NAN, 0.1, 1.0, 0.2, 1.0, 0.1, 1.0, 0.2, f64::NAN],
        );
        let aligned = align_inputs(&[&pheno], Some(&kin), None).unwrap();
        assert_eq!(aligned.ids, vec!["A", "B"]);

        let k = aligned.kinship.unwrap();
        assert_eq!(k.col_names, vec!["A", "B"]);
        assert_eq!(k.data.get(0, 0), 1.0);
        assert_eq!(k.data.get(0, 1), 0.2);
        assert_eq!(k.data.get(1, 0), 0.2);
    }

    #[test]
    fn test_kinship_gap_inside_kept_samples() {
        let pheno = labeled(&["A", "B", "C"], &["y"], &[1.0, 2.0, 3.0]);
        let kin = labeled(
            &["A", "B", "C"],
            &["A", "B", "C"],
            &[1.0, 0.1, 0.0, 0.1, 1.0, f64::NAN, 0.0, 0.0, 1.0],
        );
        let aligned = align_inputs(&[&pheno], Some(&kin), None).unwrap();
        assert_eq!(aligned.ids, vec!["A", "C"]);
    }

    #[test]
    fn test_align_fails_without_shared_samples() {
        let pheno = labeled(&["A"], &["y"], &[f64::NAN]);
        assert!(align_inputs(&[&pheno], None, None).is_err());
    }
}
