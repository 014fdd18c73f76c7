//! Tab/space-delimited labelled matrix parser.
//!
//! The first row is a header. One column holds row IDs (sample IDs); the
//! remaining columns, or a chosen subset, are parsed as numbers. Missing
//! values become NaN.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glimix_linalg::DenseMatrix;
use tracing::debug;

use crate::imputation::impute_missing_mean;

/// A numeric matrix with labelled rows and columns.
#[derive(Debug, Clone)]
pub struct LabeledMatrix {
    /// Row IDs in file order.
    pub row_ids: Vec<String>,
    /// Column names, in the order requested.
    pub col_names: Vec<String>,
    /// Values (NaN for missing), `row_ids.len() x col_names.len()`.
    pub data: DenseMatrix,
}

impl LabeledMatrix {
    pub fn nrows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn ncols(&self) -> usize {
        self.col_names.len()
    }

    /// Column `name` as a vector.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let j = self
            .col_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("Column '{}' not found", name))?;
        Ok(self.data.col(j))
    }

    /// Rows matching `ids`, in the order of `ids`.
    pub fn select_rows(&self, ids: &[String]) -> Result<Self> {
        let lookup: HashMap<&str, usize> = self
            .row_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let rows = ids
            .iter()
            .map(|id| {
                lookup
                    .get(id.as_str())
                    .copied()
                    .ok_or_else(|| anyhow!("Row ID '{}' not found", id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            row_ids: ids.to_vec(),
            col_names: self.col_names.clone(),
            data: self.data.select_rows(&rows),
        })
    }

    /// IDs of the rows with no missing value.
    pub fn complete_rows(&self) -> Vec<String> {
        (0..self.nrows())
            .filter(|&i| (0..self.ncols()).all(|j| !self.data.get(i, j).is_nan()))
            .map(|i| self.row_ids[i].clone())
            .collect()
    }

    /// IDs of the rows with no missing value among `columns`.
    pub fn complete_rows_over(&self, columns: &[String]) -> Result<Vec<String>> {
        let cols = self.column_indices(columns)?;
        Ok((0..self.nrows())
            .filter(|&i| cols.iter().all(|&j| !self.data.get(i, j).is_nan()))
            .map(|i| self.row_ids[i].clone())
            .collect())
    }

    /// Square submatrix with rows and columns both matching `ids`, for
    /// sample-by-sample matrices such as a kinship.
    pub fn select_square(&self, ids: &[String]) -> Result<Self> {
        let rows = self.select_rows(ids)?;
        let cols = self.column_indices(ids)?;
        Ok(Self {
            row_ids: ids.to_vec(),
            col_names: ids.to_vec(),
            data: rows.data.select_columns(&cols),
        })
    }

    /// Mean-impute the missing values of every column. Returns the number
    /// of imputed entries.
    pub fn impute_column_means(&mut self) -> usize {
        let mut imputed = 0;
        for j in 0..self.ncols() {
            let mut col = self.data.col(j);
            let n = impute_missing_mean(&mut col);
            if n > 0 {
                for (i, v) in col.into_iter().enumerate() {
                    self.data.set(i, j, v);
                }
                imputed += n;
            }
        }
        imputed
    }

    fn column_indices(&self, names: &[String]) -> Result<Vec<usize>> {
        let lookup: HashMap<&str, usize> = self
            .col_names
            .iter()
            .enumerate()
            .map(|(j, c)| (c.as_str(), j))
            .collect();
        names
            .iter()
            .map(|name| {
                lookup
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| anyhow!("Column '{}' not found", name))
            })
            .collect()
    }
}

/// Parse a labelled matrix file.
///
/// # Arguments
/// - `path`: Path to the delimited file
/// - `columns`: Columns to keep, in this order; `None` keeps every column
///   except the ID column
/// - `id_col`: Name of the row ID column
pub fn read_matrix_file(
    path: &Path,
    columns: Option<&[String]>,
    id_col: &str,
) -> Result<LabeledMatrix> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read matrix file: {}", path.display()))?;

    let mut lines = contents.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow!("Empty matrix file: {}", path.display()))?;

    let delim = if header_line.contains('\t') { '\t' } else { ' ' };
    let headers = split_fields(header_line, delim);

    let id_idx = headers
        .iter()
        .position(|&h| h == id_col)
        .ok_or_else(|| anyhow!("ID column '{}' not found in header", id_col))?;

    let col_names: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => headers
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != id_idx)
            .map(|(_, h)| h.to_string())
            .collect(),
    };
    let col_indices = col_names
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|&h| h == name.as_str())
                .ok_or_else(|| anyhow!("Column '{}' not found in header", name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    for (line_num, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line, delim);
        if fields.len() != headers.len() {
            bail!(
                "Line {} of {} has {} fields, header has {}",
                line_num + 2,
                path.display(),
                fields.len(),
                headers.len()
            );
        }
        row_ids.push(fields[id_idx].to_string());
        for &ci in &col_indices {
            values.push(parse_value(fields[ci]).with_context(|| {
                format!("Line {} of {}", line_num + 2, path.display())
            })?);
        }
    }

    debug!(
        "Read {} rows x {} columns from {}",
        row_ids.len(),
        col_names.len(),
        path.display()
    );

    let data = DenseMatrix::from_row_major(row_ids.len(), col_names.len(), &values);
    Ok(LabeledMatrix {
        row_ids,
        col_names,
        data,
    })
}

fn split_fields(line: &str, delim: char) -> Vec<&str> {
    if delim == '\t' {
        line.split('\t').map(|s| s.trim()).collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// Parse a cell, treating NA/missing as NaN.
fn parse_value(s: &str) -> Result<f64> {
    match s {
        "NA" | "na" | "Na" | "." | "" | "NaN" | "nan" => Ok(f64::NAN),
        _ => s
            .parse()
            .with_context(|| format!("Invalid numeric value '{}'", s)),
    }
}
