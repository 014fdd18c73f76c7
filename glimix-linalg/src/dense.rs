#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major `Mat<f64>`. Column-major storage lines up
//! with the `vec` operator used throughout the Kronecker algebra: for an
//! `n x p` outcome matrix `Y`, `vec(Y)` stacks its columns, so
//! [`DenseMatrix::to_col_major`] is `vec` and
//! [`DenseMatrix::from_col_major`] is its inverse.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a matrix whose entries are given by `f(row, col)`.
    pub fn from_fn<F>(nrows: usize, ncols: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self {
            inner: Mat::from_fn(nrows, ncols, f),
        }
    }

    /// Create a dense matrix from a flat vec in column-major order (`unvec`).
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        Self::from_fn(nrows, ncols, |i, j| data[j * nrows + i])
    }

    /// Create a dense matrix from row-major data.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        Self::from_fn(nrows, ncols, |i, j| data[i * ncols + j])
    }

    /// Identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Column vector (n x 1) from a slice.
    pub fn from_vec(data: &[f64]) -> Self {
        Self::from_fn(data.len(), 1, |i, _| data[i])
    }

    /// Diagonal matrix from a vector.
    pub fn from_diag(diag: &[f64]) -> Self {
        let n = diag.len();
        Self::from_fn(n, n, |i, j| if i == j { diag[i] } else { 0.0 })
    }

    /// Build a matrix from column vectors of equal length.
    pub fn from_columns(nrows: usize, cols: &[Vec<f64>]) -> Self {
        for c in cols {
            assert_eq!(c.len(), nrows);
        }
        Self::from_fn(nrows, cols.len(), |i, j| cols[j][i])
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product `self * v`.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product `self' * v`.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        (0..self.ncols())
            .map(|j| (0..self.nrows()).map(|i| self.inner.read(i, j) * v[i]).sum())
            .collect()
    }

    /// Matrix-matrix product `self * other`.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        DenseMatrix {
            inner: &self.inner * &other.inner,
        }
    }

    /// `self' * other` without materialising the transpose.
    pub fn t_mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        DenseMatrix {
            inner: self.inner.transpose() * other.inner.as_ref(),
        }
    }

    pub fn transpose(&self) -> DenseMatrix {
        DenseMatrix {
            inner: self.inner.transpose().to_owned(),
        }
    }

    /// Extract column j.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Extract row i.
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.inner.read(i, j)).collect()
    }

    /// Keep only the listed columns, in the given order.
    pub fn select_columns(&self, cols: &[usize]) -> DenseMatrix {
        Self::from_fn(self.nrows(), cols.len(), |i, j| self.get(i, cols[j]))
    }

    /// Keep only the listed rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> DenseMatrix {
        Self::from_fn(rows.len(), self.ncols(), |i, j| self.get(rows[i], j))
    }

    /// Concatenate matrices with the same number of rows side by side.
    pub fn hstack(blocks: &[&DenseMatrix]) -> DenseMatrix {
        let nrows = blocks.first().map_or(0, |b| b.nrows());
        let mut offsets = Vec::with_capacity(blocks.len());
        let mut ncols = 0;
        for b in blocks {
            assert_eq!(b.nrows(), nrows);
            offsets.push(ncols);
            ncols += b.ncols();
        }
        let mut out = DenseMatrix::zeros(nrows, ncols);
        for (b, &off) in blocks.iter().zip(offsets.iter()) {
            for j in 0..b.ncols() {
                for i in 0..nrows {
                    out.set(i, off + j, b.get(i, j));
                }
            }
        }
        out
    }

    /// Element-wise addition.
    pub fn add(&self, other: &DenseMatrix) -> DenseMatrix {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &DenseMatrix) -> DenseMatrix {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &DenseMatrix) -> DenseMatrix {
        self.zip_with(other, |a, b| a * b)
    }

    fn zip_with<F>(&self, other: &DenseMatrix, f: F) -> DenseMatrix
    where
        F: Fn(f64, f64) -> f64,
    {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        Self::from_fn(self.nrows(), self.ncols(), |i, j| {
            f(self.inner.read(i, j), other.inner.read(i, j))
        })
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        Self::from_fn(self.nrows(), self.ncols(), |i, j| self.inner.read(i, j) * s)
    }

    /// Diagonal of a (possibly rectangular) matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    pub fn trace(&self) -> f64 {
        self.diag().iter().sum()
    }

    /// Sum of the element-wise product, i.e. `tr(self' * other)`.
    pub fn frobenius_dot(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let mut s = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * other.inner.read(i, j);
            }
        }
        s
    }

    /// Largest absolute element-wise difference.
    pub fn max_abs_diff(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let mut m: f64 = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                m = m.max((self.inner.read(i, j) - other.inner.read(i, j)).abs());
            }
        }
        m
    }

    /// Kronecker product `a ⊗ b`.
    ///
    /// Entry `(i_a * b.nrows() + i_b, j_a * b.ncols() + j_b)` equals
    /// `a[i_a, j_a] * b[i_b, j_b]`, so `(a ⊗ b) vec(X) = vec(b X a')`.
    pub fn kron(a: &DenseMatrix, b: &DenseMatrix) -> DenseMatrix {
        let (bm, bn) = (b.nrows(), b.ncols());
        Self::from_fn(a.nrows() * bm, a.ncols() * bn, |i, j| {
            a.get(i / bm, j / bn) * b.get(i % bm, j % bn)
        })
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Column-major flattening (`vec`).
    pub fn to_col_major(&self) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.nrows() * self.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                data.push(self.inner.read(i, j));
            }
        }
        data
    }

    /// True if no entry is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        (0..self.ncols()).all(|j| (0..self.nrows()).all(|i| self.inner.read(i, j).is_finite()))
    }

    /// Unbiased sample variance of every column.
    pub fn column_variances(&self) -> Vec<f64> {
        let n = self.nrows();
        (0..self.ncols())
            .map(|j| {
                if n < 2 {
                    return 0.0;
                }
                let col = self.col(j);
                let mean = col.iter().sum::<f64>() / n as f64;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
            })
            .collect()
    }

    /// Symmetrise in place: `(A + A') / 2`.
    pub fn symmetrize(&mut self) {
        let n = self.nrows();
        assert_eq!(n, self.ncols());
        for j in 0..n {
            for i in (j + 1)..n {
                let v = 0.5 * (self.get(i, j) + self.get(j, i));
                self.set(i, j, v);
                self.set(j, i, v);
            }
        }
    }
}

impl std::fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{:.6}", self.inner.read(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
