//! Linear mean `m = Xβ`.

use glimix_linalg::DenseMatrix;

#[derive(Debug, Clone)]
pub struct LinearMean {
    x: DenseMatrix,
    beta: Vec<f64>,
}

impl LinearMean {
    pub fn new(x: DenseMatrix) -> Self {
        let beta = vec![0.0; x.ncols()];
        Self { x, beta }
    }

    pub fn x(&self) -> &DenseMatrix {
        &self.x
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn set_beta(&mut self, beta: &[f64]) {
        assert_eq!(beta.len(), self.x.ncols());
        self.beta = beta.to_vec();
    }

    pub fn n_params(&self) -> usize {
        self.beta.len()
    }

    pub fn value(&self) -> Vec<f64> {
        self.x.mat_vec(&self.beta)
    }

    /// Derivative with respect to β.
    pub fn gradient(&self) -> &DenseMatrix {
        &self.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_mean() {
        let x = DenseMatrix::from_row_major(3, 2, &[1.0, 0.5, 1.0, -1.0, 1.0, 2.0]);
        let mut mean = LinearMean::new(x);
        assert_eq!(mean.value(), vec![0.0; 3]);
        mean.set_beta(&[2.0, 1.0]);
        assert_eq!(mean.value(), vec![2.5, 1.0, 4.0]);
        assert_eq!(mean.n_params(), 2);
    }
}
