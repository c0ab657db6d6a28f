// Unnormalised DCT-II and its inverse over square `f32` matrices.
//
// Forward: `X[k] = sum_j x[j] * cos(pi / n * k * (j + 0.5))`.
// Inverse: `x[j] = 2 / n * (X[0] / 2 + sum_{k>=1} X[k] * cos(pi / n * k * (j + 0.5)))`.
// The 2D transforms apply the 1D transform to every row, then every column.

use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct Dct {
    n: usize,
    /// `cos[k * n + j] = cos(pi / n * k * (j + 0.5))`
    cos: Vec<f32>,
}

impl Dct {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "DCT size must be positive");
        let mut cos = Vec::with_capacity(n * n);
        for k in 0..n {
            for j in 0..n {
                cos.push((PI / n as f64 * k as f64 * (j as f64 + 0.5)).cos() as f32);
            }
        }
        Self { n, cos }
    }

    /// In-place 1D forward transform of `n` values spaced `stride` apart.
    pub fn forward_strided(&self, data: &mut [f32], offset: usize, stride: usize) {
        let n = self.n;
        let mut out = vec![0.0f32; n];
        for (k, y) in out.iter_mut().enumerate() {
            let basis = &self.cos[k * n..(k + 1) * n];
            *y = (0..n).map(|j| data[offset + j * stride] * basis[j]).sum();
        }
        for (j, y) in out.into_iter().enumerate() {
            data[offset + j * stride] = y;
        }
    }

    /// In-place 1D inverse transform of `n` values spaced `stride` apart.
    pub fn inverse_strided(&self, data: &mut [f32], offset: usize, stride: usize) {
        let n = self.n;
        let scale = 2.0 / n as f32;
        let mut out = vec![0.0f32; n];
        for (j, y) in out.iter_mut().enumerate() {
            let mut acc = data[offset] / 2.0;
            for k in 1..n {
                acc += data[offset + k * stride] * self.cos[k * n + j];
            }
            *y = acc * scale;
        }
        for (j, y) in out.into_iter().enumerate() {
            data[offset + j * stride] = y;
        }
    }

    /// Row-major `n * n` matrix, rows first then columns.
    pub fn forward_2d(&self, matrix: &mut [f32]) {
        let n = self.n;
        assert_eq!(matrix.len(), n * n, "matrix must be {n}x{n}");
        for row in 0..n {
            self.forward_strided(matrix, row * n, 1);
        }
        for col in 0..n {
            self.forward_strided(matrix, col, n);
        }
    }

    pub fn inverse_2d(&self, matrix: &mut [f32]) {
        let n = self.n;
        assert_eq!(matrix.len(), n * n, "matrix must be {n}x{n}");
        for col in 0..n {
            self.inverse_strided(matrix, col, n);
        }
        for row in 0..n {
            self.inverse_strided(matrix, row * n, 1);
        }
    }
}
