//! Dense Tensors for the Recurrent Network
//!
//! A minimal row-major `f32` tensor covering exactly what a single-layer tanh
//! RNN needs: matrix-vector products, transposed products for the backward
//! pass, outer-product accumulation, and a handful of elementwise kernels.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: `[rows, cols]`; column vectors are `[n, 1]`
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Example
//!
//! ```rust
//! use nickname_rnn::Tensor;
//!
//! let w = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let x = Tensor::column(vec![1.0, 0.0, 1.0]);
//! let y = w.matmul(&x);
//! assert_eq!(y.shape, vec![2, 1]);
//! assert_eq!(y.data, vec![4.0, 10.0]);
//! ```
//!
//! ## Parallelism
//!
//! Large kernels split work across cores with Rayon. Small tensors (a hidden
//! state of 50 units, say) stay sequential, because the RNN calls these
//! kernels once per timestep and the scheduling overhead would dominate.
//!
//! Every kernel rewrites existing buffers elementwise and never resizes them,
//! so a reader holding a parameter tensor can never see a freed or reshaped
//! buffer.

use rayon::prelude::*;

/// Element count above which elementwise kernels go parallel
const PARALLEL_THRESHOLD: usize = 16_384;

/// A two-dimensional array of `f32` values
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (`[rows, cols]`)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// Zero tensor with the same shape as `self`
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }

    /// Column vector `[n, 1]` from a flat vector
    pub fn column(data: Vec<f32>) -> Self {
        let n = data.len();
        Self::new(data, vec![n, 1])
    }

    /// Compute strides from shape (row-major layout)
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(1)
    }

    /// Computes: result[j] += a_val * b[j] for all j
    #[inline(always)]
    fn axpy_row(a_val: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication `self @ other`
    ///
    /// For `A` of shape `[m, k]` and `B` of shape `[k, n]` the result is
    /// `[m, n]`. In this crate `B` is almost always a column vector.
    ///
    /// # Panics
    ///
    /// Panics if inner dimensions differ
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        let m = self.rows();
        let k = self.cols();
        let n = other.cols();
        assert_eq!(
            k,
            other.rows(),
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            m,
            k,
            other.rows(),
            n
        );

        let mut result = vec![0.0; m * n];
        let row_kernel = |i: usize, out_row: &mut [f32]| {
            let a_row = &self.data[i * k..(i + 1) * k];
            for (l, &a_val) in a_row.iter().enumerate() {
                if a_val != 0.0 {
                    Self::axpy_row(a_val, &other.data[l * n..(l + 1) * n], out_row);
                }
            }
        };

        if m * n * k >= PARALLEL_THRESHOLD {
            result
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_kernel(i, out_row));
        } else {
            result
                .chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_kernel(i, out_row));
        }

        Tensor::new(result, vec![m, n])
    }

    /// Transposed multiplication `self^T @ other` without materializing the
    /// transpose
    ///
    /// For `A` of shape `[k, m]` and `B` of shape `[k, n]` the result is `[m, n]`.
    /// The backward pass uses this for `Wya^T · dy` and `Waa^T · draw`.
    pub fn transpose_matmul(&self, other: &Tensor) -> Tensor {
        let k = self.rows();
        let m = self.cols();
        let n = other.cols();
        assert_eq!(
            k,
            other.rows(),
            "Matrix dimensions incompatible: [{}, {}]^T @ [{}, {}]",
            k,
            m,
            other.rows(),
            n
        );

        let mut result = vec![0.0; m * n];
        let row_kernel = |i: usize, out_row: &mut [f32]| {
            for l in 0..k {
                let a_val = self.data[l * m + i];
                if a_val != 0.0 {
                    Self::axpy_row(a_val, &other.data[l * n..(l + 1) * n], out_row);
                }
            }
        };

        if m * n * k >= PARALLEL_THRESHOLD {
            result
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_kernel(i, out_row));
        } else {
            result
                .chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_kernel(i, out_row));
        }

        Tensor::new(result, vec![m, n])
    }

    /// Column `col` as a `[rows, 1]` vector
    ///
    /// Equivalent to `self @ one_hot(col)` at a fraction of the cost.
    pub fn column_at(&self, col: usize) -> Tensor {
        let (rows, cols) = (self.rows(), self.cols());
        assert!(col < cols, "Column {} out of range for {} columns", col, cols);
        let data = (0..rows).map(|r| self.data[r * cols + col]).collect();
        Tensor::column(data)
    }

    /// Element-wise addition of two tensors of identical shape
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.shape, other.shape, "Shape mismatch in add");
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Tensor::new(data, self.shape.clone())
    }

    /// In-place element-wise addition
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "Shape mismatch in add_assign");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// `self += a @ b^T` for column vectors `a` `[m, 1]` and `b` `[n, 1]`
    ///
    /// Zero entries of `b` are skipped; most of them are zero when `b` is a
    /// hidden state near initialization.
    pub fn add_outer(&mut self, a: &Tensor, b: &Tensor) {
        let (m, n) = (self.rows(), self.cols());
        assert_eq!(a.data.len(), m, "Outer product row mismatch");
        assert_eq!(b.data.len(), n, "Outer product column mismatch");

        let kernel = |i: usize, row: &mut [f32]| {
            let a_val = a.data[i];
            if a_val != 0.0 {
                Self::axpy_row(a_val, &b.data, row);
            }
        };

        if m * n >= PARALLEL_THRESHOLD {
            self.data
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, row)| kernel(i, row));
        } else {
            self.data
                .chunks_mut(n)
                .enumerate()
                .for_each(|(i, row)| kernel(i, row));
        }
    }

    /// `self[:, col] += v`, i.e. `self += v @ one_hot(col)^T`
    pub fn add_to_column(&mut self, col: usize, v: &Tensor) {
        let (rows, cols) = (self.rows(), self.cols());
        assert!(col < cols, "Column {} out of range for {} columns", col, cols);
        assert_eq!(v.data.len(), rows, "Column length mismatch");
        for (r, &val) in v.data.iter().enumerate() {
            self.data[r * cols + col] += val;
        }
    }

    /// Element-wise hyperbolic tangent
    pub fn tanh(&self) -> Tensor {
        Tensor::new(
            self.data.iter().map(|&x| x.tanh()).collect(),
            self.shape.clone(),
        )
    }

    /// Softmax over all elements
    ///
    /// Uses the numerically stable form
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    /// ```
    ///
    /// # Example
    ///
    /// ```rust
    /// # use nickname_rnn::Tensor;
    /// let p = Tensor::column(vec![1.0, 2.0, 3.0]).softmax();
    /// let total: f32 = p.data.iter().sum();
    /// assert!((total - 1.0).abs() < 1e-6);
    /// ```
    pub fn softmax(&self) -> Tensor {
        let max = self.data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp_values: Vec<f32> = self.data.iter().map(|&x| (x - max).exp()).collect();
        let sum: f32 = exp_values.iter().sum();
        let result = exp_values.into_iter().map(|x| x / sum).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Clamp every element into `[lo, hi]` in place
    pub fn clamp_inplace(&mut self, lo: f32, hi: f32) {
        if self.data.len() >= PARALLEL_THRESHOLD {
            self.data.par_iter_mut().for_each(|v| *v = v.clamp(lo, hi));
        } else {
            self.data.iter_mut().for_each(|v| *v = v.clamp(lo, hi));
        }
    }

    /// `self -= scale * other`, elementwise and in place
    pub fn sub_scaled_inplace(&mut self, other: &Tensor, scale: f32) {
        assert_eq!(self.shape, other.shape, "Shape mismatch in sub_scaled_inplace");
        if self.data.len() >= PARALLEL_THRESHOLD {
            self.data
                .par_iter_mut()
                .zip(other.data.par_iter())
                .for_each(|(p, &g)| *p -= scale * g);
        } else {
            for (p, &g) in self.data.iter_mut().zip(&other.data) {
                *p -= scale * g;
            }
        }
    }

    /// Largest absolute value, 0.0 for an empty tensor
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, &v| m.max(v.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::zeros(vec![3, 4]);
        assert_eq!(t.strides, vec![4, 1]);
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 4);
    }

    #[test]
    fn test_matmul_matrix_vector() {
        let w = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let x = Tensor::column(vec![1.0, 1.0, 2.0]);
        assert_eq!(w.matmul(&x).data, vec![9.0, 21.0]);
    }

    #[test]
    fn test_matmul_parallel_matches_sequential() {
        let (m, k) = (40, 600);
        let a = Tensor::new((0..m * k).map(|i| (i % 7) as f32 - 3.0).collect(), vec![m, k]);
        let x = Tensor::column((0..k).map(|i| (i % 5) as f32 * 0.5).collect());
        let fast = a.matmul(&x);

        for i in 0..m {
            let expected: f32 = (0..k).map(|l| a.data[i * k + l] * x.data[l]).sum();
            assert!((fast.data[i] - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_transpose_matmul() {
        // A = [[1, 2], [3, 4], [5, 6]] (3x2), A^T @ [1, 0, 1] = [6, 8]
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]);
        let v = Tensor::column(vec![1.0, 0.0, 1.0]);
        let r = a.transpose_matmul(&v);
        assert_eq!(r.shape, vec![2, 1]);
        assert_eq!(r.data, vec![6.0, 8.0]);
    }

    #[test]
    fn test_column_at_equals_one_hot_product() {
        let w = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let one_hot = Tensor::column(vec![0.0, 1.0, 0.0]);
        assert_eq!(w.column_at(1), w.matmul(&one_hot));
    }

    #[test]
    fn test_add_outer_and_column() {
        let mut acc = Tensor::zeros(vec![2, 3]);
        acc.add_outer(&Tensor::column(vec![1.0, 2.0]), &Tensor::column(vec![1.0, 0.0, -1.0]));
        assert_eq!(acc.data, vec![1.0, 0.0, -1.0, 2.0, 0.0, -2.0]);

        acc.add_to_column(1, &Tensor::column(vec![5.0, 6.0]));
        assert_eq!(acc.data, vec![1.0, 5.0, -1.0, 2.0, 6.0, -2.0]);
    }

    #[test]
    fn test_softmax_stable_for_large_logits() {
        let p = Tensor::column(vec![1000.0, 1000.0]).softmax();
        assert!((p.data[0] - 0.5).abs() < 1e-6);
        assert!(p.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_clamp_and_sub_scaled() {
        let mut g = Tensor::column(vec![-10.0, 0.5, 7.0]);
        g.clamp_inplace(-5.0, 5.0);
        assert_eq!(g.data, vec![-5.0, 0.5, 5.0]);

        let mut p = Tensor::column(vec![1.0, 1.0, 1.0]);
        p.sub_scaled_inplace(&g, 0.1);
        assert!((p.data[0] - 1.5).abs() < 1e-6);
        assert!((p.data[2] - 0.5).abs() < 1e-6);
    }
}
