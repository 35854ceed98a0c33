#![allow(clippy::needless_range_loop)]
//! Dense row-major tensor used by every layer in this crate.
//!
//! The tensor is deliberately small: it stores a shape and a flat `Vec<f32>`
//! and implements only the operations the layers need for forward and
//! backward passes over 2D batches and 3D `[batch, time, features]`
//! sequences.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// A multi-dimensional array of `f32` values in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use district_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Creates a new tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Creates a tensor from row vectors of equal length.
    ///
    /// Returns `None` when the rows have different lengths. An empty slice
    /// yields a `[0, width]` tensor.
    pub fn from_rows(rows: &[Vec<f32>], width: usize) -> Option<Self> {
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Some(Self {
            shape: vec![rows.len(), width],
            data,
        })
    }

    /// Samples a tensor uniformly from `[low, high)`.
    pub fn rand_uniform<R: Rng + ?Sized>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data = if high > low {
            let dist = Uniform::new(low, high);
            (0..numel).map(|_| dist.sample(rng)).collect()
        } else {
            vec![low; numel]
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Samples a tensor from a normal distribution.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], mean: f32, std: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data = match Normal::new(mean, std.max(f32::MIN_POSITIVE)) {
            Ok(dist) => (0..numel).map(|_| dist.sample(rng)).collect(),
            Err(_) => vec![mean; numel],
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its flat data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of rows of a 2D tensor (first dimension otherwise).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of columns of a 2D tensor (last dimension otherwise).
    pub fn cols(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Returns row `i` of a 2D tensor.
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Returns row `i` of a 2D tensor mutably.
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let cols = self.cols();
        &mut self.data[i * cols..(i + 1) * cols]
    }

    /// Matrix multiplication of two 2D tensors: `[m, k] x [k, n] -> [m, n]`.
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];
        debug_assert_eq!(k, other.shape[0]);
        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            let a_row = &self.data[i * k..(i + 1) * k];
            let out_row = &mut out[i * n..(i + 1) * n];
            for (p, &a) in a_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let b_row = &other.data[p * n..(p + 1) * n];
                for j in 0..n {
                    out_row[j] += a * b_row[j];
                }
            }
        }
        Tensor::from_data(&[m, n], out)
    }

    /// Transposes a 2D tensor.
    pub fn transpose(&self) -> Tensor {
        let m = self.shape[0];
        let n = self.shape[1];
        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            for j in 0..n {
                out[j * m + i] = self.data[i * n + j];
            }
        }
        Tensor::from_data(&[n, m], out)
    }

    /// Element-wise addition.
    ///
    /// A 1D `other` whose length equals the last dimension is broadcast
    /// across every row.
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let data = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + b)
                .collect();
            return Tensor::from_data(&self.shape, data);
        }
        let cols = other.numel();
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, a)| a + other.data[i % cols])
            .collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Element-wise subtraction of equally shaped tensors.
    pub fn sub(&self, other: &Tensor) -> Tensor {
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a - b)
            .collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Element-wise multiplication of equally shaped tensors.
    pub fn mul(&self, other: &Tensor) -> Tensor {
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .collect();
        Tensor::from_data(&self.shape, data)
    }

    /// In-place element-wise accumulation of an equally shaped tensor.
    pub fn add_assign(&mut self, other: &Tensor) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// Multiplies every element by a scalar.
    pub fn scale(&self, scalar: f32) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Sum of squared elements.
    pub fn sum_squares(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum()
    }

    /// Sums a 2D tensor over axis 0 (rows), producing a `[cols]` tensor.
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut out = vec![0.0f32; cols];
        for row in self.data.chunks(cols.max(1)) {
            for (o, v) in out.iter_mut().zip(row.iter()) {
                *o += v;
            }
        }
        Tensor::from_data(&[cols], out)
    }

    /// Column means of a 2D tensor.
    pub fn mean_rows(&self) -> Tensor {
        let n = self.rows().max(1) as f32;
        self.sum_rows().scale(1.0 / n)
    }

    /// Column (population) variances of a 2D tensor.
    pub fn var_rows(&self) -> Tensor {
        let mean = self.mean_rows();
        let cols = self.cols();
        let n = self.rows().max(1) as f32;
        let mut out = vec![0.0f32; cols];
        for row in self.data.chunks(cols.max(1)) {
            for j in 0..cols {
                let d = row[j] - mean.data[j];
                out[j] += d * d;
            }
        }
        for v in &mut out {
            *v /= n;
        }
        Tensor::from_data(&[cols], out)
    }

    /// Applies a function element-wise.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor::from_data(&self.shape, self.data.iter().map(|&x| f(x)).collect())
    }

    /// Logistic sigmoid applied element-wise.
    pub fn sigmoid(&self) -> Tensor {
        self.map(sigmoid)
    }

    /// Hyperbolic tangent applied element-wise.
    pub fn tanh(&self) -> Tensor {
        self.map(f32::tanh)
    }

    /// Returns a tensor with the same data and a new shape.
    ///
    /// # Panics
    ///
    /// Panics if the element count differs.
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        Tensor::from_data(new_shape, self.data.clone())
    }

    /// Concatenates two 2D tensors with the same row count along columns.
    pub fn concat_cols(&self, other: &Tensor) -> Tensor {
        let rows = self.rows();
        let a = self.cols();
        let b = other.cols();
        let mut out = Vec::with_capacity(rows * (a + b));
        for i in 0..rows {
            out.extend_from_slice(self.row(i));
            out.extend_from_slice(other.row(i));
        }
        Tensor::from_data(&[rows, a + b], out)
    }

    /// Copies columns `[start, end)` of a 2D tensor.
    pub fn slice_cols(&self, start: usize, end: usize) -> Tensor {
        let rows = self.rows();
        let mut out = Vec::with_capacity(rows * (end - start));
        for i in 0..rows {
            out.extend_from_slice(&self.row(i)[start..end]);
        }
        Tensor::from_data(&[rows, end - start], out)
    }

    /// Gathers the given rows of a 2D tensor.
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        let cols = self.cols();
        let mut out = Vec::with_capacity(indices.len() * cols);
        for &i in indices {
            out.extend_from_slice(self.row(i));
        }
        Tensor::from_data(&[indices.len(), cols], out)
    }

    /// Extracts timestep `t` of a `[batch, time, features]` tensor as `[batch, features]`.
    pub fn time_step(&self, t: usize) -> Tensor {
        let (batch, time, feat) = (self.shape[0], self.shape[1], self.shape[2]);
        let mut out = Vec::with_capacity(batch * feat);
        for b in 0..batch {
            let start = (b * time + t) * feat;
            out.extend_from_slice(&self.data[start..start + feat]);
        }
        Tensor::from_data(&[batch, feat], out)
    }

    /// Writes a `[batch, features]` slice into timestep `t` of a 3D tensor.
    pub fn set_time_step(&mut self, t: usize, step: &Tensor) {
        let (batch, time, feat) = (self.shape[0], self.shape[1], self.shape[2]);
        for b in 0..batch {
            let start = (b * time + t) * feat;
            self.data[start..start + feat].copy_from_slice(step.row(b));
        }
    }
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
