//! Dense f32 tensor with an explicit shape.
//!
//! Storage is contiguous and row-major. The invariant `data.len() ==
//! shape.iter().product()` holds for every tensor, including tensors read back
//! from a parameter file.

use crate::error::{EngineError, Result};
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};

/// Dense numeric buffer with an explicit shape.
///
/// # Example
///
/// ```
/// use neural_layers::Tensor;
///
/// let a = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let b = a.transpose().unwrap();
/// assert_eq!(b.data(), &[1.0, 3.0, 2.0, 4.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorData")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

// Unvalidated wire form; converted through `Tensor::new`.
#[derive(Deserialize)]
struct TensorData {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<TensorData> for Tensor {
    type Error = EngineError;

    fn try_from(raw: TensorData) -> Result<Self> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    /// Create a tensor from a shape and row-major data.
    ///
    /// Fails with a shape error if a dimension is zero, the shape is empty, or
    /// the data length differs from the product of the dimensions.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || shape.contains(&0) || expected != data.len() {
            return Err(EngineError::shape(&shape, &[data.len()], "tensor creation"));
        }
        Ok(Self { shape, data })
    }

    /// Zero-filled tensor.
    ///
    /// # Panics
    ///
    /// Panics if `shape` is empty or contains a zero dimension.
    pub fn zeros(shape: &[usize]) -> Self {
        assert!(
            !shape.is_empty() && !shape.contains(&0),
            "tensor dimensions must be positive, got {:?}",
            shape
        );
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Rank-1 tensor owning `data`.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn from_vec(data: Vec<f32>) -> Self {
        assert!(!data.is_empty(), "tensor data must not be empty");
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Tensor filled with uniform samples in `[low, high)`.
    pub fn random_uniform(shape: &[usize], low: f32, high: f32, rng: &mut SimpleRng) -> Self {
        let mut tensor = Self::zeros(shape);
        rng.fill_uniform(&mut tensor.data, low, high);
        tensor
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a valid tensor; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// View the same elements under another shape with equal element count.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        let count: usize = shape.iter().product();
        if shape.is_empty() || shape.contains(&0) || count != self.len() {
            return Err(EngineError::shape(shape, &self.shape, "reshape"));
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: self.data.clone(),
        })
    }

    /// Rank-1 copy of this tensor.
    pub fn flatten(&self) -> Tensor {
        Self {
            shape: vec![self.len()],
            data: self.data.clone(),
        }
    }

    fn zip_with(&self, other: &Tensor, operation: &str, f: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
        if self.shape != other.shape {
            return Err(EngineError::shape(&self.shape, &other.shape, operation));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// In-place elementwise accumulation, used by gradient accumulators.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(EngineError::shape(&self.shape, &other.shape, "add_assign"));
        }
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Scalar-tensor product.
    pub fn scale(&self, factor: f32) -> Tensor {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| v * factor).collect(),
        }
    }

    /// Set every element to zero, keeping the shape.
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    fn matrix_dims(&self, operation: &str) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            _ => Err(EngineError::Shape {
                expected: vec![0, 0],
                actual: self.shape.clone(),
                operation: format!("{} (rank-2 tensor required)", operation),
            }),
        }
    }

    /// Matrix product of two rank-2 tensors: (m × k) · (k × n) → (m × n).
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        let (m, k) = self.matrix_dims("matmul")?;
        let (k2, n) = other.matrix_dims("matmul")?;
        if k != k2 {
            return Err(EngineError::shape(&[k, n], &other.shape, "matmul"));
        }

        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            let out_row = &mut out[i * n..(i + 1) * n];
            for p in 0..k {
                let a = self.data[i * k + p];
                let other_row = &other.data[p * n..(p + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(other_row.iter()) {
                    *o += a * b;
                }
            }
        }
        Tensor::new(vec![m, n], out)
    }

    /// Transpose of a rank-2 tensor.
    pub fn transpose(&self) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims("transpose")?;
        let mut out = vec![0.0f32; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                out[c * rows + r] = self.data[r * cols + c];
            }
        }
        Tensor::new(vec![cols, rows], out)
    }

    /// Matrix-vector product `M · v` for a (rows × cols) matrix; `v` must hold
    /// `cols` elements. Returns a rank-1 tensor of `rows` elements.
    pub fn matvec(&self, vector: &Tensor) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims("matvec")?;
        if vector.len() != cols {
            return Err(EngineError::shape(&[cols], &vector.shape, "matvec"));
        }
        let data = self
            .data
            .chunks_exact(cols)
            .map(|row| row.iter().zip(vector.data.iter()).map(|(&w, &x)| w * x).sum())
            .collect();
        Tensor::new(vec![rows], data)
    }

    /// Transposed matrix-vector product `Mᵗ · v` for a (rows × cols) matrix;
    /// `v` must hold `rows` elements. Returns a rank-1 tensor of `cols` elements.
    pub fn transpose_matvec(&self, vector: &Tensor) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims("transpose_matvec")?;
        if vector.len() != rows {
            return Err(EngineError::shape(&[rows], &vector.shape, "transpose_matvec"));
        }
        let mut out = vec![0.0f32; cols];
        for (row, &x) in self.data.chunks_exact(cols).zip(vector.data.iter()) {
            for (o, &w) in out.iter_mut().zip(row.iter()) {
                *o += w * x;
            }
        }
        Tensor::new(vec![cols], out)
    }

    /// Outer product of two tensors viewed as vectors: shape (self.len, other.len).
    pub fn outer(&self, other: &Tensor) -> Tensor {
        let n = other.len();
        let mut data = Vec::with_capacity(self.len() * n);
        for &a in &self.data {
            data.extend(other.data.iter().map(|&b| a * b));
        }
        Self {
            shape: vec![self.len(), n],
            data,
        }
    }

    /// Inner product of two tensors with the same element count.
    pub fn dot(&self, other: &Tensor) -> Result<f32> {
        if self.len() != other.len() {
            return Err(EngineError::shape(&[self.len()], &[other.len()], "dot"));
        }
        Ok(self.data.iter().zip(other.data.iter()).map(|(&a, &b)| a * b).sum())
    }

    /// Borrow row `index` of a rank-2 tensor.
    pub fn row(&self, index: usize) -> Result<&[f32]> {
        let (rows, cols) = self.matrix_dims("row")?;
        if index >= rows {
            return Err(EngineError::Index {
                index: index as i64,
                bound: rows,
                operation: "row".to_string(),
            });
        }
        Ok(&self.data[index * cols..(index + 1) * cols])
    }

    /// Mutably borrow row `index` of a rank-2 tensor.
    pub fn row_mut(&mut self, index: usize) -> Result<&mut [f32]> {
        let (rows, cols) = self.matrix_dims("row_mut")?;
        if index >= rows {
            return Err(EngineError::Index {
                index: index as i64,
                bound: rows,
                operation: "row_mut".to_string(),
            });
        }
        Ok(&mut self.data[index * cols..(index + 1) * cols])
    }

    /// Rank-1 concatenation of the given tensors' elements.
    pub fn concat(parts: &[&Tensor]) -> Tensor {
        let data: Vec<f32> = parts.iter().flat_map(|t| t.data.iter().copied()).collect();
        Tensor::from_vec(data)
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Index of the largest element (first on ties).
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.data.iter().enumerate().skip(1) {
            if v > self.data[best] {
                best = i;
            }
        }
        best
    }
}
