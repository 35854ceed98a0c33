//! Dense embedding table for small categorical vocabularies.

use crate::error::{LayerError, LayerResult};
use crate::layer::grad_or_zeros;
use crate::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A `[num_embeddings, dim]` lookup table trained by scatter-add.
///
/// # Example
///
/// ```
/// use district_layers::embedding::Embedding;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let table = Embedding::new(15, 8, &mut StdRng::seed_from_u64(0));
/// let out = table.lookup(&[0, 14, 3]).unwrap();
/// assert_eq!(out.shape(), &[3, 8]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Embedding matrix
    weights: Tensor,
    num_embeddings: usize,
    dim: usize,
    #[serde(skip)]
    weights_grad: Option<Tensor>,
    /// Indices of the last training lookup
    #[serde(skip)]
    cached_indices: Option<Vec<usize>>,
}

impl Embedding {
    /// Creates a table with rows drawn from `N(0, 1)`.
    pub fn new<R: Rng + ?Sized>(num_embeddings: usize, dim: usize, rng: &mut R) -> Self {
        Self {
            weights: Tensor::randn(&[num_embeddings, dim], 0.0, 1.0, rng),
            num_embeddings,
            dim,
            weights_grad: None,
            cached_indices: None,
        }
    }

    /// Returns the vocabulary size.
    pub fn num_embeddings(&self) -> usize {
        self.num_embeddings
    }

    /// Returns the embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Gathers the rows for `indices` into a `[len, dim]` tensor.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::EmbeddingOutOfRange`] for an index past the
    /// vocabulary.
    pub fn lookup(&self, indices: &[usize]) -> LayerResult<Tensor> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.num_embeddings) {
            return Err(LayerError::EmbeddingOutOfRange {
                index,
                num_embeddings: self.num_embeddings,
            });
        }
        Ok(self.weights.select_rows(indices))
    }

    /// Like [`Embedding::lookup`], remembering the indices for
    /// [`Embedding::backward`].
    pub fn lookup_train(&mut self, indices: &[usize]) -> LayerResult<Tensor> {
        let out = self.lookup(indices)?;
        self.cached_indices = Some(indices.to_vec());
        Ok(out)
    }

    /// Accumulates `grad` (`[len, dim]`) into the rows used by the last
    /// training lookup. Indices have no gradient, so nothing is returned.
    pub fn backward(&mut self, grad: &Tensor) -> LayerResult<()> {
        let indices = self
            .cached_indices
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        if grad.rows() != indices.len() || grad.cols() != self.dim {
            return Err(LayerError::ShapeMismatch {
                expected: vec![indices.len(), self.dim],
                actual: grad.shape().to_vec(),
            });
        }
        let mut weights_grad = Tensor::zeros(self.weights.shape());
        for (row, &index) in indices.iter().enumerate() {
            for (w, g) in weights_grad.row_mut(index).iter_mut().zip(grad.row(row)) {
                *w += g;
            }
        }
        self.weights_grad = Some(weights_grad);
        Ok(())
    }

    /// Returns the learnable table.
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights]
    }

    /// Returns the learnable table mutably.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights]
    }

    /// Returns the table gradient from the last backward pass.
    pub fn gradients(&self) -> Vec<Tensor> {
        vec![grad_or_zeros(&self.weights_grad, &self.weights)]
    }
}
