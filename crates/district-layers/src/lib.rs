//! Neural network layers for the district model family.
//!
//! This crate provides the building blocks the district models are made of,
//! each with a hand-written backward pass:
//!
//! - **Dense layers**: Fully connected linear transformations
//! - **MLP**: Multi-layer perceptrons with optional batch norm and dropout
//! - **GRU**: Masked recurrent layers over padded quarterly sequences
//! - **Normalization**: Batch normalization with running statistics
//! - **Embeddings**: Small dense lookup tables for categorical ids
//! - **Activations**: ReLU and Sigmoid
//!
//! # Quick Start
//!
//! ```
//! use district_layers::prelude::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let mlp = MlpConfig::new(59)
//!     .add_layer(64, ActivationType::ReLU)
//!     .add_layer(32, ActivationType::ReLU)
//!     .add_layer(1, ActivationType::Sigmoid)
//!     .with_dropout(0.2)
//!     .build(&mut rng)
//!     .unwrap();
//!
//! let input = Tensor::zeros(&[16, 59]);
//! let output = mlp.forward(&input).unwrap();
//! assert_eq!(output.shape(), &[16, 1]);
//! ```
//!
//! # Inference modes
//!
//! [`Layer::forward`] never samples noise. Monte-Carlo style estimates call
//! [`Layer::forward_stochastic`] with their own generator:
//!
//! ```
//! use district_layers::prelude::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let dropout = Dropout::new(0.5).unwrap();
//! let input = Tensor::ones(&[2, 4]);
//! assert_eq!(dropout.forward(&input).unwrap(), input);
//! let noisy = dropout
//!     .forward_stochastic(&input, &mut StdRng::seed_from_u64(1))
//!     .unwrap();
//! assert_eq!(noisy.shape(), input.shape());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod error;
pub mod initializer;
pub mod layer;
pub mod mlp;
pub mod normalization;
pub mod recurrent;
pub mod tensor;

// Re-export main types at crate level
pub use activation::{ReLU, Sigmoid};
pub use dense::Dense;
pub use dropout::Dropout;
pub use embedding::Embedding;
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use layer::Layer;
pub use mlp::{ActivationType, Block, LayerSpec, Mlp, MlpConfig};
pub use normalization::BatchNorm;
pub use recurrent::{Gru, GruStack};
pub use tensor::Tensor;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activation::{ReLU, Sigmoid};
    pub use crate::dense::Dense;
    pub use crate::dropout::Dropout;
    pub use crate::embedding::Embedding;
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::layer::Layer;
    pub use crate::mlp::{ActivationType, Mlp, MlpConfig};
    pub use crate::normalization::BatchNorm;
    pub use crate::recurrent::{Gru, GruStack};
    pub use crate::tensor::Tensor;
}
