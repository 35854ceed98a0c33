//! Category fit scorer.
//!
//! Scores how well a business category suits a location: a learned
//! category embedding is appended to the location's static features and a
//! small network maps the pair to a probability.

use crate::error::{ModelError, ModelResult};
use crate::trainable::{check_width, Trainable};
use district_features::{PairInput, NUM_CATEGORIES, NUM_STATIC_FEATURES};
use district_layers::{ActivationType, Embedding, Layer, Mlp, MlpConfig, Tensor};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Shape of a [`CategoryRecommender`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    /// Static feature width
    pub input_dim: usize,
    /// Number of categories
    pub num_categories: usize,
    /// Embedding width
    pub embed_dim: usize,
    /// Width of the first hidden layer
    pub hidden_dim: usize,
    /// Dropout after the first hidden layer
    pub dropout: f32,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            input_dim: NUM_STATIC_FEATURES,
            num_categories: NUM_CATEGORIES,
            embed_dim: 8,
            hidden_dim: 64,
            dropout: 0.2,
        }
    }
}

/// Embedding plus network pairwise scorer.
///
/// # Example
///
/// ```
/// use district_models::{CategoryRecommender, RecommenderConfig};
/// use district_features::{NUM_CATEGORIES, NUM_STATIC_FEATURES};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let model = CategoryRecommender::new(RecommenderConfig::default(), &mut StdRng::seed_from_u64(0)).unwrap();
/// let scores = model.score_all(&[0.0; NUM_STATIC_FEATURES]).unwrap();
/// assert_eq!(scores.len(), NUM_CATEGORIES);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecommender {
    config: RecommenderConfig,
    embedding: Embedding,
    head: Mlp,
}

impl CategoryRecommender {
    /// Builds a freshly initialized recommender.
    pub fn new<R: Rng + ?Sized>(config: RecommenderConfig, rng: &mut R) -> ModelResult<Self> {
        let embedding = Embedding::new(config.num_categories, config.embed_dim, rng);
        let head = MlpConfig::new(config.input_dim + config.embed_dim)
            .add_layer_with_dropout(config.hidden_dim, ActivationType::ReLU, config.dropout)
            .add_layer(32, ActivationType::ReLU)
            .add_layer(1, ActivationType::Sigmoid)
            .build(rng)?;
        Ok(Self {
            config,
            embedding,
            head,
        })
    }

    /// The configuration this model was built with.
    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Scores one location against every category, in category index order.
    pub fn score_all(&self, features: &[f32]) -> ModelResult<Vec<f32>> {
        if features.len() != self.config.input_dim {
            return Err(ModelError::InputWidth {
                expected: self.config.input_dim,
                actual: features.len(),
            });
        }
        let n = self.config.num_categories;
        let mut data = Vec::with_capacity(n * features.len());
        for _ in 0..n {
            data.extend_from_slice(features);
        }
        let input = PairInput {
            features: Tensor::from_data(&[n, features.len()], data),
            categories: (0..n).collect(),
        };
        Ok(self.predict(&input)?.into_data())
    }

    fn check(&self, input: &PairInput) -> ModelResult<()> {
        check_width(&input.features, self.config.input_dim)?;
        if input.features.rows() != input.categories.len() {
            return Err(ModelError::InvalidTrainingData {
                message: format!(
                    "{} feature rows for {} categories",
                    input.features.rows(),
                    input.categories.len()
                ),
            });
        }
        Ok(())
    }
}

impl Trainable for CategoryRecommender {
    type Input = PairInput;

    fn predict(&self, input: &PairInput) -> ModelResult<Tensor> {
        self.check(input)?;
        let emb = self.embedding.lookup(&input.categories)?;
        Ok(self.head.forward(&input.features.concat_cols(&emb))?)
    }

    fn predict_stochastic(&self, input: &PairInput, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        self.check(input)?;
        let emb = self.embedding.lookup(&input.categories)?;
        Ok(self.head.forward_stochastic(&input.features.concat_cols(&emb), rng)?)
    }

    fn forward_train(&mut self, input: &PairInput, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        self.check(input)?;
        let emb = self.embedding.lookup_train(&input.categories)?;
        Ok(self.head.forward_train(&input.features.concat_cols(&emb), rng)?)
    }

    fn backward(&mut self, grad_output: &Tensor) -> ModelResult<()> {
        let d_combined = self.head.backward(grad_output)?;
        let start = self.config.input_dim;
        let d_emb = d_combined.slice_cols(start, start + self.config.embed_dim);
        self.embedding.backward(&d_emb)?;
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.head.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<Tensor> {
        let mut grads = self.embedding.gradients();
        grads.extend(self.head.gradients());
        grads
    }

    fn name(&self) -> &str {
        "CategoryRecommender"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> CategoryRecommender {
        CategoryRecommender::new(RecommenderConfig::default(), &mut StdRng::seed_from_u64(5)).unwrap()
    }

    #[test]
    fn test_score_all_matches_pairwise_predict() {
        let model = model();
        let features: Vec<f32> = (0..NUM_STATIC_FEATURES).map(|i| (i as f32 * 0.1).sin()).collect();
        let all = model.score_all(&features).unwrap();
        assert_eq!(all.len(), NUM_CATEGORIES);

        let single = model
            .predict(&PairInput {
                features: Tensor::from_data(&[1, NUM_STATIC_FEATURES], features.clone()),
                categories: vec![7],
            })
            .unwrap();
        assert!((single.data()[0] - all[7]).abs() < 1e-6);
        assert!(all.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_unknown_category_is_an_error() {
        let model = model();
        let input = PairInput {
            features: Tensor::zeros(&[1, NUM_STATIC_FEATURES]),
            categories: vec![NUM_CATEGORIES],
        };
        assert!(model.predict(&input).is_err());
    }

    #[test]
    fn test_backward_reaches_embedding() {
        let mut model = model();
        let input = PairInput {
            features: Tensor::ones(&[2, NUM_STATIC_FEATURES]),
            categories: vec![3, 3],
        };
        let mut rng = StdRng::seed_from_u64(9);
        let out = model.forward_train(&input, &mut rng).unwrap();
        model.backward(&Tensor::ones(out.shape())).unwrap();

        let emb_grad = &model.gradients()[0];
        assert_eq!(emb_grad.shape(), &[NUM_CATEGORIES, 8]);
        assert!(emb_grad.row(3).iter().any(|g| *g != 0.0));
        assert!(emb_grad.row(0).iter().all(|g| *g == 0.0));
    }
}
