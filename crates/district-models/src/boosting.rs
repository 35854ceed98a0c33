//! Gradient-boosted regression trees with squared-error loss.
//!
//! Trees are grown depth-first with exact greedy splits and second-order
//! leaf weights `-G / (H + lambda)`. Each tree is stored as flat arrays:
//! internal node `i` tests `x[split_features[i]] <= thresholds[i]` and
//! continues at `left_child[i]` or `right_child[i]`; a negative child `c`
//! points at leaf `-c - 1`.

use crate::error::{ModelError, ModelResult};
use district_layers::Tensor;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Shrinkage applied to every leaf
    pub learning_rate: f32,
    /// L2 regularization on leaf weights
    pub lambda: f32,
    /// Minimum hessian sum (sample count) on each side of a split
    pub min_child_weight: f32,
    /// Fraction of rows sampled per tree
    pub subsample: f32,
    /// Seed for row sampling
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingConfig {
    /// Checks ranges.
    pub fn validate(&self) -> ModelResult<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidConfig {
                message: "n_estimators must be positive".to_string(),
            });
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ModelError::InvalidConfig {
                message: "learning_rate must be positive".to_string(),
            });
        }
        if self.subsample.is_nan() || self.subsample <= 0.0 || self.subsample > 1.0 {
            return Err(ModelError::InvalidConfig {
                message: "subsample must be in (0, 1]".to_string(),
            });
        }
        if self.lambda < 0.0 {
            return Err(ModelError::InvalidConfig {
                message: "lambda must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// One regression tree in flat-array form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f32>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f32>,
}

impl RegressionTree {
    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    /// Evaluates the tree on one feature row.
    pub fn predict(&self, features: &[f32]) -> f32 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or(0.0);
        }
        let mut node = 0usize;
        loop {
            let value = features.get(self.split_features[node]).copied().unwrap_or(0.0);
            let child = if value <= self.thresholds[node] {
                self.left_child[node]
            } else {
                self.right_child[node]
            };
            if child < 0 {
                let leaf = (-child - 1) as usize;
                return self.leaf_values.get(leaf).copied().unwrap_or(0.0);
            }
            node = child as usize;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f32,
    gain: f32,
}

struct TreeBuilder<'a> {
    x: &'a Tensor,
    grad: &'a [f32],
    config: &'a BoostingConfig,
    tree: RegressionTree,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_weight(&self, g: f32, h: f32) -> f32 {
        -g / (h + self.config.lambda) * self.config.learning_rate
    }

    fn score(&self, g: f32, h: f32) -> f32 {
        g * g / (h + self.config.lambda)
    }

    fn push_leaf(&mut self, rows: &[usize]) -> i32 {
        let g: f32 = rows.iter().map(|&r| self.grad[r]).sum();
        let value = self.leaf_weight(g, rows.len() as f32);
        self.tree.leaf_values.push(value);
        -(self.tree.leaf_values.len() as i32)
    }

    fn best_split(&self, rows: &[usize]) -> Option<Split> {
        let g_total: f32 = rows.iter().map(|&r| self.grad[r]).sum();
        let h_total = rows.len() as f32;
        let parent = self.score(g_total, h_total);
        let min_child = self.config.min_child_weight;

        (0..self.x.cols())
            .into_par_iter()
            .filter_map(|feature| {
                let mut values: Vec<(f32, f32)> = rows
                    .iter()
                    .map(|&r| (self.x.row(r)[feature], self.grad[r]))
                    .collect();
                values.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<Split> = None;
                let mut g_left = 0.0f32;
                for i in 0..values.len() - 1 {
                    g_left += values[i].1;
                    if values[i].0 == values[i + 1].0 {
                        continue;
                    }
                    let h_left = (i + 1) as f32;
                    let h_right = h_total - h_left;
                    if h_left < min_child || h_right < min_child {
                        continue;
                    }
                    let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_right)
                        - parent;
                    if gain > 1e-9 && best.map_or(true, |b| gain > b.gain) {
                        best = Some(Split {
                            feature,
                            threshold: (values[i].0 + values[i + 1].0) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .reduce_with(|a, b| {
                if b.gain > a.gain || (b.gain == a.gain && b.feature < a.feature) {
                    b
                } else {
                    a
                }
            })
    }

    fn grow(&mut self, rows: &[usize], depth: usize) -> i32 {
        if depth >= self.config.max_depth || rows.len() < 2 {
            return self.push_leaf(rows);
        }
        let Some(split) = self.best_split(rows) else {
            return self.push_leaf(rows);
        };

        let node = self.tree.split_features.len();
        self.tree.split_features.push(split.feature);
        self.tree.thresholds.push(split.threshold);
        self.tree.left_child.push(0);
        self.tree.right_child.push(0);

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.x.row(r)[split.feature] <= split.threshold);
        let left_ref = self.grow(&left, depth + 1);
        let right_ref = self.grow(&right, depth + 1);
        self.tree.left_child[node] = left_ref;
        self.tree.right_child[node] = right_ref;
        node as i32
    }
}

/// An additive ensemble of regression trees.
///
/// # Example
///
/// ```
/// use district_layers::Tensor;
/// use district_models::{BoostingConfig, GradientBoostedTrees};
///
/// let x = Tensor::from_data(&[4, 1], vec![0.0, 1.0, 2.0, 3.0]);
/// let y = [10.0, 10.0, 90.0, 90.0];
/// let model = GradientBoostedTrees::fit(&x, &y, BoostingConfig::default()).unwrap();
/// let pred = model.predict(&x).unwrap();
/// assert!(pred[0] < 20.0 && pred[3] > 80.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    config: BoostingConfig,
    num_features: usize,
    base_score: f32,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fits the ensemble on rows of `x` against `y`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration, an empty matrix, or when `y`
    /// does not have one value per row.
    pub fn fit(x: &Tensor, y: &[f32], config: BoostingConfig) -> ModelResult<Self> {
        config.validate()?;
        if x.ndim() != 2 || x.rows() == 0 {
            return Err(ModelError::InvalidTrainingData {
                message: "boosting needs a non-empty [N, F] matrix".to_string(),
            });
        }
        if y.len() != x.rows() {
            return Err(ModelError::InvalidTrainingData {
                message: format!("{} targets for {} rows", y.len(), x.rows()),
            });
        }

        let n = x.rows();
        let base_score = y.iter().sum::<f32>() / n as f32;
        let mut predictions = vec![base_score; n];
        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = ((n as f32 * config.subsample).round() as usize).clamp(1, n);

        for round in 0..config.n_estimators {
            let grad: Vec<f32> = predictions.iter().zip(y).map(|(p, t)| p - t).collect();
            let mut rows: Vec<usize> = if sample_size < n {
                sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };
            rows.sort_unstable();

            let mut builder = TreeBuilder {
                x,
                grad: &grad,
                config: &config,
                tree: RegressionTree {
                    split_features: Vec::new(),
                    thresholds: Vec::new(),
                    left_child: Vec::new(),
                    right_child: Vec::new(),
                    leaf_values: Vec::new(),
                },
            };
            builder.grow(&rows, 0);
            let tree = builder.tree;

            for (i, p) in predictions.iter_mut().enumerate() {
                *p += tree.predict(x.row(i));
            }
            if round % 20 == 0 {
                tracing::debug!(round, leaves = tree.num_leaves(), "Boosting round");
            }
            trees.push(tree);
        }

        Ok(Self {
            config,
            num_features: x.cols(),
            base_score,
            trees,
        })
    }

    /// Number of fitted trees.
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// The configuration used for fitting.
    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    /// Predicts one value per row of `x`.
    pub fn predict(&self, x: &Tensor) -> ModelResult<Vec<f32>> {
        if x.cols() != self.num_features {
            return Err(ModelError::InputWidth {
                expected: self.num_features,
                actual: x.cols(),
            });
        }
        Ok((0..x.rows()).map(|i| self.predict_row(x.row(i))).collect())
    }

    /// Predicts a single row.
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        self.base_score + self.trees.iter().map(|t| t.predict(features)).sum::<f32>()
    }
}
