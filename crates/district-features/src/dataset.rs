//! Indexable training samples and batch collation.
//!
//! Every dataset hands out [`Batch`]es for arbitrary index lists so the
//! trainer can shuffle and split without knowing the sample layout.
//! Sequence samples have different lengths; [`collate_padded`] right-pads
//! them with zeros and records each sample's true length.

use crate::error::{FeatureError, FeatureResult};
use district_layers::Tensor;

/// Model inputs and targets for a set of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<I> {
    /// Model input.
    pub inputs: I,
    /// Targets, one row per sample.
    pub targets: Tensor,
}

impl<I> Batch<I> {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.targets.rows()
    }

    /// True for a batch without samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Zero-padded sequences with their true lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedSequences {
    /// `[batch, max_len, features]`.
    pub inputs: Tensor,
    /// Number of real timesteps per sample.
    pub lengths: Vec<usize>,
}

/// A collated batch of sequence samples.
pub type PaddedBatch = Batch<PaddedSequences>;

/// Static features paired with category indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PairInput {
    /// `[batch, features]`.
    pub features: Tensor,
    /// Category index per sample.
    pub categories: Vec<usize>,
}

/// A fixed collection of training samples.
pub trait Dataset: Send + Sync {
    /// What a model receives for a batch.
    type Input;

    /// Number of samples.
    fn len(&self) -> usize;

    /// True when the dataset has no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gathers the samples at `indices`, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::IndexOutOfRange`] for an index past the end.
    fn batch(&self, indices: &[usize]) -> FeatureResult<Batch<Self::Input>>;

    /// Every sample in dataset order.
    fn full_batch(&self) -> FeatureResult<Batch<Self::Input>> {
        let indices: Vec<usize> = (0..self.len()).collect();
        self.batch(&indices)
    }
}

fn check_indices(indices: &[usize], len: usize) -> FeatureResult<()> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(FeatureError::IndexOutOfRange { index, len }),
        None => Ok(()),
    }
}

fn check_rows(what: &'static str, expected: usize, actual: usize) -> FeatureResult<()> {
    if expected != actual {
        return Err(FeatureError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn column(values: &[f32]) -> Tensor {
    Tensor::from_data(&[values.len(), 1], values.to_vec())
}

/// Pads variable-length sequences into one batch.
///
/// Each sequence is a list of equally wide rows. The output is
/// `[batch, longest, width]` with zeros after each sequence's end.
///
/// # Errors
///
/// Fails on an empty sequence, on rows of differing width, or when targets
/// do not line up with sequences.
///
/// # Example
///
/// ```
/// use district_features::dataset::collate_padded;
///
/// let a = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];
/// let b = vec![vec![9.0, 9.0]];
/// let batch = collate_padded(&[a.as_slice(), b.as_slice()], &[&[1.0], &[2.0]]).unwrap();
/// assert_eq!(batch.inputs.inputs.shape(), &[2, 3, 2]);
/// assert_eq!(batch.inputs.lengths, vec![3, 1]);
/// ```
pub fn collate_padded(sequences: &[&[Vec<f32>]], targets: &[&[f32]]) -> FeatureResult<PaddedBatch> {
    check_rows("targets", sequences.len(), targets.len())?;
    if let Some(index) = sequences.iter().position(|s| s.is_empty()) {
        return Err(FeatureError::EmptySequence { index });
    }

    let width = sequences.first().map(|s| s[0].len()).unwrap_or(0);
    let target_width = targets.first().map(|t| t.len()).unwrap_or(0);
    let max_len = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
    let batch = sequences.len();

    let mut inputs = vec![0.0f32; batch * max_len * width];
    let mut flat_targets = Vec::with_capacity(batch * target_width);
    let mut lengths = Vec::with_capacity(batch);

    for (b, (seq, target)) in sequences.iter().zip(targets).enumerate() {
        check_rows("target width", target_width, target.len())?;
        for (t, row) in seq.iter().enumerate() {
            if row.len() != width {
                return Err(FeatureError::DimensionMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            let start = (b * max_len + t) * width;
            inputs[start..start + width].copy_from_slice(row);
        }
        lengths.push(seq.len());
        flat_targets.extend_from_slice(target);
    }

    Ok(Batch {
        inputs: PaddedSequences {
            inputs: Tensor::from_data(&[batch, max_len, width], inputs),
            lengths,
        },
        targets: Tensor::from_data(&[batch, target_width], flat_targets),
    })
}

/// Variable-length sequences with fixed-width targets.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    sequences: Vec<Vec<Vec<f32>>>,
    targets: Vec<Vec<f32>>,
}

impl SequenceDataset {
    /// Pairs sequences with targets.
    pub fn new(sequences: Vec<Vec<Vec<f32>>>, targets: Vec<Vec<f32>>) -> FeatureResult<Self> {
        check_rows("targets", sequences.len(), targets.len())?;
        if let Some(index) = sequences.iter().position(|s| s.is_empty()) {
            return Err(FeatureError::EmptySequence { index });
        }
        Ok(Self { sequences, targets })
    }

    /// The raw sequences.
    pub fn sequences(&self) -> &[Vec<Vec<f32>>] {
        &self.sequences
    }

    /// The raw targets.
    pub fn targets(&self) -> &[Vec<f32>] {
        &self.targets
    }
}

impl Dataset for SequenceDataset {
    type Input = PaddedSequences;

    fn len(&self) -> usize {
        self.sequences.len()
    }

    fn batch(&self, indices: &[usize]) -> FeatureResult<PaddedBatch> {
        check_indices(indices, self.len())?;
        let sequences: Vec<&[Vec<f32>]> =
            indices.iter().map(|&i| self.sequences[i].as_slice()).collect();
        let targets: Vec<&[f32]> = indices.iter().map(|&i| self.targets[i].as_slice()).collect();
        collate_padded(&sequences, &targets)
    }
}

/// Static feature rows with multi-column labels.
#[derive(Debug, Clone)]
pub struct StaticDataset {
    features: Tensor,
    labels: Tensor,
}

impl StaticDataset {
    /// `features` is `[N, F]`, `labels` is `[N, K]`.
    pub fn new(features: Tensor, labels: Tensor) -> FeatureResult<Self> {
        check_rows("labels", features.rows(), labels.rows())?;
        Ok(Self { features, labels })
    }
}

impl Dataset for StaticDataset {
    type Input = Tensor;

    fn len(&self) -> usize {
        self.features.rows()
    }

    fn batch(&self, indices: &[usize]) -> FeatureResult<Batch<Tensor>> {
        check_indices(indices, self.len())?;
        Ok(Batch {
            inputs: self.features.select_rows(indices),
            targets: self.labels.select_rows(indices),
        })
    }
}

/// Static feature rows with 0 to 100 scores, stored divided by 100.
#[derive(Debug, Clone)]
pub struct ScoreDataset {
    features: Tensor,
    scores: Tensor,
}

impl ScoreDataset {
    /// `features` is `[N, F]`; `scores` holds one 0 to 100 score per row.
    pub fn new(features: Tensor, scores: &[f32]) -> FeatureResult<Self> {
        check_rows("scores", features.rows(), scores.len())?;
        let scaled: Vec<f32> = scores.iter().map(|s| s / 100.0).collect();
        Ok(Self {
            features,
            scores: column(&scaled),
        })
    }
}

impl Dataset for ScoreDataset {
    type Input = Tensor;

    fn len(&self) -> usize {
        self.features.rows()
    }

    fn batch(&self, indices: &[usize]) -> FeatureResult<Batch<Tensor>> {
        check_indices(indices, self.len())?;
        Ok(Batch {
            inputs: self.features.select_rows(indices),
            targets: self.scores.select_rows(indices),
        })
    }
}

/// (location features, category) pairs with binary labels.
#[derive(Debug, Clone)]
pub struct PairDataset {
    features: Tensor,
    categories: Vec<usize>,
    labels: Tensor,
}

impl PairDataset {
    /// One row of `features`, one category and one label per sample.
    pub fn new(features: Tensor, categories: Vec<usize>, labels: &[f32]) -> FeatureResult<Self> {
        check_rows("categories", features.rows(), categories.len())?;
        check_rows("labels", features.rows(), labels.len())?;
        Ok(Self {
            features,
            categories,
            labels: column(labels),
        })
    }
}

impl Dataset for PairDataset {
    type Input = PairInput;

    fn len(&self) -> usize {
        self.categories.len()
    }

    fn batch(&self, indices: &[usize]) -> FeatureResult<Batch<PairInput>> {
        check_indices(indices, self.len())?;
        Ok(Batch {
            inputs: PairInput {
                features: self.features.select_rows(indices),
                categories: indices.iter().map(|&i| self.categories[i]).collect(),
            },
            targets: self.labels.select_rows(indices),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(len: usize, value: f32) -> Vec<Vec<f32>> {
        (0..len).map(|t| vec![value + t as f32; 3]).collect()
    }

    #[test]
    fn test_padding_fills_zeros_after_end() {
        let a = seq(2, 1.0);
        let b = seq(4, 10.0);
        let batch = collate_padded(&[a.as_slice(), b.as_slice()], &[&[1.0, 2.0], &[3.0, 4.0]]).unwrap();
        let inputs = &batch.inputs.inputs;
        assert_eq!(inputs.shape(), &[2, 4, 3]);
        assert_eq!(batch.inputs.lengths, vec![2, 4]);
        assert_eq!(inputs.time_step(1).row(0), &[2.0, 2.0, 2.0]);
        assert_eq!(inputs.time_step(2).row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(inputs.time_step(3).row(1), &[13.0, 13.0, 13.0]);
        assert_eq!(batch.targets.shape(), &[2, 2]);
    }

    #[test]
    fn test_collate_rejects_ragged_rows() {
        let a = vec![vec![1.0, 2.0], vec![1.0]];
        let err = collate_padded(&[a.as_slice()], &[&[0.0]]).unwrap_err();
        assert!(matches!(err, FeatureError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_sequence_dataset_batches_in_index_order() {
        let ds = SequenceDataset::new(
            vec![seq(3, 0.0), seq(5, 100.0), seq(1, 7.0)],
            vec![vec![1.0; 4], vec![2.0; 4], vec![3.0; 4]],
        )
        .unwrap();
        assert_eq!(ds.len(), 3);
        let batch = ds.batch(&[2, 0]).unwrap();
        assert_eq!(batch.inputs.lengths, vec![1, 3]);
        assert_eq!(batch.inputs.inputs.shape(), &[2, 3, 3]);
        assert_eq!(batch.targets.row(0), &[3.0; 4]);
        assert!(ds.batch(&[3]).is_err());
    }

    #[test]
    fn test_sequence_dataset_rejects_empty_sample() {
        let err = SequenceDataset::new(vec![seq(2, 0.0), Vec::new()], vec![vec![0.0], vec![0.0]])
            .unwrap_err();
        assert!(matches!(err, FeatureError::EmptySequence { index: 1 }));
    }

    #[test]
    fn test_score_dataset_divides_by_hundred() {
        let ds = ScoreDataset::new(Tensor::zeros(&[2, 4]), &[50.0, 100.0]).unwrap();
        let batch = ds.full_batch().unwrap();
        assert_eq!(batch.targets.data(), &[0.5, 1.0]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_pair_dataset() {
        let features = Tensor::from_data(&[3, 2], vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let ds = PairDataset::new(features, vec![4, 0, 14], &[1.0, 0.0, 1.0]).unwrap();
        let batch = ds.batch(&[1, 2]).unwrap();
        assert_eq!(batch.inputs.categories, vec![0, 14]);
        assert_eq!(batch.inputs.features.row(0), &[2.0, 2.0]);
        assert_eq!(batch.targets.data(), &[0.0, 1.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = StaticDataset::new(Tensor::zeros(&[3, 2]), Tensor::zeros(&[2, 3])).unwrap_err();
        assert!(matches!(err, FeatureError::LengthMismatch { what: "labels", .. }));
        assert!(PairDataset::new(Tensor::zeros(&[2, 2]), vec![0], &[0.0, 1.0]).is_err());
    }
}
