//! Held-out metrics for each model family.
//!
//! Every function scores a model over a whole dataset with deterministic
//! inference and returns a flat map of rounded metrics, ready to be merged
//! into a version's metrics record.

use crate::error::{TrainingError, TrainingResult};
use crate::history::{round_to, MetricsRecord};
use district_features::{Dataset, PaddedSequences, PairInput};
use district_layers::Tensor;
use district_models::{
    CategoryRecommender, SalesForecaster, ScoringEnsemble, SurvivalClassifier, Trainable,
    SURVIVAL_HORIZONS,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named metric values.
pub type MetricsSummary = BTreeMap<String, f64>;

const EVAL_BATCH_SIZE: usize = 256;
const HORIZON_LABELS: [&str; SURVIVAL_HORIZONS] = ["1yr", "3yr", "5yr"];

/// Converts a summary into a metrics record.
pub fn summary_to_record(summary: &MetricsSummary) -> MetricsRecord {
    summary
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(*v)))
        .collect()
}

/// Runs deterministic inference over every sample, returning
/// `(predictions, targets, columns)` as flat row-major buffers.
fn collect_predictions<M, D>(model: &M, dataset: &D) -> TrainingResult<(Vec<f32>, Vec<f32>, usize)>
where
    M: Trainable,
    D: Dataset<Input = M::Input>,
{
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut predictions = Vec::new();
    let mut targets = Vec::new();
    let mut cols = 0;
    for chunk in indices.chunks(EVAL_BATCH_SIZE) {
        let batch = dataset.batch(chunk)?;
        let out = model.predict(&batch.inputs)?;
        check_same_shape(&out, &batch.targets)?;
        cols = batch.targets.cols();
        predictions.extend_from_slice(out.data());
        targets.extend_from_slice(batch.targets.data());
    }
    Ok((predictions, targets, cols))
}

fn check_same_shape(predictions: &Tensor, targets: &Tensor) -> TrainingResult<()> {
    if predictions.shape() != targets.shape() {
        return Err(TrainingError::ShapeMismatch {
            predictions: predictions.shape().to_vec(),
            targets: targets.shape().to_vec(),
        });
    }
    Ok(())
}

struct RegressionStats {
    mae: f64,
    rmse: f64,
    r2: f64,
}

fn regression_stats(predictions: &[f64], targets: &[f64]) -> RegressionStats {
    let n = predictions.len().max(1) as f64;
    let mut abs = 0.0;
    let mut ss_res = 0.0;
    for (p, t) in predictions.iter().zip(targets) {
        abs += (p - t).abs();
        ss_res += (p - t) * (p - t);
    }
    let mean = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean) * (t - mean)).sum();
    RegressionStats {
        mae: abs / n,
        rmse: (ss_res / n).sqrt(),
        r2: 1.0 - ss_res / ss_tot.max(1e-8),
    }
}

/// Forecast accuracy over all predicted steps.
///
/// Returns `mae`, `rmse` and `r2` (4 decimals) and `mape` in percent over
/// non-zero targets (2 decimals, 0 when every target is zero).
pub fn evaluate_regression<D>(model: &SalesForecaster, dataset: &D) -> TrainingResult<MetricsSummary>
where
    D: Dataset<Input = PaddedSequences>,
{
    let (predictions, targets, _) = collect_predictions(model, dataset)?;
    let p: Vec<f64> = predictions.iter().map(|&v| v as f64).collect();
    let t: Vec<f64> = targets.iter().map(|&v| v as f64).collect();
    let stats = regression_stats(&p, &t);

    let nonzero: Vec<f64> = p
        .iter()
        .zip(&t)
        .filter(|(_, t)| **t != 0.0)
        .map(|(p, t)| ((t - p) / t).abs())
        .collect();
    let mape = if nonzero.is_empty() {
        0.0
    } else {
        nonzero.iter().sum::<f64>() / nonzero.len() as f64 * 100.0
    };

    Ok(MetricsSummary::from([
        ("mae".to_string(), round_to(stats.mae, 4)),
        ("rmse".to_string(), round_to(stats.rmse, 4)),
        ("mape".to_string(), round_to(mape, 2)),
        ("r2".to_string(), round_to(stats.r2, 4)),
    ]))
}

/// Per-horizon absolute error and thresholded accuracy.
///
/// Keys are `mae_1yr`, `accuracy_1yr` and so on, at 4 decimals. A
/// prediction is correct when it falls on the same side of 0.5 as the label.
pub fn evaluate_survival<D>(model: &SurvivalClassifier, dataset: &D) -> TrainingResult<MetricsSummary>
where
    D: Dataset<Input = Tensor>,
{
    let (predictions, targets, cols) = collect_predictions(model, dataset)?;
    let rows = predictions.len() / cols.max(1);
    let mut summary = MetricsSummary::new();
    for (h, label) in HORIZON_LABELS.iter().enumerate().take(cols) {
        let mut abs = 0.0;
        let mut correct = 0usize;
        for r in 0..rows {
            let p = predictions[r * cols + h] as f64;
            let t = targets[r * cols + h] as f64;
            abs += (p - t).abs();
            if (p > 0.5) == (t > 0.5) {
                correct += 1;
            }
        }
        let n = rows.max(1) as f64;
        summary.insert(format!("mae_{label}"), round_to(abs / n, 4));
        summary.insert(format!("accuracy_{label}"), round_to(correct as f64 / n, 4));
    }
    Ok(summary)
}

/// Ensemble score error on the 0 to 100 scale.
///
/// `mae` and `rmse` are rounded to 2 decimals, `r2` to 4.
pub fn evaluate_scoring(
    ensemble: &ScoringEnsemble,
    features: &Tensor,
    scores: &[f32],
) -> TrainingResult<MetricsSummary> {
    if scores.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let predicted = ensemble.predict(features)?;
    if predicted.len() != scores.len() {
        return Err(TrainingError::ShapeMismatch {
            predictions: vec![predicted.len()],
            targets: vec![scores.len()],
        });
    }
    let p: Vec<f64> = predicted.iter().map(|&v| v as f64).collect();
    let t: Vec<f64> = scores.iter().map(|&v| v as f64).collect();
    let stats = regression_stats(&p, &t);
    Ok(MetricsSummary::from([
        ("mae".to_string(), round_to(stats.mae, 2)),
        ("rmse".to_string(), round_to(stats.rmse, 2)),
        ("r2".to_string(), round_to(stats.r2, 4)),
    ]))
}

/// Binary classification quality of the category recommender at 0.5.
///
/// Precision and recall divide by at least one, so a model that never
/// predicts positive scores zero rather than failing.
pub fn evaluate_recommendation<D>(model: &CategoryRecommender, dataset: &D) -> TrainingResult<MetricsSummary>
where
    D: Dataset<Input = PairInput>,
{
    let (predictions, targets, _) = collect_predictions(model, dataset)?;
    let mut correct = 0usize;
    let mut true_pos = 0usize;
    let mut pred_pos = 0usize;
    let mut label_pos = 0usize;
    for (&p, &t) in predictions.iter().zip(&targets) {
        let predicted = p > 0.5;
        let actual = t >= 0.5;
        if predicted == actual {
            correct += 1;
        }
        if predicted {
            pred_pos += 1;
        }
        if actual {
            label_pos += 1;
            if predicted {
                true_pos += 1;
            }
        }
    }
    let n = predictions.len().max(1) as f64;
    Ok(MetricsSummary::from([
        ("accuracy".to_string(), round_to(correct as f64 / n, 4)),
        (
            "precision".to_string(),
            round_to(true_pos as f64 / pred_pos.max(1) as f64, 4),
        ),
        (
            "recall".to_string(),
            round_to(true_pos as f64 / label_pos.max(1) as f64, 4),
        ),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_features::{PairDataset, StaticDataset};
    use district_models::{RecommenderConfig, SurvivalConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_regression_stats() {
        let stats = regression_stats(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(stats.mae, 0.0);
        assert!((stats.r2 - 1.0).abs() < 1e-12);

        let stats = regression_stats(&[2.0, 2.0], &[1.0, 3.0]);
        assert_eq!(stats.mae, 1.0);
        assert_eq!(stats.rmse, 1.0);
        assert!((stats.r2 - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_targets_do_not_divide_by_zero() {
        let stats = regression_stats(&[1.0, 1.0], &[1.0, 1.0]);
        assert_eq!(stats.r2, 1.0);
    }

    #[test]
    fn test_survival_keys() {
        let config = SurvivalConfig {
            input_dim: 4,
            ..SurvivalConfig::default()
        };
        let model = SurvivalClassifier::new(config, &mut StdRng::seed_from_u64(0)).unwrap();
        let dataset = StaticDataset::new(Tensor::ones(&[6, 4]), Tensor::full(&[6, 3], 1.0)).unwrap();
        let summary = evaluate_survival(&model, &dataset).unwrap();
        let keys: Vec<&str> = summary.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["accuracy_1yr", "accuracy_3yr", "accuracy_5yr", "mae_1yr", "mae_3yr", "mae_5yr"]
        );
        assert!(summary.values().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_recommendation_denominators_floor_at_one() {
        let model =
            CategoryRecommender::new(RecommenderConfig::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        let width = RecommenderConfig::default().input_dim;
        let dataset = PairDataset::new(Tensor::zeros(&[3, width]), vec![0, 1, 2], &[0.0, 0.0, 0.0]).unwrap();
        let summary = evaluate_recommendation(&model, &dataset).unwrap();
        assert_eq!(summary["recall"], 0.0);
        assert!(summary["precision"].is_finite());
        assert!((0.0..=1.0).contains(&summary["accuracy"]));
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let model =
            CategoryRecommender::new(RecommenderConfig::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        let width = RecommenderConfig::default().input_dim;
        let dataset = PairDataset::new(Tensor::zeros(&[0, width]), vec![], &[]).unwrap();
        assert!(matches!(
            evaluate_recommendation(&model, &dataset),
            Err(TrainingError::EmptyDataset)
        ));
    }

    #[test]
    fn test_summary_to_record() {
        let summary = MetricsSummary::from([("mae".to_string(), 1.5)]);
        let record = summary_to_record(&summary);
        assert_eq!(record["mae"], 1.5);
    }
}
