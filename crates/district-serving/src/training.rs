//! Per-family training routines.
//!
//! Each routine derives features and labels from the collected records,
//! fits a fresh scaler, trains a fresh model and evaluates it. Nothing is
//! written to disk here; the manager commits the result.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::family::{ModelFamily, ModelKind};
use crate::source::{CollectedData, LocationScorer};
use district_features::fields::{
    record_code, rows_for_area, sum_field, CATEGORY_FIELD, CLOSED_STORE_FIELD, REVENUE_FIELD,
    STORE_COUNT_FIELD,
};
use district_features::quarter::parse_quarter;
use district_features::{
    FeatureExtractor, FeatureScaler, PairDataset, QuarterRecords, RawRecord, ScoreDataset,
    SequenceDataset, StaticContext, StaticDataset, CATEGORY_CODES, NUM_TIMESERIES_FEATURES,
    OUTPUT_STEPS, SALES_TIME_RANGE,
};
use district_layers::Tensor;
use district_models::{
    CategoryRecommender, ForecasterConfig, GradientBoostedTrees, RecommenderConfig,
    SalesForecaster, ScoringEnsemble, ScoringMlp, ScoringMlpConfig, SurvivalClassifier,
    SurvivalConfig, SURVIVAL_HORIZONS,
};
use district_training::{
    evaluate_recommendation, evaluate_regression, evaluate_scoring, evaluate_survival,
    summary_to_record, Loss, MetricsRecord, MetricsSummary, Trainer, TrainingHistory,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Minimum samples for the static-feature families.
const MIN_STATIC_SAMPLES: usize = 10;
/// Minimum sequences for the forecaster.
const MIN_SEQUENCE_SAMPLES: usize = 10;
/// Minimum (location, category) pairs for the recommender.
const MIN_PAIR_SAMPLES: usize = 100;

/// Quarterly survival multiplied over 4, 12 and 20 quarters.
const SURVIVAL_EXPONENTS: [i32; SURVIVAL_HORIZONS] = [4, 12, 20];

/// A trained, evaluated and not yet committed model.
#[derive(Debug)]
pub(crate) struct TrainedFamily {
    pub model: ModelFamily,
    pub scaler: FeatureScaler,
    pub metrics: MetricsRecord,
    pub samples: usize,
}

/// Everything a routine needs, owned so it can move to a blocking thread.
#[derive(Clone)]
pub(crate) struct TrainingContext {
    pub config: ManagerConfig,
    pub data: Arc<CollectedData>,
    pub scorer: Option<Arc<dyn LocationScorer>>,
}

/// Calendar scalars of the latest configured quarter with default
/// coordinates.
pub(crate) fn static_context(config: &ManagerConfig) -> StaticContext {
    let mut context = StaticContext::default();
    if let Some((year, quarter)) = config.latest_quarter().and_then(parse_quarter) {
        context.year = year;
        context.quarter = quarter;
    }
    context
}

/// Trains one family.
pub(crate) fn train_family(kind: ModelKind, ctx: &TrainingContext) -> ManagerResult<TrainedFamily> {
    info!(model = %kind, "Training model");
    match kind {
        ModelKind::SurvivalMlp => train_survival(ctx),
        ModelKind::SalesLstm => train_forecaster(ctx),
        ModelKind::ScoringEnsemble => train_scoring(ctx),
        ModelKind::Recommendation => train_recommendation(ctx),
    }
}

fn require_samples(kind: ModelKind, samples: usize, required: usize) -> ManagerResult<()> {
    if samples < required {
        warn!(model = %kind, samples, required, "Not enough data for training");
        return Err(ManagerError::DataInsufficient {
            model: kind.name(),
            samples,
            required,
        });
    }
    Ok(())
}

fn metrics_record(summary: &MetricsSummary, samples: usize, history: &TrainingHistory) -> MetricsRecord {
    let mut record = summary_to_record(summary);
    record.insert("samples".into(), Value::from(samples));
    history.extend_record(&mut record);
    record
}

fn latest_static_features(ctx: &TrainingContext) -> (Tensor, QuarterRecords<'_>) {
    let latest = ctx.data.latest();
    let x = FeatureExtractor::new().extract_batch_static(
        &ctx.data.area_codes,
        latest,
        &static_context(&ctx.config),
        None,
    );
    (x, latest)
}

/// Survival labels of one location: quarterly survival
/// `1 - closures / max(stores, 1)` compounded over each horizon.
pub(crate) fn survival_labels(code: &str, records: QuarterRecords<'_>) -> [f32; SURVIVAL_HORIZONS] {
    let rows = rows_for_area(records.stores, code);
    let total = sum_field(rows.iter().copied(), STORE_COUNT_FIELD);
    let closes = sum_field(rows.iter().copied(), CLOSED_STORE_FIELD);
    let quarterly = 1.0 - closes as f64 / total.max(1) as f64;
    SURVIVAL_EXPONENTS.map(|e| quarterly.powi(e).clamp(0.0, 1.0) as f32)
}

fn train_survival(ctx: &TrainingContext) -> ManagerResult<TrainedFamily> {
    let kind = ModelKind::SurvivalMlp;
    let (x, latest) = latest_static_features(ctx);
    let codes = &ctx.data.area_codes;
    require_samples(kind, codes.len(), MIN_STATIC_SAMPLES)?;

    let labels: Vec<f32> = codes.iter().flat_map(|c| survival_labels(c, latest)).collect();
    let labels = Tensor::from_data(&[codes.len(), SURVIVAL_HORIZONS], labels);

    let mut scaler = FeatureScaler::new();
    let z = scaler.fit_transform(&x)?;
    let dataset = StaticDataset::new(z, labels)?;

    let mut rng = StdRng::seed_from_u64(ctx.config.seed);
    let mut model = SurvivalClassifier::new(SurvivalConfig::default(), &mut rng)?;
    let trainer = Trainer::new(ctx.config.trainer_for(&ctx.config.classifier))?;
    let history = trainer.train(&mut model, &dataset, Loss::Bce)?;

    let summary = evaluate_survival(&model, &dataset)?;
    Ok(TrainedFamily {
        metrics: metrics_record(&summary, codes.len(), &history),
        model: ModelFamily::Classifier(model),
        scaler,
        samples: codes.len(),
    })
}

/// Forecast targets from a location's quarter rows: the sales time-band
/// total of each of the last [`OUTPUT_STEPS`] rows, padded with the last
/// value.
pub(crate) fn forecast_targets(rows: &[Vec<f32>]) -> Vec<f32> {
    let start = rows.len().saturating_sub(OUTPUT_STEPS);
    let mut targets: Vec<f32> = rows[start..]
        .iter()
        .map(|row| row[SALES_TIME_RANGE].iter().sum())
        .collect();
    while targets.len() < OUTPUT_STEPS {
        targets.push(targets.last().copied().unwrap_or(0.0));
    }
    targets
}

fn train_forecaster(ctx: &TrainingContext) -> ManagerResult<TrainedFamily> {
    let kind = ModelKind::SalesLstm;
    let data = &ctx.data;
    let extractor = FeatureExtractor::new();

    let mut sequences = Vec::new();
    let mut targets = Vec::new();
    for code in &data.area_codes {
        let rows = extractor.extract_timeseries(
            code,
            &data.pop_by_q,
            &data.sales_by_q,
            &data.stores_by_q,
            &data.quarters,
        );
        if rows.len() < ctx.config.min_quarters + 1 {
            continue;
        }
        targets.push(forecast_targets(&rows));
        let mut input = rows;
        input.pop();
        sequences.push(input);
    }
    require_samples(kind, sequences.len(), MIN_SEQUENCE_SAMPLES)?;

    let flat: Vec<f32> = sequences.iter().flatten().flatten().copied().collect();
    let stacked = Tensor::from_data(&[flat.len() / NUM_TIMESERIES_FEATURES, NUM_TIMESERIES_FEATURES], flat);
    let mut scaler = FeatureScaler::new();
    scaler.fit(&stacked)?;
    let scaled = sequences
        .iter()
        .map(|seq| seq.iter().map(|row| scaler.transform_row(row)).collect())
        .collect::<Result<Vec<Vec<Vec<f32>>>, _>>()?;

    let samples = scaled.len();
    let dataset = SequenceDataset::new(scaled, targets)?;
    let mut rng = StdRng::seed_from_u64(ctx.config.seed);
    let mut model = SalesForecaster::new(ForecasterConfig::default(), &mut rng)?;
    let trainer = Trainer::new(ctx.config.trainer_for(&ctx.config.forecaster))?;
    let history = trainer.train(&mut model, &dataset, Loss::Mse)?;

    let summary = evaluate_regression(&model, &dataset)?;
    Ok(TrainedFamily {
        metrics: metrics_record(&summary, samples, &history),
        model: ModelFamily::Forecaster(model),
        scaler,
        samples,
    })
}

fn train_scoring(ctx: &TrainingContext) -> ManagerResult<TrainedFamily> {
    let kind = ModelKind::ScoringEnsemble;
    let scorer = ctx
        .scorer
        .as_ref()
        .ok_or(ManagerError::ScorerUnavailable { model: kind.name() })?;
    let (x, latest) = latest_static_features(ctx);
    let codes = &ctx.data.area_codes;
    require_samples(kind, codes.len(), MIN_STATIC_SAMPLES)?;

    let scores: Vec<f32> = codes
        .iter()
        .map(|code| scorer.score(code, &latest).total_score as f32)
        .collect();

    let mut scaler = FeatureScaler::new();
    let z = scaler.fit_transform(&x)?;

    let tree = match GradientBoostedTrees::fit(&z, &scores, ctx.config.boosting.clone()) {
        Ok(tree) => Some(tree),
        Err(e) => {
            warn!(model = %kind, error = %e, "Tree model failed, using the network only");
            None
        }
    };

    let dataset = ScoreDataset::new(z.clone(), &scores)?;
    let mut rng = StdRng::seed_from_u64(ctx.config.seed);
    let mut mlp = ScoringMlp::new(ScoringMlpConfig::default(), &mut rng)?;
    let trainer = Trainer::new(ctx.config.trainer_for(&ctx.config.scoring))?;
    let history = trainer.train(&mut mlp, &dataset, Loss::Mse)?;

    let ensemble = ScoringEnsemble::new(tree, Some(mlp), ctx.config.ensemble_weights);
    let summary = evaluate_scoring(&ensemble, &z, &scores)?;
    Ok(TrainedFamily {
        metrics: metrics_record(&summary, codes.len(), &history),
        model: ModelFamily::Ensemble(ensemble),
        scaler,
        samples: codes.len(),
    })
}

/// Whether `category` operates at `code`: it has stores and revenue.
pub(crate) fn category_label(code: &str, category: &str, records: QuarterRecords<'_>) -> f32 {
    let in_category = |r: &&RawRecord| record_code(r, CATEGORY_FIELD) == category;
    let stores = rows_for_area(records.stores, code);
    let sales = rows_for_area(records.sales, code);
    let store_count = sum_field(stores.into_iter().filter(in_category), STORE_COUNT_FIELD);
    let revenue = sum_field(sales.into_iter().filter(in_category), REVENUE_FIELD);
    if store_count > 0 && revenue > 0 {
        1.0
    } else {
        0.0
    }
}

fn train_recommendation(ctx: &TrainingContext) -> ManagerResult<TrainedFamily> {
    let kind = ModelKind::Recommendation;
    let (x, latest) = latest_static_features(ctx);
    let codes = &ctx.data.area_codes;
    let samples = codes.len() * CATEGORY_CODES.len();
    require_samples(kind, samples, MIN_PAIR_SAMPLES)?;

    let mut scaler = FeatureScaler::new();
    let z = scaler.fit_transform(&x)?;

    let mut rows = Vec::with_capacity(samples);
    let mut categories = Vec::with_capacity(samples);
    let mut labels = Vec::with_capacity(samples);
    for (i, code) in codes.iter().enumerate() {
        for (index, category) in CATEGORY_CODES.iter().enumerate() {
            rows.push(i);
            categories.push(index);
            labels.push(category_label(code, category, latest));
        }
    }
    let dataset = PairDataset::new(z.select_rows(&rows), categories, &labels)?;

    let mut rng = StdRng::seed_from_u64(ctx.config.seed);
    let mut model = CategoryRecommender::new(RecommenderConfig::default(), &mut rng)?;
    let trainer = Trainer::new(ctx.config.trainer_for(&ctx.config.recommender))?;
    let history = trainer.train(&mut model, &dataset, Loss::Bce)?;

    let summary = evaluate_recommendation(&model, &dataset)?;
    Ok(TrainedFamily {
        metrics: metrics_record(&summary, samples, &history),
        model: ModelFamily::Recommender(model),
        scaler,
        samples,
    })
}
