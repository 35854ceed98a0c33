//! Model lifecycle manager.
//!
//! The [`ModelManager`] owns one registry entry per family and is the only
//! entry point the rest of a service uses:
//!
//! - `load_all()` restores the latest committed version of every family
//! - `train_all()` / `train_single()` collect records, fit, commit and
//!   publish, one run at a time
//! - `predict_*()` / `recommend()` answer from ready families and return
//!   `None` otherwise, so callers can fall back to rule-based answers
//! - `get_status()` / `get_all_metrics()` report what is on disk
//!
//! Nothing here returns an error to the caller; failures are logged.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::family::{load_scaler, save_scaler, ModelFamily, ModelKind};
use crate::outputs::{
    CategoryScore, HistoricalSales, ManagerStatus, ModelStatus, QuarterPrediction, SalesForecast,
    SurvivalForecast, TrainOutcome,
};
use crate::registry::ModelRegistry;
use crate::source::{CollectedData, DataSource, LocationScorer};
use crate::training::{static_context, train_family, TrainedFamily, TrainingContext};
use district_checkpoint::VersionManager;
use district_features::quarter::next_quarter_labels;
use district_features::{
    collate_padded, FeatureExtractor, FeatureScaler, QuarterRecords, RecordsByQuarter,
    CATEGORY_CODES, OUTPUT_STEPS,
};
use district_layers::Tensor;
use district_models::Trainable;
use district_training::{round_to, MetricsRecord};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Two-sided 95% normal quantile.
const CONFIDENCE_Z: f64 = 1.96;

struct ManagerInner {
    config: ManagerConfig,
    versions: VersionManager,
    extractor: FeatureExtractor,
    registry: ModelRegistry,
    scorer: RwLock<Option<Arc<dyn LocationScorer>>>,
    training: AtomicBool,
}

/// Holds the training gate; clears the flag when dropped.
///
/// Owns its handle on the manager so it can move into the blocking task
/// that does the work, and the gate stays closed until that task ends
/// even if the caller stops waiting.
struct TrainingGuard {
    inner: Arc<ManagerInner>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.inner.training.store(false, Ordering::Release);
    }
}

/// Trains, versions, loads and serves the district models.
///
/// Cloning is cheap and every clone shares the same registry and
/// training gate.
///
/// # Example
///
/// ```no_run
/// use district_serving::{ManagerConfig, ModelKind, ModelManager};
///
/// let manager = ModelManager::new(ManagerConfig::default().with_model_dir("/tmp/models")).unwrap();
/// let loaded = manager.load_all();
/// if manager.needs_training() {
///     println!("{loaded} of {} families ready", ModelKind::ALL.len());
/// }
/// ```
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_dir", &self.inner.config.model_dir)
            .field("training", &self.is_training())
            .finish_non_exhaustive()
    }
}

impl ModelManager {
    /// Creates a manager with an empty registry.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or when the model directory
    /// cannot be created.
    pub fn new(config: ManagerConfig) -> ManagerResult<Self> {
        config.validate()?;
        let versions = VersionManager::new(config.version_config())?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                versions,
                extractor: FeatureExtractor::new(),
                registry: ModelRegistry::new(),
                scorer: RwLock::new(None),
                training: AtomicBool::new(false),
            }),
        })
    }

    /// Sets the label source of the scoring family.
    pub fn with_scorer(self, scorer: Arc<dyn LocationScorer>) -> Self {
        self.set_scorer(scorer);
        self
    }

    /// Replaces the label source of the scoring family.
    pub fn set_scorer(&self, scorer: Arc<dyn LocationScorer>) {
        *self.inner.scorer.write() = Some(scorer);
    }

    /// The configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Whether `kind` has a usable model loaded.
    pub fn is_ready(&self, kind: ModelKind) -> bool {
        self.inner.registry.is_ready(kind)
    }

    /// True while any family is not ready.
    pub fn needs_training(&self) -> bool {
        !self.inner.registry.all_ready()
    }

    /// True while a training run holds the gate.
    pub fn is_training(&self) -> bool {
        self.inner.training.load(Ordering::Acquire)
    }

    // ── Loading ──────────────────────────────────────────

    /// Loads the latest committed version of every family.
    ///
    /// Returns the number of families loaded. A family without versions
    /// or with unreadable artifacts stays as it was.
    pub fn load_all(&self) -> usize {
        let mut loaded = 0;
        for kind in ModelKind::ALL {
            match self.load_model(kind) {
                Ok(true) => loaded += 1,
                Ok(false) => info!(model = %kind, "No committed version to load"),
                Err(e) => warn!(model = %kind, error = %e, "Failed to load model"),
            }
        }
        info!(loaded, total = ModelKind::ALL.len(), "Model loading finished");
        loaded
    }

    fn load_model(&self, kind: ModelKind) -> ManagerResult<bool> {
        let name = kind.name();
        let versions = &self.inner.versions;
        let Some(dir) = versions.latest_version_dir(name)? else {
            return Ok(false);
        };
        let weights = self.inner.config.ensemble_weights;
        let (model, scaler) = ModelFamily::load(kind, &dir, weights)
            .and_then(|model| Ok((model, load_scaler(&dir)?)))
            .map_err(|e| ManagerError::ArtifactLoad {
                model: name,
                path: dir.clone(),
                source: Box::new(e),
            })?;
        self.inner.registry.install(model, scaler);
        info!(model = name, version = versions.latest_version(name)?, path = %dir.display(), "Loaded model");
        Ok(true)
    }

    // ── Training ─────────────────────────────────────────

    fn begin_training(&self) -> Option<TrainingGuard> {
        self.inner
            .training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TrainingGuard {
                inner: Arc::clone(&self.inner),
            })
    }

    /// Trains every family in turn.
    ///
    /// Returns [`TrainOutcome::AlreadyRunning`] at once when another run
    /// holds the gate.
    pub async fn train_all(&self, source: &dyn DataSource) -> TrainOutcome {
        self.train_families(&ModelKind::ALL, source).await
    }

    /// Trains one family, behind the same gate as [`ModelManager::train_all`].
    pub async fn train_single(&self, kind: ModelKind, source: &dyn DataSource) -> TrainOutcome {
        self.train_families(&[kind], source).await
    }

    /// Collects records, then fits every family of `kinds` in one
    /// blocking task that owns the gate.
    ///
    /// Dropping the returned future before the task ends does not stop
    /// the task or reopen the gate.
    async fn train_families(&self, kinds: &[ModelKind], source: &dyn DataSource) -> TrainOutcome {
        let Some(guard) = self.begin_training() else {
            warn!("Training already in progress");
            return TrainOutcome::AlreadyRunning;
        };
        info!(models = kinds.len(), "Model training started");

        let data = match CollectedData::collect(source, &self.inner.config.quarters).await {
            Ok(data) => Arc::new(data),
            Err(e) => {
                error!(error = %e, "Training data collection failed");
                return TrainOutcome::Completed {
                    trained: Vec::new(),
                    skipped: Vec::new(),
                    failed: kinds.to_vec(),
                };
            }
        };
        let ctx = TrainingContext {
            config: self.inner.config.clone(),
            data,
            scorer: self.inner.scorer.read().clone(),
        };

        let manager = self.clone();
        let owned_kinds = kinds.to_vec();
        let run = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            manager.train_each(&owned_kinds, &ctx)
        });
        match run.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Training task failed");
                TrainOutcome::Completed {
                    trained: Vec::new(),
                    skipped: Vec::new(),
                    failed: kinds.to_vec(),
                }
            }
        }
    }

    /// Fits, commits and publishes each family in turn. A panic in one
    /// family counts as its failure and the rest still run.
    fn train_each(&self, kinds: &[ModelKind], ctx: &TrainingContext) -> TrainOutcome {
        let mut trained = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        for &kind in kinds {
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.train_and_commit(kind, ctx)))
                .unwrap_or_else(|_| Err(ManagerError::TaskJoin(format!("{kind} training panicked"))));
            match result {
                Ok(_) => trained.push(kind),
                Err(e) if e.is_skip() => {
                    info!(model = %kind, reason = %e, "Training skipped");
                    skipped.push(kind);
                }
                Err(e) => {
                    error!(model = %kind, error = %e, "Training failed");
                    failed.push(kind);
                }
            }
        }

        info!(
            trained = trained.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            "Model training finished"
        );
        TrainOutcome::Completed {
            trained,
            skipped,
            failed,
        }
    }

    /// Trains `kind`, commits it and publishes it. Returns the version.
    fn train_and_commit(&self, kind: ModelKind, ctx: &TrainingContext) -> ManagerResult<u32> {
        let trained = train_family(kind, ctx)?;
        let version = self.commit(kind, &trained)?;
        info!(model = %kind, version, samples = trained.samples, "Model trained");
        self.inner.registry.install(trained.model, trained.scaler);
        Ok(version)
    }

    fn commit(&self, kind: ModelKind, trained: &TrainedFamily) -> ManagerResult<u32> {
        let versions = &self.inner.versions;
        let (dir, version) = versions.next_version_dir(kind.name())?;
        trained.model.save(&dir)?;
        save_scaler(&trained.scaler, &dir)?;
        versions.commit_version(kind.name(), version, trained.metrics.clone())?;
        Ok(version)
    }

    // ── Inference ────────────────────────────────────────

    /// Runs `f` against a ready family; `None` when not ready or when
    /// inference fails.
    fn infer<T>(
        &self,
        kind: ModelKind,
        f: impl FnOnce(&ModelFamily, &FeatureScaler) -> ManagerResult<T>,
    ) -> Option<T> {
        match self.inner.registry.with_ready(kind, f)? {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(model = %kind, error = %e, "Inference failed");
                None
            }
        }
    }

    fn scaled_static(&self, code: &str, records: QuarterRecords<'_>, scaler: &FeatureScaler) -> ManagerResult<Vec<f32>> {
        let features = self
            .inner
            .extractor
            .extract_static(code, records, &static_context(&self.inner.config));
        Ok(scaler.transform_row(&features)?)
    }

    /// Forecasts the next quarters of `biz_code` revenue at `area_code`
    /// with a 95% band from stochastic passes.
    ///
    /// Returns `None` when the forecaster is not ready or the configured
    /// window is shorter than `min_quarters`.
    pub fn predict_sales_forecast(
        &self,
        area_code: &str,
        biz_code: &str,
        pop_by_q: &RecordsByQuarter,
        sales_by_q: &RecordsByQuarter,
        stores_by_q: &RecordsByQuarter,
    ) -> Option<SalesForecast> {
        let kind = ModelKind::SalesLstm;
        if !self.is_ready(kind) {
            return None;
        }
        let config = &self.inner.config;
        let extractor = &self.inner.extractor;
        let quarters = &config.quarters;

        let rows = extractor.extract_timeseries(area_code, pop_by_q, sales_by_q, stores_by_q, quarters);
        if rows.len() < config.min_quarters {
            return None;
        }
        let sales = extractor.extract_target_sales(area_code, biz_code, sales_by_q, quarters);
        let current = sales.last().copied().unwrap_or(0.0) as f64;

        let (point, spread) = self.infer(kind, |family, scaler| {
            let model = family.as_forecaster()?;
            let scaled = rows
                .iter()
                .map(|row| scaler.transform_row(row))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = collate_padded(&[scaled.as_slice()], &[&[0.0; OUTPUT_STEPS]])?;
            let point = model.predict(&batch.inputs)?.into_data();
            let passes = (0..config.mc_passes)
                .into_par_iter()
                .map(|pass| {
                    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(pass as u64));
                    model
                        .predict_stochastic(&batch.inputs, &mut rng)
                        .map(Tensor::into_data)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((point, pass_std(&passes, OUTPUT_STEPS)))
        })?;

        let last_quarter = config.latest_quarter().unwrap_or_default();
        let quarterly_predictions: Vec<QuarterPrediction> = next_quarter_labels(last_quarter, OUTPUT_STEPS)
            .into_iter()
            .zip(point.iter().zip(&spread))
            .map(|(quarter, (&p, &s))| {
                let (predicted, lower, upper) = forecast_bounds(p as f64, s);
                QuarterPrediction {
                    quarter,
                    predicted,
                    lower,
                    upper,
                }
            })
            .collect();

        let first = quarterly_predictions.first();
        let next = first.map(|q| q.predicted).unwrap_or(0);
        let growth_rate = (next as f64 - current) / current.max(1.0) * 100.0;
        let historical = quarters
            .iter()
            .zip(&sales)
            .filter(|(_, &s)| s > 0.0)
            .map(|(quarter, &s)| HistoricalSales {
                quarter: quarter.clone(),
                sales: s as i64,
            })
            .collect();

        Some(SalesForecast {
            area_code: area_code.to_string(),
            business_type: biz_code.to_string(),
            current_quarter_sales: current as i64,
            predicted_next_quarter: next,
            growth_rate: round_to(growth_rate, 1),
            confidence_lower: first.map(|q| q.lower).unwrap_or(0),
            confidence_upper: first.map(|q| q.upper).unwrap_or(0),
            quarterly_predictions,
            historical,
        })
    }

    /// 1, 3 and 5-year survival of `area_code` in percent.
    pub fn predict_survival(&self, area_code: &str, records: QuarterRecords<'_>) -> Option<SurvivalForecast> {
        self.infer(ModelKind::SurvivalMlp, |family, scaler| {
            let model = family.as_classifier()?;
            let row = self.scaled_static(area_code, records, scaler)?;
            let out = model.predict(&Tensor::from_data(&[1, row.len()], row))?;
            let percent = |i: usize| round_to(out.data()[i] as f64 * 100.0, 1);
            Ok(SurvivalForecast {
                survival_1yr: percent(0),
                survival_3yr: percent(1),
                survival_5yr: percent(2),
            })
        })
    }

    /// Ensemble location score of `area_code`, 0 to 100.
    pub fn predict_score(&self, area_code: &str, records: QuarterRecords<'_>) -> Option<i32> {
        self.infer(ModelKind::ScoringEnsemble, |family, scaler| {
            let ensemble = family.as_ensemble()?;
            let row = self.scaled_static(area_code, records, scaler)?;
            let scores = ensemble.predict(&Tensor::from_data(&[1, row.len()], row))?;
            Ok(scores.first().copied().unwrap_or(0))
        })
    }

    /// Every category ranked by fit at `area_code`, best first.
    pub fn recommend(&self, area_code: &str, records: QuarterRecords<'_>) -> Option<Vec<CategoryScore>> {
        self.infer(ModelKind::Recommendation, |family, scaler| {
            let model = family.as_recommender()?;
            let row = self.scaled_static(area_code, records, scaler)?;
            let scores = model.score_all(&row)?;
            let mut ranked: Vec<CategoryScore> = CATEGORY_CODES
                .iter()
                .zip(scores)
                .map(|(code, s)| CategoryScore {
                    biz_code: code.to_string(),
                    score: round_to(s as f64 * 100.0, 1),
                })
                .collect();
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
            Ok(ranked)
        })
    }

    // ── Introspection ────────────────────────────────────

    /// Readiness and latest version of every family.
    pub fn get_status(&self) -> ManagerStatus {
        let models = ModelKind::ALL
            .into_iter()
            .map(|kind| {
                let version = self.latest_version(kind);
                let metrics = if version > 0 {
                    self.latest_metrics(kind)
                } else {
                    MetricsRecord::new()
                };
                let status = ModelStatus {
                    ready: self.is_ready(kind),
                    version,
                    trained_at: metrics
                        .get("trained_at")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    samples: metrics.get("samples").and_then(|v| v.as_u64()).unwrap_or(0),
                };
                (kind.name().to_string(), status)
            })
            .collect();
        ManagerStatus {
            training_in_progress: self.is_training(),
            models,
        }
    }

    /// Metrics of the latest version of every family; empty for families
    /// never trained.
    pub fn get_all_metrics(&self) -> BTreeMap<String, MetricsRecord> {
        ModelKind::ALL
            .into_iter()
            .map(|kind| (kind.name().to_string(), self.latest_metrics(kind)))
            .collect()
    }

    fn latest_version(&self, kind: ModelKind) -> u32 {
        self.inner.versions.latest_version(kind.name()).unwrap_or_else(|e| {
            warn!(model = %kind, error = %e, "Failed to read version metadata");
            0
        })
    }

    fn latest_metrics(&self, kind: ModelKind) -> MetricsRecord {
        self.inner.versions.get_metrics(kind.name(), None).unwrap_or_else(|e| {
            warn!(model = %kind, error = %e, "Failed to read model metrics");
            MetricsRecord::new()
        })
    }
}

/// Population standard deviation of each of the first `steps` outputs
/// across passes.
fn pass_std(passes: &[Vec<f32>], steps: usize) -> Vec<f64> {
    let n = passes.len().max(1) as f64;
    (0..steps)
        .map(|step| {
            let values = passes.iter().map(|p| p.get(step).copied().unwrap_or(0.0) as f64);
            let mean = values.clone().sum::<f64>() / n;
            let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            var.sqrt()
        })
        .collect()
}

/// Truncated point forecast and band, all non-negative, with
/// `lower <= predicted <= upper`.
fn forecast_bounds(prediction: f64, std: f64) -> (i64, i64, i64) {
    let truncate = |v: f64| (v.trunc() as i64).max(0);
    let predicted = truncate(prediction);
    let lower = truncate(prediction - CONFIDENCE_Z * std).min(predicted);
    let upper = truncate(prediction + CONFIDENCE_Z * std).max(predicted);
    (predicted, lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pass_std_is_population_std() {
        let passes = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        assert_eq!(pass_std(&passes, 2), vec![1.0, 0.0]);
    }

    #[test]
    fn test_forecast_bounds() {
        assert_eq!(forecast_bounds(100.7, 10.0), (100, 81, 120));
        assert_eq!(forecast_bounds(-5.0, 1.0), (0, 0, 0));
        assert_eq!(forecast_bounds(3.0, 5.0), (3, 0, 12));
        // a negative spread cannot invert the band
        assert_eq!(forecast_bounds(50.0, -2.0), (50, 50, 50));
    }

    #[test]
    fn test_new_manager_is_not_ready() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(ManagerConfig::default().with_model_dir(dir.path())).unwrap();
        assert!(manager.needs_training());
        assert!(!manager.is_training());
        assert_eq!(manager.load_all(), 0);
        for kind in ModelKind::ALL {
            assert!(!manager.is_ready(kind));
        }
        let status = manager.get_status();
        assert_eq!(status.models.len(), 4);
        assert_eq!(status.models["recommendation"].version, 0);
        assert_eq!(status.models["recommendation"].trained_at, "");
        assert!(manager.get_all_metrics().values().all(|m| m.is_empty()));
    }

    #[test]
    fn test_gate_admits_one_holder() {
        let dir = tempdir().unwrap();
        let manager = ModelManager::new(ManagerConfig::default().with_model_dir(dir.path())).unwrap();
        let guard = manager.begin_training();
        assert!(guard.is_some());
        assert!(manager.is_training());
        assert!(manager.begin_training().is_none());
        drop(guard);
        assert!(!manager.is_training());
        assert!(manager.begin_training().is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let config = ManagerConfig::default().with_model_dir(dir.path()).with_mc_passes(0);
        assert!(ModelManager::new(config).is_err());
    }
}
