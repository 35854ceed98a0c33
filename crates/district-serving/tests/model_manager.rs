use async_trait::async_trait;
use district_features::RawRecord;
use district_models::BoostingConfig;
use district_serving::{
    CollectedData, DataSource, DataSourceError, LocationScore, LocationScorer, ManagerConfig,
    ModelKind, ModelManager, QuarterSnapshot, TrainOutcome,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Notify;

const CATEGORIES: [&str; 3] = ["CS100001", "CS100002", "CS200001"];

fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}

fn area(i: usize) -> String {
    format!("31100{i:02}")
}

fn quarter_index(quarter: &str) -> usize {
    quarter.bytes().map(|b| b as usize).sum::<usize>() % 8
}

/// Deterministic records for `areas` locations.
struct SyntheticSource {
    areas: usize,
    fail: bool,
    gate: Option<Arc<Notify>>,
    population_calls: AtomicUsize,
    collections: AtomicUsize,
}

impl SyntheticSource {
    fn new(areas: usize) -> Self {
        Self {
            areas,
            fail: false,
            gate: None,
            population_calls: AtomicUsize::new(0),
            collections: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(12)
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(12)
        }
    }

    fn check(&self, quarter: &str) -> Result<(), DataSourceError> {
        if self.fail {
            return Err(DataSourceError::Unavailable {
                quarter: quarter.to_string(),
                message: "upstream down".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    async fn population(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.check(quarter)?;
        if self.population_calls.fetch_add(1, Ordering::SeqCst) % 8 == 0 {
            self.collections.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        let q = quarter_index(quarter);
        Ok((0..self.areas)
            .map(|i| {
                let base = 1000 * (i + 1) + 37 * q;
                record(json!({
                    "TRDAR_CD": area(i),
                    "TMZON_1_FLPOP_CO": base,
                    "TMZON_4_FLPOP_CO": base * 2,
                    "SAT_FLPOP_CO": base / 3,
                    "AGRDE_20_FLPOP_CO": (base / 2).to_string(),
                }))
            })
            .collect())
    }

    async fn sales(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.check(quarter)?;
        let q = quarter_index(quarter);
        let mut rows = Vec::new();
        for i in 0..self.areas {
            for (c, category) in CATEGORIES.iter().enumerate() {
                if (i + c) % 4 == 0 {
                    continue;
                }
                let amount = 10_000 * (i + 1) * (c + 1) + 500 * q;
                rows.push(record(json!({
                    "TRDAR_CD": area(i),
                    "SVC_INDUTY_CD": category,
                    "THSMON_SELNG_AMT": amount,
                    "TMZON_3_SELNG_AMT": amount / 2,
                    "TMZON_5_SELNG_AMT": amount / 4,
                    "FRI_SELNG_AMT": amount / 7,
                })));
            }
        }
        Ok(rows)
    }

    async fn stores(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.check(quarter)?;
        let mut rows = Vec::new();
        for i in 0..self.areas {
            for (c, category) in CATEGORIES.iter().enumerate() {
                rows.push(record(json!({
                    "TRDAR_CD": area(i),
                    "SVC_INDUTY_CD": category,
                    "STOR_CO": 4 + i % 5 + c,
                    "OPBIZ_STOR_CO": i % 2,
                    "CLSBIZ_STOR_CO": (i + c) % 3,
                })));
            }
        }
        Ok(rows)
    }

    async fn facilities(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.check(quarter)?;
        Ok((0..self.areas)
            .map(|i| record(json!({"TRDAR_CD": area(i), "SUBWAY_STATN_CO": i % 3})))
            .collect())
    }
}

/// Scores a location by its total revenue.
struct RevenueScorer;

impl LocationScorer for RevenueScorer {
    fn score(&self, code: &str, snapshot: &QuarterSnapshot<'_>) -> LocationScore {
        let revenue: f64 = snapshot
            .sales
            .iter()
            .filter(|r| r.get("TRDAR_CD").and_then(Value::as_str) == Some(code))
            .filter_map(|r| r.get("THSMON_SELNG_AMT").and_then(Value::as_f64))
            .sum();
        LocationScore {
            total_score: (revenue / 5_000.0).min(100.0),
            breakdown: Default::default(),
        }
    }
}

/// Blocks inside the scoring family's training while `hold` is set and
/// records how many trainings are inside at once.
struct HeldScorer {
    hold: AtomicBool,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl HeldScorer {
    fn new() -> Self {
        Self {
            hold: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
    }

    async fn entered(&self) {
        wait_until(|| self.calls.load(Ordering::SeqCst) > 0).await;
    }
}

impl LocationScorer for HeldScorer {
    fn score(&self, code: &str, snapshot: &QuarterSnapshot<'_>) -> LocationScore {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        while self.hold.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        RevenueScorer.score(code, snapshot)
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

fn config(dir: &Path) -> ManagerConfig {
    ManagerConfig::default()
        .with_model_dir(dir)
        .with_epochs(3)
        .with_mc_passes(6)
        .with_boosting(BoostingConfig {
            n_estimators: 5,
            max_depth: 3,
            ..BoostingConfig::default()
        })
}

fn manager(dir: &Path) -> ModelManager {
    ModelManager::new(config(dir))
        .unwrap()
        .with_scorer(Arc::new(RevenueScorer))
}

async fn collected(manager: &ModelManager) -> CollectedData {
    CollectedData::collect(&SyntheticSource::new(12), &manager.config().quarters)
        .await
        .unwrap()
}

fn assert_no_predictions(manager: &ModelManager, data: &CollectedData) {
    let code = area(1);
    assert!(manager
        .predict_sales_forecast(&code, "CS100002", &data.pop_by_q, &data.sales_by_q, &data.stores_by_q)
        .is_none());
    assert!(manager.predict_survival(&code, data.latest()).is_none());
    assert!(manager.predict_score(&code, data.latest()).is_none());
    assert!(manager.recommend(&code, data.latest()).is_none());
}

#[tokio::test]
async fn test_predictions_are_none_before_training() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let data = collected(&manager).await;

    assert!(manager.needs_training());
    assert_no_predictions(&manager, &data);
}

#[tokio::test]
async fn test_train_all_readies_every_family() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let outcome = manager.train_all(&SyntheticSource::new(12)).await;

    let TrainOutcome::Completed { trained, skipped, failed } = outcome else {
        panic!("training was not started");
    };
    assert_eq!(trained, ModelKind::ALL.to_vec());
    assert!(skipped.is_empty());
    assert!(failed.is_empty());
    assert!(!manager.needs_training());
    assert!(!manager.is_training());

    let status = manager.get_status();
    for kind in ModelKind::ALL {
        let model = &status.models[kind.name()];
        assert!(model.ready, "{kind}");
        assert_eq!(model.version, 1);
        assert!(!model.trained_at.is_empty());
        assert!(model.samples > 0);
    }
    assert_eq!(status.models["recommendation"].samples, 12 * 15);

    let metrics = manager.get_all_metrics();
    assert!(metrics["sales_lstm"].contains_key("mae"));
    assert!(metrics["survival_mlp"].contains_key("accuracy_1yr"));
    assert!(metrics["scoring_ensemble"].contains_key("rmse"));
    assert!(metrics["recommendation"].contains_key("precision"));
    assert!(metrics["survival_mlp"].contains_key("train_losses"));

    let version_dir = dir.path().join("scoring_ensemble").join("v1");
    for file in ["mlp_model.pt", "xgb_model.pkl", "scaler.pkl", "metrics.json"] {
        assert!(version_dir.join(file).exists(), "{file}");
    }
}

#[tokio::test]
async fn test_predictions_after_training() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    manager.train_all(&SyntheticSource::new(12)).await;
    let data = collected(&manager).await;
    let code = area(4);

    let forecast = manager
        .predict_sales_forecast(&code, "CS100002", &data.pop_by_q, &data.sales_by_q, &data.stores_by_q)
        .unwrap();
    assert_eq!(forecast.area_code, code);
    assert_eq!(forecast.quarterly_predictions.len(), 4);
    assert_eq!(forecast.quarterly_predictions[0].quarter, "2025-Q4");
    assert_eq!(forecast.quarterly_predictions[3].quarter, "2026-Q3");
    for q in &forecast.quarterly_predictions {
        assert!(0 <= q.lower && q.lower <= q.predicted && q.predicted <= q.upper, "{q:?}");
    }
    assert_eq!(forecast.predicted_next_quarter, forecast.quarterly_predictions[0].predicted);
    assert_eq!(forecast.historical.len(), 8);
    assert_eq!(forecast.historical[0].quarter, "20234");
    assert_eq!(forecast.current_quarter_sales, forecast.historical[7].sales);

    // (4 + 0) % 4 == 0: no CS100001 revenue at this location
    let empty = manager
        .predict_sales_forecast(&code, "CS100001", &data.pop_by_q, &data.sales_by_q, &data.stores_by_q)
        .unwrap();
    assert!(empty.historical.is_empty());
    assert_eq!(empty.current_quarter_sales, 0);

    let survival = manager.predict_survival(&code, data.latest()).unwrap();
    for p in [survival.survival_1yr, survival.survival_3yr, survival.survival_5yr] {
        assert!((0.0..=100.0).contains(&p));
    }

    let score = manager.predict_score(&code, data.latest()).unwrap();
    assert!((0..=100).contains(&score));

    let ranked = manager.recommend(&code, data.latest()).unwrap();
    assert_eq!(ranked.len(), 15);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_fresh_manager_loads_committed_versions() {
    let dir = tempdir().unwrap();
    let trained = manager(dir.path());
    trained.train_all(&SyntheticSource::new(12)).await;
    let data = collected(&trained).await;

    let fresh = manager(dir.path());
    assert!(fresh.needs_training());
    assert_eq!(fresh.load_all(), 4);
    assert!(!fresh.needs_training());

    let code = area(7);
    assert_eq!(
        fresh.predict_survival(&code, data.latest()),
        trained.predict_survival(&code, data.latest())
    );
    assert_eq!(
        fresh.predict_score(&code, data.latest()),
        trained.predict_score(&code, data.latest())
    );
    assert_eq!(
        fresh.recommend(&code, data.latest()),
        trained.recommend(&code, data.latest())
    );
}

#[tokio::test]
async fn test_corrupt_artifact_leaves_family_not_ready() {
    let dir = tempdir().unwrap();
    let trained = manager(dir.path());
    trained.train_single(ModelKind::SurvivalMlp, &SyntheticSource::new(12)).await;
    trained.train_single(ModelKind::Recommendation, &SyntheticSource::new(12)).await;
    std::fs::write(dir.path().join("survival_mlp").join("v1").join("model.pt"), "{").unwrap();

    let fresh = manager(dir.path());
    assert_eq!(fresh.load_all(), 1);
    assert!(!fresh.is_ready(ModelKind::SurvivalMlp));
    assert!(fresh.is_ready(ModelKind::Recommendation));
}

#[tokio::test]
async fn test_scoring_skipped_without_scorer() {
    let dir = tempdir().unwrap();
    let manager = ModelManager::new(config(dir.path())).unwrap();
    let outcome = manager.train_all(&SyntheticSource::new(12)).await;

    assert_eq!(
        outcome,
        TrainOutcome::Completed {
            trained: vec![ModelKind::SurvivalMlp, ModelKind::SalesLstm, ModelKind::Recommendation],
            skipped: vec![ModelKind::ScoringEnsemble],
            failed: vec![],
        }
    );
    assert!(!manager.is_ready(ModelKind::ScoringEnsemble));
    assert!(!dir.path().join("scoring_ensemble").join("metadata.json").exists());
}

#[tokio::test]
async fn test_insufficient_data_skips_without_artifacts() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let outcome = manager.train_all(&SyntheticSource::new(3)).await;

    let TrainOutcome::Completed { trained, skipped, failed } = outcome else {
        panic!("training was not started");
    };
    assert!(trained.is_empty());
    assert!(failed.is_empty());
    assert_eq!(skipped.len(), 4);
    for kind in ModelKind::ALL {
        assert!(!manager.is_ready(kind));
        assert_eq!(manager.get_status().models[kind.name()].version, 0);
    }
}

#[tokio::test]
async fn test_failed_training_keeps_previous_version_ready() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let first = manager.train_single(ModelKind::SurvivalMlp, &SyntheticSource::new(12)).await;
    assert_eq!(first.trained(), &[ModelKind::SurvivalMlp]);

    let outcome = manager.train_single(ModelKind::SurvivalMlp, &SyntheticSource::failing()).await;
    assert_eq!(
        outcome,
        TrainOutcome::Completed {
            trained: vec![],
            skipped: vec![],
            failed: vec![ModelKind::SurvivalMlp],
        }
    );
    assert!(manager.is_ready(ModelKind::SurvivalMlp));
    assert!(!manager.is_training());
    assert_eq!(manager.get_status().models["survival_mlp"].version, 1);
}

#[tokio::test]
async fn test_retraining_commits_next_version() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    for expected in 1..=3u32 {
        manager.train_single(ModelKind::Recommendation, &SyntheticSource::new(12)).await;
        assert_eq!(manager.get_status().models["recommendation"].version, expected);
    }
    // the other families were never touched
    assert_eq!(manager.get_status().models["sales_lstm"].version, 0);
    assert!(!manager.is_ready(ModelKind::SalesLstm));
}

#[tokio::test]
async fn test_second_training_request_is_rejected_while_running() {
    let dir = tempdir().unwrap();
    let manager = manager(dir.path());
    let gate = Arc::new(Notify::new());
    let source = Arc::new(SyntheticSource::gated(gate.clone()));

    let first = tokio::spawn({
        let manager = manager.clone();
        let source = source.clone();
        async move { manager.train_single(ModelKind::SurvivalMlp, source.as_ref()).await }
    });
    while !manager.is_training() {
        tokio::task::yield_now().await;
    }

    let second = manager.train_all(source.as_ref()).await;
    assert_eq!(second, TrainOutcome::AlreadyRunning);
    gate.notify_one();

    let first = first.await.unwrap();
    assert_eq!(first.trained(), &[ModelKind::SurvivalMlp]);
    assert_eq!(source.collections.load(Ordering::SeqCst), 1);
    assert!(!manager.is_training());

    // the gate is free again
    let third = manager.train_single(ModelKind::SurvivalMlp, &SyntheticSource::new(12)).await;
    assert_eq!(third.trained(), &[ModelKind::SurvivalMlp]);
}

#[tokio::test]
async fn test_training_never_runs_concurrently() {
    let dir = tempdir().unwrap();
    let scorer = Arc::new(HeldScorer::new());
    let manager = ModelManager::new(config(dir.path())).unwrap().with_scorer(scorer.clone());

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .train_single(ModelKind::ScoringEnsemble, &SyntheticSource::new(12))
                    .await
            })
        })
        .collect();
    scorer.entered().await;
    wait_until(|| runs.iter().filter(|r| r.is_finished()).count() == 3).await;

    // still training, so every other caller is turned away
    assert!(manager.is_training());
    assert_eq!(manager.train_all(&SyntheticSource::new(12)).await, TrainOutcome::AlreadyRunning);
    scorer.release();

    let mut outcomes = Vec::new();
    for run in runs {
        outcomes.push(run.await.unwrap());
    }
    let rejected = outcomes.iter().filter(|o| **o == TrainOutcome::AlreadyRunning).count();
    assert_eq!(rejected, 3);
    assert!(outcomes.iter().any(|o| o.trained() == [ModelKind::ScoringEnsemble]));
    assert_eq!(scorer.peak.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_status().models["scoring_ensemble"].version, 1);
}

#[tokio::test]
async fn test_cancelled_caller_keeps_gate_closed_until_training_ends() {
    let dir = tempdir().unwrap();
    let scorer = Arc::new(HeldScorer::new());
    let manager = ModelManager::new(config(dir.path())).unwrap().with_scorer(scorer.clone());
    let source = SyntheticSource::new(12);

    tokio::select! {
        _ = manager.train_single(ModelKind::ScoringEnsemble, &source) => {
            panic!("training finished while the scorer was held");
        }
        _ = scorer.entered() => {}
    }

    // the caller is gone but its training is still running
    assert!(manager.is_training());
    assert_eq!(manager.train_all(&source).await, TrainOutcome::AlreadyRunning);

    scorer.release();
    wait_until(|| !manager.is_training()).await;
    assert!(manager.is_ready(ModelKind::ScoringEnsemble));
    assert_eq!(manager.get_status().models["scoring_ensemble"].version, 1);
    assert_eq!(scorer.peak.load(Ordering::SeqCst), 1);

    let next = manager.train_single(ModelKind::ScoringEnsemble, &source).await;
    assert_eq!(next.trained(), &[ModelKind::ScoringEnsemble]);
    assert_eq!(manager.get_status().models["scoring_ensemble"].version, 2);
}
