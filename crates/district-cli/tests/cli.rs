use clap::Parser;
use district_cli::commands::PredictTarget;
use district_cli::{Cli, Commands, ManagerArgs, TrainCommand};
use district_serving::{ModelKind, ModelManager};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

#[test]
fn cli_parses_train_flags() {
    let cli = Cli::parse_from([
        "district",
        "--model-dir",
        "/srv/models",
        "train",
        "--model",
        "survival_mlp",
        "--data",
        "/srv/records",
    ]);
    assert_eq!(cli.manager.model_dir, Some(PathBuf::from("/srv/models")));
    let Commands::Train(cmd) = cli.command else {
        panic!("expected train");
    };
    assert_eq!(cmd.model, Some(ModelKind::SurvivalMlp));
    assert_eq!(cmd.data, PathBuf::from("/srv/records"));
}

#[test]
fn cli_rejects_unknown_model() {
    let parsed = Cli::try_parse_from(["district", "train", "--model", "lstm", "--data", "x"]);
    assert!(parsed.is_err());
}

#[test]
fn cli_parses_predict_forecast() {
    let cli = Cli::parse_from([
        "district",
        "predict",
        "forecast",
        "--data",
        "/srv/records",
        "--area",
        "3110008",
        "--category",
        "CS100001",
        "--config",
        "/etc/district.json",
    ]);
    assert_eq!(cli.manager.config_path, Some(PathBuf::from("/etc/district.json")));
    let Commands::Predict(cmd) = cli.command else {
        panic!("expected predict");
    };
    let PredictTarget::Forecast(args) = cmd.target else {
        panic!("expected forecast");
    };
    assert_eq!(args.location.area, "3110008");
    assert_eq!(args.category, "CS100001");
}

#[test]
fn cli_forecast_requires_category() {
    let parsed = Cli::try_parse_from(["district", "predict", "forecast", "--data", "d", "--area", "1"]);
    assert!(parsed.is_err());
}

#[test]
fn model_dir_flag_overrides_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"model_dir": "/from/file", "mc_passes": 4}"#).unwrap();

    let args = ManagerArgs {
        model_dir: Some(dir.path().join("models")),
        config_path: Some(path),
    };
    let config = args.config().unwrap();
    assert_eq!(config.model_dir, dir.path().join("models"));
    assert_eq!(config.mc_passes, 4);

    let missing = ManagerArgs {
        model_dir: None,
        config_path: Some(dir.path().join("missing.json")),
    };
    assert!(missing.config().is_err());
}

fn write_records(root: &Path, quarters: &[String], areas: usize) {
    for (q, quarter) in quarters.iter().enumerate() {
        let dir = root.join(quarter);
        std::fs::create_dir_all(&dir).unwrap();
        let mut population = Vec::new();
        let mut sales = Vec::new();
        let mut stores = Vec::new();
        for i in 0..areas {
            let code = format!("31100{i:02}");
            population.push(json!({"TRDAR_CD": code, "TMZON_2_FLPOP_CO": 800 * (i + 1) + 11 * q}));
            sales.push(json!({
                "TRDAR_CD": code,
                "SVC_INDUTY_CD": "CS100001",
                "THSMON_SELNG_AMT": 20_000 * (i + 1) + 300 * q,
                "TMZON_3_SELNG_AMT": 9_000 * (i + 1),
            }));
            stores.push(json!({
                "TRDAR_CD": code,
                "SVC_INDUTY_CD": "CS100001",
                "STOR_CO": 5 + i % 4,
                "OPBIZ_STOR_CO": i % 3,
                "CLSBIZ_STOR_CO": i % 2,
            }));
        }
        std::fs::write(dir.join("population.json"), json!(population).to_string()).unwrap();
        std::fs::write(dir.join("sales.json"), json!(sales).to_string()).unwrap();
        std::fs::write(dir.join("stores.json"), json!(stores).to_string()).unwrap();
    }
}

#[tokio::test]
async fn train_command_commits_models_from_record_directory() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let fast = json!({"epochs": 2, "batch_size": 16, "learning_rate": 0.001});
    std::fs::write(
        &config_path,
        json!({
            "mc_passes": 4,
            "forecaster": fast,
            "classifier": fast,
            "scoring": fast,
            "recommender": fast,
            "boosting": {
                "n_estimators": 3, "max_depth": 2, "learning_rate": 0.1, "lambda": 1.0,
                "min_child_weight": 1.0, "subsample": 1.0, "seed": 42
            }
        })
        .to_string(),
    )
    .unwrap();

    let args = ManagerArgs {
        model_dir: Some(dir.path().join("models")),
        config_path: Some(config_path),
    };
    let quarters = args.config().unwrap().quarters;
    let records = dir.path().join("records");
    write_records(&records, &quarters, 12);

    TrainCommand {
        model: None,
        data: records,
    }
    .run(&args)
    .await
    .unwrap();

    let manager = ModelManager::new(args.config().unwrap()).unwrap();
    assert_eq!(manager.load_all(), 4);
    let status = manager.get_status();
    assert!(status.models.values().all(|m| m.ready && m.version == 1));
}

#[tokio::test]
async fn train_command_fails_on_malformed_records() {
    let dir = tempdir().unwrap();
    let args = ManagerArgs {
        model_dir: Some(dir.path().join("models")),
        config_path: None,
    };
    let records = dir.path().join("records");
    let quarter = records.join(&args.config().unwrap().quarters[0]);
    std::fs::create_dir_all(&quarter).unwrap();
    std::fs::write(quarter.join("population.json"), "not json").unwrap();

    let result = TrainCommand {
        model: Some(ModelKind::SurvivalMlp),
        data: records,
    }
    .run(&args)
    .await;
    assert!(result.is_err());
}
