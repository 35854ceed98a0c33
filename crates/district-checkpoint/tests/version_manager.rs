use district_checkpoint::{VersionConfig, VersionManager};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

fn metrics(samples: u64) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("samples".into(), json!(samples));
    m
}

#[test]
fn test_versions_increase_by_one_per_commit() {
    let dir = tempdir().unwrap();
    let manager = VersionManager::new(VersionConfig::new(dir.path())).unwrap();

    for expected in 1..=4u32 {
        let (path, version) = manager.next_version_dir("sales_lstm").unwrap();
        assert_eq!(version, expected);
        assert!(path.is_dir());
        assert!(path.ends_with(format!("v{expected}")));
        manager.commit_version("sales_lstm", version, metrics(expected as u64)).unwrap();
        assert_eq!(manager.latest_version("sales_lstm").unwrap(), expected);
    }
    assert_eq!(manager.get_metrics("sales_lstm", None).unwrap()["samples"], 4);
    assert_eq!(manager.get_metrics("sales_lstm", Some(2)).unwrap()["samples"], 2);
}

#[test]
fn test_uncommitted_version_leaves_latest_unchanged() {
    let dir = tempdir().unwrap();
    let manager = VersionManager::new(VersionConfig::new(dir.path())).unwrap();

    let (_, v1) = manager.next_version_dir("recommendation").unwrap();
    manager.commit_version("recommendation", v1, metrics(1)).unwrap();

    let (abandoned, v2) = manager.next_version_dir("recommendation").unwrap();
    assert_eq!(v2, 2);
    assert_eq!(manager.latest_version("recommendation").unwrap(), 1);
    assert_eq!(
        manager.latest_version_dir("recommendation").unwrap(),
        Some(dir.path().join("recommendation").join("v1"))
    );

    std::fs::write(abandoned.join("xgb_model.pkl"), "{}").unwrap();

    // the next attempt reuses the abandoned directory, emptied
    let (retry, v2_again) = manager.next_version_dir("recommendation").unwrap();
    assert_eq!((&retry, v2_again), (&abandoned, v2));
    assert!(retry.is_dir());
    assert_eq!(std::fs::read_dir(&retry).unwrap().count(), 0);
}

#[test]
fn test_retention_keeps_newest_versions() {
    let dir = tempdir().unwrap();
    let manager = VersionManager::new(VersionConfig::new(dir.path()).with_max_versions_keep(3)).unwrap();

    for _ in 0..7 {
        let (_, version) = manager.next_version_dir("survival_mlp").unwrap();
        manager.commit_version("survival_mlp", version, Map::new()).unwrap();
        assert!(manager.list_versions("survival_mlp").unwrap().len() <= 3);
    }

    assert_eq!(manager.list_versions("survival_mlp").unwrap(), vec![5, 6, 7]);
    assert_eq!(manager.latest_version("survival_mlp").unwrap(), 7);
    let model_dir = dir.path().join("survival_mlp");
    for removed in 1..=4 {
        assert!(!model_dir.join(format!("v{removed}")).exists());
    }
    for kept in 5..=7 {
        assert!(model_dir.join(format!("v{kept}")).join("metrics.json").exists());
    }
}

#[test]
fn test_metadata_file_layout() {
    let dir = tempdir().unwrap();
    let manager = VersionManager::new(VersionConfig::new(dir.path())).unwrap();
    let (_, version) = manager.next_version_dir("scoring_ensemble").unwrap();
    manager.commit_version("scoring_ensemble", version, Map::new()).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("scoring_ensemble").join("metadata.json")).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value, json!({"latest_version": 1, "versions": [1]}));
}

#[test]
fn test_all_metrics_skips_directories_without_metadata() {
    let dir = tempdir().unwrap();
    let manager = VersionManager::new(VersionConfig::new(dir.path())).unwrap();

    let (_, version) = manager.next_version_dir("sales_lstm").unwrap();
    manager.commit_version("sales_lstm", version, metrics(12)).unwrap();
    // prepared but never committed
    manager.next_version_dir("recommendation").unwrap();
    std::fs::create_dir_all(dir.path().join("stray")).unwrap();

    let all = manager.get_all_metrics().unwrap();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["sales_lstm"]);
    assert_eq!(all["sales_lstm"].metrics["samples"], 12);
}
