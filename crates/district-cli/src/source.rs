//! Record source backed by a directory of JSON files.

use async_trait::async_trait;
use district_features::RawRecord;
use district_serving::{DataSource, DataSourceError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads `<root>/<quarter>/<set>.json`, each file a JSON array of objects.
///
/// A missing file is an empty record set.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, quarter: &str, set: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        let path = self.root.join(quarter).join(format!("{set}.json"));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(quarter, set, path = %path.display(), "Record file missing");
                return Ok(Vec::new());
            }
            Err(source) => return Err(DataSourceError::Io { path, source }),
        };
        let records: Vec<RawRecord> =
            serde_json::from_str(&text).map_err(|source| DataSourceError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(quarter, set, records = records.len(), "Read records");
        Ok(records)
    }
}

#[async_trait]
impl DataSource for JsonDirSource {
    async fn population(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.read(quarter, "population").await
    }

    async fn sales(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.read(quarter, "sales").await
    }

    async fn stores(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.read(quarter, "stores").await
    }

    async fn facilities(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
        self.read(quarter, "facilities").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_records_by_quarter() {
        let dir = tempdir().unwrap();
        let quarter = dir.path().join("20253");
        std::fs::create_dir_all(&quarter).unwrap();
        std::fs::write(
            quarter.join("sales.json"),
            r#"[{"TRDAR_CD": "3110008", "THSMON_SELNG_AMT": 1200}, {"TRDAR_CD": 3110009}]"#,
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path());
        let sales = source.sales("20253").await.unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0]["THSMON_SELNG_AMT"], 1200);

        assert!(source.population("20253").await.unwrap().is_empty());
        assert!(source.stores("20241").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let quarter = dir.path().join("20253");
        std::fs::create_dir_all(&quarter).unwrap();
        std::fs::write(quarter.join("stores.json"), r#"{"TRDAR_CD": "1"}"#).unwrap();

        let err = JsonDirSource::new(dir.path()).stores("20253").await.unwrap_err();
        assert!(matches!(err, DataSourceError::Parse { .. }));
    }
}
