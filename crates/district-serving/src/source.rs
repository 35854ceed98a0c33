//! Collaborators the manager consumes: the record source and the rule-based
//! location scorer used for score labels.

use crate::error::DataSourceError;
use async_trait::async_trait;
use district_features::fields::area_code;
use district_features::{QuarterRecords, RawRecord, RecordsByQuarter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Asynchronous supplier of per-quarter raw records.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Floating population records of `quarter`.
    async fn population(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError>;

    /// Sales records of `quarter`.
    async fn sales(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError>;

    /// Store count records of `quarter`.
    async fn stores(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError>;

    /// Facility records of `quarter`.
    async fn facilities(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError>;
}

/// The record sets of one quarter, borrowed by a [`LocationScorer`].
pub type QuarterSnapshot<'a> = QuarterRecords<'a>;

/// A rule-based location score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationScore {
    /// Overall score, 0 to 100
    pub total_score: f64,
    /// Named components of the score
    pub breakdown: BTreeMap<String, f64>,
}

/// Scores a location from its quarter records; supplies the scoring
/// family's training labels.
pub trait LocationScorer: Send + Sync {
    /// Scores the location `code`.
    fn score(&self, code: &str, snapshot: &QuarterSnapshot<'_>) -> LocationScore;
}

/// Every record a training run needs.
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    /// Quarter window, oldest first
    pub quarters: Vec<String>,
    /// Population records by quarter
    pub pop_by_q: RecordsByQuarter,
    /// Sales records by quarter
    pub sales_by_q: RecordsByQuarter,
    /// Store records by quarter
    pub stores_by_q: RecordsByQuarter,
    /// Facility records of the latest quarter
    pub facilities: Vec<RawRecord>,
    /// Sorted unique non-empty location codes seen in population records
    pub area_codes: Vec<String>,
}

impl CollectedData {
    /// Fetches the window's records from `source`.
    ///
    /// Facilities are fetched for the latest quarter only.
    pub async fn collect(source: &dyn DataSource, quarters: &[String]) -> Result<Self, DataSourceError> {
        let mut data = Self {
            quarters: quarters.to_vec(),
            ..Self::default()
        };
        for quarter in quarters {
            data.pop_by_q.insert(quarter.clone(), source.population(quarter).await?);
            data.sales_by_q.insert(quarter.clone(), source.sales(quarter).await?);
            data.stores_by_q.insert(quarter.clone(), source.stores(quarter).await?);
        }
        if let Some(latest) = quarters.last() {
            data.facilities = source.facilities(latest).await?;
        }

        let codes: BTreeSet<String> = data
            .pop_by_q
            .values()
            .flatten()
            .map(area_code)
            .filter(|c| !c.is_empty())
            .collect();
        data.area_codes = codes.into_iter().collect();

        tracing::info!(
            quarters = data.quarters.len(),
            areas = data.area_codes.len(),
            facilities = data.facilities.len(),
            "Collected training data"
        );
        Ok(data)
    }

    /// Record sets of the latest quarter, facilities included.
    pub fn latest(&self) -> QuarterRecords<'_> {
        let quarter = self.quarters.last().map(String::as_str).unwrap_or_default();
        QuarterRecords::new(
            records_of(&self.pop_by_q, quarter),
            records_of(&self.sales_by_q, quarter),
            records_of(&self.stores_by_q, quarter),
        )
        .with_facilities(&self.facilities)
    }
}

fn records_of<'a>(by_quarter: &'a RecordsByQuarter, quarter: &str) -> &'a [RawRecord] {
    by_quarter.get(quarter).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed;

    fn rec(code: serde_json::Value) -> RawRecord {
        let mut r = RawRecord::new();
        r.insert("TRDAR_CD".into(), code);
        r
    }

    #[async_trait]
    impl DataSource for Fixed {
        async fn population(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
            Ok(match quarter {
                "20252" => vec![rec(json!("B")), rec(json!(""))],
                _ => vec![rec(json!(1001)), rec(json!("B"))],
            })
        }
        async fn sales(&self, _quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
            Ok(vec![])
        }
        async fn stores(&self, _quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
            Ok(vec![])
        }
        async fn facilities(&self, quarter: &str) -> Result<Vec<RawRecord>, DataSourceError> {
            Ok(vec![rec(json!(quarter))])
        }
    }

    #[tokio::test]
    async fn test_collect_area_codes_and_facilities() {
        let quarters = vec!["20252".to_string(), "20253".to_string()];
        let data = CollectedData::collect(&Fixed, &quarters).await.unwrap();
        assert_eq!(data.area_codes, vec!["1001", "B"]);
        assert_eq!(data.facilities.len(), 1);
        assert_eq!(data.facilities[0]["TRDAR_CD"], "20253");
        assert_eq!(data.latest().population.len(), 2);
        assert_eq!(data.latest().facilities.map(|f| f.len()), Some(1));
    }
}
