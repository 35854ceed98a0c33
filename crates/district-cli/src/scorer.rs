//! Rule-based location scorer supplying the scoring family's labels.
//!
//! Each component ranks a location against every other location of the
//! quarter and lands in 0..=100; the total is their weighted sum truncated
//! to an integer.

use district_features::fields::{
    area_code, rows_for_area, safe_int, sum_field, CLOSED_STORE_FIELD, POP_TIME_FIELDS,
    REVENUE_FIELD, STORE_COUNT_FIELD,
};
use district_features::RawRecord;
use district_serving::{LocationScore, LocationScorer, QuarterSnapshot};
use std::collections::{BTreeMap, BTreeSet};

const SIMILAR_STORE_FIELD: &str = "SIMILR_INDUTY_STOR_CO";
const OPENED_STORE_FIELD: &str = "OPBIZ_STOR_CO";

/// Score of a component with no basis for comparison.
const NEUTRAL: f64 = 50.0;

/// Component weights in a total score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Floating population rank
    pub population: f64,
    /// Revenue rank
    pub sales: f64,
    /// Inverse rank of similar-store density
    pub competition: f64,
    /// Opening to closing ratio rank
    pub growth: f64,
    /// Low closure rate
    pub stability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            population: 0.30,
            sales: 0.30,
            competition: 0.15,
            growth: 0.15,
            stability: 0.10,
        }
    }
}

/// Percentile-based [`LocationScorer`].
#[derive(Debug, Clone, Default)]
pub struct PercentileScorer {
    weights: ScoreWeights,
}

impl PercentileScorer {
    /// Create a scorer with default weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the component weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Share of `all` strictly below `value`, in percent; neutral when there is
/// nothing to compare or `value` is not positive.
fn percentile(value: f64, all: &[f64]) -> f64 {
    if all.is_empty() || value <= 0.0 {
        return NEUTRAL;
    }
    all.iter().filter(|&&v| v < value).count() as f64 / all.len() as f64 * 100.0
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0).trunc()
}

/// Mean of the positive values of `field`.
fn positive_mean(rows: &[&RawRecord], field: &str) -> f64 {
    let values: Vec<f64> = positive_values(rows.iter().copied(), field);
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn positive_values<'a>(rows: impl IntoIterator<Item = &'a RawRecord>, field: &str) -> Vec<f64> {
    rows.into_iter()
        .map(|r| safe_int(r.get(field)) as f64)
        .filter(|&v| v > 0.0)
        .collect()
}

fn population_of(rows: &[&RawRecord]) -> f64 {
    POP_TIME_FIELDS
        .iter()
        .map(|f| sum_field(rows.iter().copied(), f) as f64)
        .sum()
}

impl LocationScorer for PercentileScorer {
    fn score(&self, code: &str, snapshot: &QuarterSnapshot<'_>) -> LocationScore {
        let pop = rows_for_area(snapshot.population, code);
        let sales = rows_for_area(snapshot.sales, code);
        let stores = rows_for_area(snapshot.stores, code);

        let codes: BTreeSet<String> = snapshot.population.iter().map(area_code).collect();
        let all_pop: Vec<f64> = codes
            .iter()
            .map(|c| population_of(&rows_for_area(snapshot.population, c)))
            .filter(|&v| v > 0.0)
            .collect();
        let population = percentile(population_of(&pop), &all_pop);

        let all_sales = positive_values(snapshot.sales, REVENUE_FIELD);
        let revenue = percentile(positive_mean(&sales, REVENUE_FIELD), &all_sales);

        let all_similar = positive_values(snapshot.stores, SIMILAR_STORE_FIELD);
        let competition = 100.0 - percentile(positive_mean(&stores, SIMILAR_STORE_FIELD), &all_similar);

        let opened = sum_field(stores.iter().copied(), OPENED_STORE_FIELD) as f64;
        let closed = sum_field(stores.iter().copied(), CLOSED_STORE_FIELD) as f64;
        let all_growth: Vec<f64> = snapshot
            .stores
            .iter()
            .filter_map(|r| {
                let closed = safe_int(r.get(CLOSED_STORE_FIELD));
                (closed > 0).then(|| safe_int(r.get(OPENED_STORE_FIELD)) as f64 / closed as f64)
            })
            .collect();
        let growth = if all_growth.is_empty() {
            NEUTRAL
        } else {
            percentile(opened / closed.max(1.0), &all_growth)
        };

        let total_stores = positive_mean(&stores, STORE_COUNT_FIELD) * stores.len().max(1) as f64;
        let close_rate = closed / total_stores.max(1.0);
        let stability = 100.0 - close_rate * 500.0;

        let w = self.weights;
        let breakdown = BTreeMap::from([
            ("population".to_string(), clamp_score(population)),
            ("sales".to_string(), clamp_score(revenue)),
            ("competition".to_string(), clamp_score(competition)),
            ("growth".to_string(), clamp_score(growth)),
            ("stability".to_string(), clamp_score(stability)),
        ]);
        let total = breakdown["population"] * w.population
            + breakdown["sales"] * w.sales
            + breakdown["competition"] * w.competition
            + breakdown["growth"] * w.growth
            + breakdown["stability"] * w.stability;

        LocationScore {
            total_score: clamp_score(total),
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_percentile() {
        assert_eq!(percentile(5.0, &[]), NEUTRAL);
        assert_eq!(percentile(0.0, &[1.0, 2.0]), NEUTRAL);
        assert_eq!(percentile(3.0, &[1.0, 2.0, 3.0, 4.0]), 50.0);
        assert_eq!(percentile(10.0, &[1.0, 2.0]), 100.0);
    }

    #[test]
    fn test_busier_location_scores_higher() {
        let population = vec![
            record(json!({"TRDAR_CD": "A", "TMZON_1_FLPOP_CO": 9000})),
            record(json!({"TRDAR_CD": "B", "TMZON_1_FLPOP_CO": 100})),
            record(json!({"TRDAR_CD": "C", "TMZON_1_FLPOP_CO": 500})),
        ];
        let sales = vec![
            record(json!({"TRDAR_CD": "A", "THSMON_SELNG_AMT": 900000})),
            record(json!({"TRDAR_CD": "B", "THSMON_SELNG_AMT": 1000})),
            record(json!({"TRDAR_CD": "C", "THSMON_SELNG_AMT": 5000})),
        ];
        let stores = vec![
            record(json!({"TRDAR_CD": "A", "STOR_CO": 10, "OPBIZ_STOR_CO": 3, "CLSBIZ_STOR_CO": 1})),
            record(json!({"TRDAR_CD": "B", "STOR_CO": 50, "OPBIZ_STOR_CO": 0, "CLSBIZ_STOR_CO": 2})),
        ];
        let snapshot = QuarterSnapshot::new(&population, &sales, &stores);
        let scorer = PercentileScorer::new();

        let a = scorer.score("A", &snapshot);
        let b = scorer.score("B", &snapshot);
        assert!(a.total_score > b.total_score);
        assert_eq!(a.total_score, a.total_score.trunc());
        assert!((0.0..=100.0).contains(&a.total_score));
        assert_eq!(a.breakdown.len(), 5);
        assert_eq!(b.breakdown["stability"], 80.0);
    }

    #[test]
    fn test_unknown_location_is_neutral() {
        let snapshot = QuarterSnapshot::default();
        let score = PercentileScorer::new().score("nowhere", &snapshot);
        assert_eq!(score.breakdown["population"], NEUTRAL);
        assert_eq!(score.breakdown["stability"], 100.0);
        assert!((0.0..=100.0).contains(&score.total_score));
    }
}
