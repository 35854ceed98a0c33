//! Raw district records to model inputs.
//!
//! Static vectors describe one location in one quarter and are
//! [`NUM_STATIC_FEATURES`] wide. Time-series rows cover the first
//! [`NUM_TIMESERIES_FEATURES`] slots of a static vector, one row per quarter.

use crate::fields::{
    rows_for_area, sum_field, sum_fields, RawRecord, RecordsByQuarter, Source, CATEGORY_FIELD,
    FACILITY_FIELDS, NUM_STATIC_FEATURES, NUM_TIMESERIES_FEATURES, REVENUE_FIELD,
    TIMESERIES_GROUPS,
};
use crate::fields::{area_code, record_code};
use district_layers::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The record sets of a single quarter.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuarterRecords<'a> {
    /// Floating population records.
    pub population: &'a [RawRecord],
    /// Sales records, one per location and category.
    pub sales: &'a [RawRecord],
    /// Store count records, one per location and category.
    pub stores: &'a [RawRecord],
    /// Facility records. `None` leaves the facility slots at zero.
    pub facilities: Option<&'a [RawRecord]>,
}

impl<'a> QuarterRecords<'a> {
    /// Bundles the three required record sets.
    pub fn new(population: &'a [RawRecord], sales: &'a [RawRecord], stores: &'a [RawRecord]) -> Self {
        Self {
            population,
            sales,
            stores,
            facilities: None,
        }
    }

    /// Adds facility records.
    pub fn with_facilities(mut self, facilities: &'a [RawRecord]) -> Self {
        self.facilities = Some(facilities);
        self
    }
}

/// The four trailing scalars of a static vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticContext {
    /// Calendar year.
    pub year: i32,
    /// Quarter of the year, 1 to 4.
    pub quarter: u32,
    /// Latitude of the location.
    pub latitude: f64,
    /// Longitude of the location.
    pub longitude: f64,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self {
            year: 2025,
            quarter: 3,
            latitude: 37.5665,
            longitude: 126.978,
        }
    }
}

impl StaticContext {
    /// Replaces the coordinates.
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    fn as_slots(&self) -> [f32; 4] {
        [
            self.year as f32,
            self.quarter as f32,
            self.latitude as f32,
            self.longitude as f32,
        ]
    }
}

/// Converts raw records into feature vectors.
///
/// Extraction is total: missing fields and unparsable values count as zero,
/// and a location with no rows yields zeros.
///
/// # Example
///
/// ```
/// use district_features::extractor::{FeatureExtractor, QuarterRecords, StaticContext};
/// use district_features::fields::NUM_STATIC_FEATURES;
///
/// let extractor = FeatureExtractor::new();
/// let features = extractor.extract_static(
///     "3110008",
///     QuarterRecords::default(),
///     &StaticContext::default(),
/// );
/// assert_eq!(features.len(), NUM_STATIC_FEATURES);
/// assert_eq!(features[NUM_STATIC_FEATURES - 4], 2025.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Creates an extractor.
    pub fn new() -> Self {
        Self
    }

    /// Builds the static feature vector of `code`.
    pub fn extract_static(
        &self,
        code: &str,
        records: QuarterRecords<'_>,
        context: &StaticContext,
    ) -> Vec<f32> {
        let mut features = Vec::with_capacity(NUM_STATIC_FEATURES);
        features.extend(self.timeseries_row(code, records));
        match records.facilities {
            Some(facilities) if !facilities.is_empty() => {
                let area = rows_for_area(facilities, code);
                features.extend(sum_fields(&area, &FACILITY_FIELDS));
            }
            _ => features.extend(std::iter::repeat(0.0).take(FACILITY_FIELDS.len())),
        }
        features.extend(context.as_slots());
        features
    }

    /// Builds one [`NUM_TIMESERIES_FEATURES`]-wide row per quarter in
    /// `quarters`, in the given order. Quarters absent from the maps give
    /// zero rows.
    pub fn extract_timeseries(
        &self,
        code: &str,
        population_by_quarter: &RecordsByQuarter,
        sales_by_quarter: &RecordsByQuarter,
        stores_by_quarter: &RecordsByQuarter,
        quarters: &[String],
    ) -> Vec<Vec<f32>> {
        quarters
            .iter()
            .map(|q| {
                let records = QuarterRecords::new(
                    records_of(population_by_quarter, q),
                    records_of(sales_by_quarter, q),
                    records_of(stores_by_quarter, q),
                );
                self.timeseries_row(code, records)
            })
            .collect()
    }

    /// Total monthly revenue of `category` at `code`, one value per quarter.
    pub fn extract_target_sales(
        &self,
        code: &str,
        category: &str,
        sales_by_quarter: &RecordsByQuarter,
        quarters: &[String],
    ) -> Vec<f32> {
        quarters
            .iter()
            .map(|q| {
                let rows = records_of(sales_by_quarter, q)
                    .iter()
                    .filter(|r| area_code(r) == code && record_code(r, CATEGORY_FIELD) == category);
                sum_field(rows, REVENUE_FIELD) as f32
            })
            .collect()
    }

    /// Static vectors for many locations as an `[N, NUM_STATIC_FEATURES]`
    /// tensor in input order.
    ///
    /// Locations present in `coordinates` use their own latitude and
    /// longitude; the rest keep the ones in `context`.
    pub fn extract_batch_static(
        &self,
        codes: &[String],
        records: QuarterRecords<'_>,
        context: &StaticContext,
        coordinates: Option<&HashMap<String, (f64, f64)>>,
    ) -> Tensor {
        let rows: Vec<Vec<f32>> = codes
            .par_iter()
            .map(|code| {
                let ctx = match coordinates.and_then(|c| c.get(code)) {
                    Some(&(lat, lng)) => context.with_coordinates(lat, lng),
                    None => *context,
                };
                self.extract_static(code, records, &ctx)
            })
            .collect();
        let mut data = Vec::with_capacity(rows.len() * NUM_STATIC_FEATURES);
        for row in &rows {
            data.extend_from_slice(row);
        }
        Tensor::from_data(&[rows.len(), NUM_STATIC_FEATURES], data)
    }

    fn timeseries_row(&self, code: &str, records: QuarterRecords<'_>) -> Vec<f32> {
        let population = rows_for_area(records.population, code);
        let sales = rows_for_area(records.sales, code);
        let stores = rows_for_area(records.stores, code);

        let mut row = Vec::with_capacity(NUM_TIMESERIES_FEATURES);
        for (source, fields) in TIMESERIES_GROUPS {
            let rows = match source {
                Source::Population => &population,
                Source::Sales => &sales,
                Source::Stores => &stores,
            };
            row.extend(sum_fields(rows, fields));
        }
        row
    }
}

fn records_of<'a>(by_quarter: &'a RecordsByQuarter, quarter: &str) -> &'a [RawRecord] {
    by_quarter.get(quarter).map(Vec::as_slice).unwrap_or(&[])
}
