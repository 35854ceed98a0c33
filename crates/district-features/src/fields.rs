//! Field catalogs and tolerant parsing of raw district records.
//!
//! A raw record is one JSON object from the upstream district statistics
//! feed. Records carry the location code in `TRDAR_CD` and the business
//! category in `SVC_INDUTY_CD`; every numeric column may arrive as a number,
//! a numeric string, an empty string, `"null"` or not at all.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// One upstream record.
pub type RawRecord = Map<String, Value>;

/// Records grouped by quarter code (`"YYYYQ"`).
pub type RecordsByQuarter = HashMap<String, Vec<RawRecord>>;

/// Location code column.
pub const AREA_CODE_FIELD: &str = "TRDAR_CD";
/// Business category column.
pub const CATEGORY_FIELD: &str = "SVC_INDUTY_CD";
/// Monthly revenue column used as the forecasting and recommendation target.
pub const REVENUE_FIELD: &str = "THSMON_SELNG_AMT";
/// Total store count column.
pub const STORE_COUNT_FIELD: &str = "STOR_CO";
/// Closed store count column.
pub const CLOSED_STORE_FIELD: &str = "CLSBIZ_STOR_CO";

/// Floating population by time band.
pub const POP_TIME_FIELDS: [&str; 6] = [
    "TMZON_1_FLPOP_CO",
    "TMZON_2_FLPOP_CO",
    "TMZON_3_FLPOP_CO",
    "TMZON_4_FLPOP_CO",
    "TMZON_5_FLPOP_CO",
    "TMZON_6_FLPOP_CO",
];

/// Floating population by weekday.
pub const POP_DAY_FIELDS: [&str; 7] = [
    "MON_FLPOP_CO",
    "TUES_FLPOP_CO",
    "WED_FLPOP_CO",
    "THUR_FLPOP_CO",
    "FRI_FLPOP_CO",
    "SAT_FLPOP_CO",
    "SUN_FLPOP_CO",
];

/// Floating population by age bracket.
pub const POP_AGE_FIELDS: [&str; 6] = [
    "AGRDE_10_FLPOP_CO",
    "AGRDE_20_FLPOP_CO",
    "AGRDE_30_FLPOP_CO",
    "AGRDE_40_FLPOP_CO",
    "AGRDE_50_FLPOP_CO",
    "AGRDE_60_ABOVE_FLPOP_CO",
];

/// Sales by time band.
pub const SALES_TIME_FIELDS: [&str; 6] = [
    "TMZON_1_SELNG_AMT",
    "TMZON_2_SELNG_AMT",
    "TMZON_3_SELNG_AMT",
    "TMZON_4_SELNG_AMT",
    "TMZON_5_SELNG_AMT",
    "TMZON_6_SELNG_AMT",
];

/// Sales by weekday.
pub const SALES_DAY_FIELDS: [&str; 7] = [
    "MON_SELNG_AMT",
    "TUES_SELNG_AMT",
    "WED_SELNG_AMT",
    "THUR_SELNG_AMT",
    "FRI_SELNG_AMT",
    "SAT_SELNG_AMT",
    "SUN_SELNG_AMT",
];

/// Sales by age bracket.
pub const SALES_AGE_FIELDS: [&str; 6] = [
    "AGRDE_10_SELNG_AMT",
    "AGRDE_20_SELNG_AMT",
    "AGRDE_30_SELNG_AMT",
    "AGRDE_40_SELNG_AMT",
    "AGRDE_50_SELNG_AMT",
    "AGRDE_60_ABOVE_SELNG_AMT",
];

/// Store counts.
pub const STORE_FIELDS: [&str; 4] = [
    STORE_COUNT_FIELD,
    "SIMILR_INDUTY_STOR_CO",
    "OPBIZ_STOR_CO",
    CLOSED_STORE_FIELD,
];

/// Nearby facility counts.
pub const FACILITY_FIELDS: [&str; 13] = [
    "SUBWAY_STATN_CO",
    "BUS_STTN_CO",
    "ELESCH_CO",
    "MSKUL_CO",
    "HGSCHL_CO",
    "UNIV_CO",
    "GNRL_HSPTL_CO",
    "GEHSPT_CO",
    "VIATR_FCLTY_CO",
    "SUPMK_CO",
    "THEAT_CO",
    "STAYNG_FCLTY_CO",
    "BANK_CO",
];

/// Business categories scored by the recommender, in embedding index order.
pub const CATEGORY_CODES: [&str; 15] = [
    "CS100001", "CS100002", "CS100003", "CS100004", "CS100005", "CS100006", "CS100007",
    "CS100008", "CS100009", "CS100010", "CS200001", "CS200002", "CS200003", "CS200004",
    "CS200005",
];

/// Number of recommender categories.
pub const NUM_CATEGORIES: usize = CATEGORY_CODES.len();

/// Width of one per-quarter time-series row.
pub const NUM_TIMESERIES_FEATURES: usize = POP_TIME_FIELDS.len()
    + POP_DAY_FIELDS.len()
    + POP_AGE_FIELDS.len()
    + SALES_TIME_FIELDS.len()
    + SALES_DAY_FIELDS.len()
    + SALES_AGE_FIELDS.len()
    + STORE_FIELDS.len();

/// Number of trailing context scalars: year, quarter, latitude, longitude.
pub const NUM_CONTEXT_FEATURES: usize = 4;

/// Width of a static feature vector.
pub const NUM_STATIC_FEATURES: usize =
    NUM_TIMESERIES_FEATURES + FACILITY_FIELDS.len() + NUM_CONTEXT_FEATURES;

/// Number of quarters the forecaster predicts.
pub const OUTPUT_STEPS: usize = 4;

/// Column range of the sales-by-time-band group inside a time-series row.
pub const SALES_TIME_RANGE: std::ops::Range<usize> = {
    let start = POP_TIME_FIELDS.len() + POP_DAY_FIELDS.len() + POP_AGE_FIELDS.len();
    start..start + SALES_TIME_FIELDS.len()
};

/// The column groups of a time-series row, in slot order.
pub(crate) const TIMESERIES_GROUPS: [(Source, &[&str]); 7] = [
    (Source::Population, &POP_TIME_FIELDS),
    (Source::Population, &POP_DAY_FIELDS),
    (Source::Population, &POP_AGE_FIELDS),
    (Source::Sales, &SALES_TIME_FIELDS),
    (Source::Sales, &SALES_DAY_FIELDS),
    (Source::Sales, &SALES_AGE_FIELDS),
    (Source::Stores, &STORE_FIELDS),
];

/// Which record set a column group is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Population,
    Sales,
    Stores,
}

/// Parses a numeric cell the way the upstream feed needs.
///
/// Missing, `null`, `""` and `"null"` count as 0. Everything else is parsed
/// as a float and truncated toward zero; values that do not parse also
/// count as 0.
///
/// # Example
///
/// ```
/// use district_features::fields::safe_int;
/// use serde_json::json;
///
/// assert_eq!(safe_int(Some(&json!("12.9"))), 12);
/// assert_eq!(safe_int(Some(&json!(-3.7))), -3);
/// assert_eq!(safe_int(Some(&json!("null"))), 0);
/// assert_eq!(safe_int(Some(&json!("abc"))), 0);
/// assert_eq!(safe_int(None), 0);
/// ```
pub fn safe_int(value: Option<&Value>) -> i64 {
    let parsed = match value {
        None | Some(Value::Null) => return 0,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                return 0;
            }
            s.parse::<f64>().ok()
        }
        Some(_) => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v.trunc() as i64,
        _ => 0,
    }
}

/// Returns a code column in string form; numbers are stringified and a
/// missing column yields an empty string.
pub fn record_code(record: &RawRecord, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Location code of a record.
pub fn area_code(record: &RawRecord) -> String {
    record_code(record, AREA_CODE_FIELD)
}

/// Sums `field` with [`safe_int`] over `rows`.
pub fn sum_field<'a, I>(rows: I, field: &str) -> i64
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    rows.into_iter().map(|r| safe_int(r.get(field))).sum()
}

/// Per-field sums over `rows`, in `fields` order.
pub fn sum_fields(rows: &[&RawRecord], fields: &[&str]) -> Vec<f32> {
    fields
        .iter()
        .map(|f| sum_field(rows.iter().copied(), f) as f32)
        .collect()
}

/// Rows whose location code equals `code`.
pub fn rows_for_area<'a>(records: &'a [RawRecord], code: &str) -> Vec<&'a RawRecord> {
    records.iter().filter(|r| area_code(r) == code).collect()
}

/// Embedding index of a category code.
pub fn category_index(code: &str) -> Option<usize> {
    CATEGORY_CODES.iter().position(|c| *c == code)
}
