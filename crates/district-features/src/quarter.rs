//! Quarter codes.
//!
//! The upstream feed identifies quarters as `"YYYYQ"` strings such as
//! `"20253"`. Forecast output uses the human-readable `"YYYY-Qn"` form.

use once_cell::sync::Lazy;
use regex::Regex;

static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})([1-4])$").expect("valid quarter regex"));

/// The default eight-quarter training window, oldest first.
pub const DEFAULT_QUARTERS: [&str; 8] = [
    "20234", "20241", "20242", "20243", "20244", "20251", "20252", "20253",
];

/// Default quarter window as owned strings.
pub fn default_quarters() -> Vec<String> {
    DEFAULT_QUARTERS.iter().map(|q| q.to_string()).collect()
}

/// Splits a `"YYYYQ"` code into year and quarter.
///
/// # Example
///
/// ```
/// use district_features::quarter::parse_quarter;
///
/// assert_eq!(parse_quarter("20253"), Some((2025, 3)));
/// assert_eq!(parse_quarter("20255"), None);
/// assert_eq!(parse_quarter("2025-Q3"), None);
/// ```
pub fn parse_quarter(code: &str) -> Option<(i32, u32)> {
    let caps = QUARTER_RE.captures(code.trim())?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let quarter = caps.get(2)?.as_str().parse().ok()?;
    Some((year, quarter))
}

/// Returns `"YYYY-Qn"` labels for the `count` quarters following `last`.
///
/// An unparsable `last` yields no labels.
///
/// # Example
///
/// ```
/// use district_features::quarter::next_quarter_labels;
///
/// assert_eq!(
///     next_quarter_labels("20253", 4),
///     vec!["2025-Q4", "2026-Q1", "2026-Q2", "2026-Q3"]
/// );
/// ```
pub fn next_quarter_labels(last: &str, count: usize) -> Vec<String> {
    let Some((year, quarter)) = parse_quarter(last) else {
        return Vec::new();
    };
    (0..count as u32)
        .map(|step| {
            let offset = quarter + step;
            let next_quarter = offset % 4 + 1;
            let next_year = year + (offset / 4) as i32;
            format!("{next_year}-Q{next_quarter}")
        })
        .collect()
}
