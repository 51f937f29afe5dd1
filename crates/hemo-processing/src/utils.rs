//! Shared utilities for the hemovigilance pipeline.
//!
//! Small series helpers used by the normalizer, the feature transformer
//! and the filter engine.

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Markers that mean "no value" in the published files.
const MISSING_MARKERS: &[&str] = &["", "nan", "null", "none", "n/a", "na", "-"];

/// Check if a string is a missing-value marker.
pub fn is_missing_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

/// Parse a number written with either decimal separator.
///
/// The published files use a comma as decimal separator, so `"42,5"` and
/// `"42.5"` both parse to `42.5`. Thousands separators are not expected.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if is_missing_marker(trimmed) {
        return None;
    }
    let normalized = trimmed.replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Series Access Utilities
// =============================================================================

/// Read any column as `Option<String>` per row, formatting non-string values.
pub fn series_to_strings(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    if let Ok(ca) = series.str() {
        return Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect());
    }
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Read any column as `Option<f64>` per row.
///
/// String columns are parsed with [`parse_decimal`]; numeric columns are cast.
pub fn series_to_f64(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    if let Ok(ca) = series.str() {
        return Ok(ca.into_iter().map(|v| v.and_then(parse_decimal)).collect());
    }
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Read a datetime column as naive timestamps per row.
///
/// Non-datetime columns yield all `None`.
pub fn series_to_datetimes(series: &Series) -> PolarsResult<Vec<Option<NaiveDateTime>>> {
    let unit = match series.dtype() {
        DataType::Datetime(unit, _) => *unit,
        _ => return Ok(vec![None; series.len()]),
    };
    let physical = series.cast(&DataType::Int64)?;
    Ok(physical
        .i64()?
        .into_iter()
        .map(|v| v.and_then(|raw| timestamp_to_datetime(raw, unit)))
        .collect())
}

/// Convert a raw timestamp in the given unit to a naive datetime.
pub fn timestamp_to_datetime(raw: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let millis = match unit {
        TimeUnit::Milliseconds => raw,
        TimeUnit::Microseconds => raw.div_euclid(1_000),
        TimeUnit::Nanoseconds => raw.div_euclid(1_000_000),
    };
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Build a millisecond datetime series from naive timestamps.
pub fn datetimes_to_series(name: &str, values: &[Option<NaiveDateTime>]) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = values
        .iter()
        .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
        .collect();
    Series::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Median of the present values; `None` when every value is missing.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.total_cmp(b));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
