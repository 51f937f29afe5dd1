//! Type conversion functions for column normalization.

use crate::utils::{datetimes_to_series, series_to_f64};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// Timestamp layouts tried in order; day-first layouts come first.
const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Date-only layouts, read as midnight.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parse a timestamp, reading ambiguous `a/b/yyyy` values as day/month.
pub fn parse_day_first(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Convert a string series to millisecond datetimes.
///
/// Unparseable values become null. Returns `None` when no value parses, in
/// which case the caller keeps the original column.
pub(crate) fn string_to_datetime(series: &Series) -> PolarsResult<Option<Series>> {
    let str_series = series.str()?;
    let parsed: Vec<Option<NaiveDateTime>> = str_series
        .into_iter()
        .map(|opt| opt.and_then(parse_day_first))
        .collect();

    if parsed.iter().all(Option::is_none) {
        return Ok(None);
    }
    datetimes_to_series(series.name().as_str(), &parsed).map(Some)
}

/// Coerce an anomaly label column to `Int32` in {0, 1}.
///
/// Missing cells stay null so the loader can tell an unscored column from a
/// scored one. Non-numeric values read as 0; any non-zero number reads as 1.
pub(crate) fn label_to_int32(series: &Series) -> PolarsResult<Series> {
    let missing = series.is_null();
    let labels: Vec<Option<i32>> = series_to_f64(series)?
        .into_iter()
        .zip(missing.into_iter())
        .map(|(v, is_null)| match (v, is_null) {
            (_, Some(true)) => None,
            (Some(x), _) if x != 0.0 => Some(1),
            _ => Some(0),
        })
        .collect();
    Ok(Series::new(series.name().clone(), labels))
}

/// Trim string cells and turn blank cells into nulls.
pub(crate) fn trim_blank_to_null(series: &Series) -> PolarsResult<Series> {
    let str_series = series.str()?;
    let cleaned: Vec<Option<&str>> = str_series
        .into_iter()
        .map(|opt| opt.map(str::trim).filter(|s| !s.is_empty()))
        .collect();
    Ok(Series::new(series.name().clone(), cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::series_to_datetimes;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_day_first_formats() {
        assert_eq!(parse_day_first("04/03/2021"), Some(dt(2021, 3, 4, 0, 0, 0)));
        assert_eq!(
            parse_day_first("04/03/2021 13:45"),
            Some(dt(2021, 3, 4, 13, 45, 0))
        );
        assert_eq!(
            parse_day_first(" 31/12/2019 23:59:59 "),
            Some(dt(2019, 12, 31, 23, 59, 59))
        );
        assert_eq!(
            parse_day_first("2020-07-01 08:00:00"),
            Some(dt(2020, 7, 1, 8, 0, 0))
        );
    }

    #[test]
    fn test_parse_day_first_rejects_garbage() {
        assert_eq!(parse_day_first("31/02/2020"), None);
        assert_eq!(parse_day_first("ontem"), None);
        assert_eq!(parse_day_first(""), None);
    }

    #[test]
    fn test_string_to_datetime_coerces_bad_values_to_null() {
        let series = Series::new("DATA".into(), &[Some("01/02/2020"), Some("xx"), None]);
        let converted = string_to_datetime(&series).unwrap().unwrap();
        let values = series_to_datetimes(&converted).unwrap();
        assert_eq!(values, vec![Some(dt(2020, 2, 1, 0, 0, 0)), None, None]);
    }

    #[test]
    fn test_string_to_datetime_all_unparseable() {
        let series = Series::new("DATA".into(), &["a", "b"]);
        assert!(string_to_datetime(&series).unwrap().is_none());
    }

    #[test]
    fn test_label_to_int32() {
        let series = Series::new("ANOMALIAS".into(), &[Some("1"), Some("0"), Some("x"), None]);
        let labels = label_to_int32(&series).unwrap();
        assert_eq!(labels.dtype(), &DataType::Int32);
        let values: Vec<Option<i32>> = labels.i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(0), Some(0), None]);
    }

    #[test]
    fn test_trim_blank_to_null() {
        let series = Series::new("UF".into(), &[Some(" SP "), Some("   "), None]);
        let cleaned = trim_blank_to_null(&series).unwrap();
        let values: Vec<Option<&str>> = cleaned.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("SP"), None, None]);
    }
}
