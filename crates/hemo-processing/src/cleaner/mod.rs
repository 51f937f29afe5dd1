//! Column normalization for raw dataset tables.
//!
//! This module turns a freshly parsed table into the canonical shape the
//! rest of the pipeline expects:
//! - Upper-case, trimmed headers
//! - Trimmed string cells with blanks as nulls
//! - Day-first parsed date columns
//! - Derived `YEAR` / `MONTH` columns and an inconsistent-dates flag
//! - An `Int32` anomaly label column when one is present
//!
//! [`detect_sensitive_columns`] and [`anonymize`] mask personal data before
//! a table leaves the process.

mod converters;
mod sensitive;

pub use converters::parse_day_first;
pub use sensitive::{ANONYMIZED, anonymize, detect_sensitive_columns};

use crate::error::Result;
use crate::schema::{
    ANOMALY_LABEL, ANOMALY_LABEL_ALIASES, INCONSISTENT_DATES, MONTH, NOTIFICATION_DATE,
    OCCURRENCE_DATE, YEAR,
};
use crate::utils::{is_datetime_dtype, series_to_datetimes};
use chrono::{Datelike, NaiveDateTime};
use converters::{label_to_int32, string_to_datetime, trim_blank_to_null};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Header tokens that mark a column as holding dates.
const DATE_TOKENS: &[&str] = &["DATA", "DT", "DATE"];

/// What a normalization pass changed.
#[derive(Debug, Clone, Default)]
pub struct NormalizationReport {
    pub date_columns: Vec<String>,
    /// Date-like columns in which no value parsed; left as text.
    pub unparsed_date_columns: Vec<String>,
    /// Column the derived year/month came from, if any.
    pub year_source: Option<String>,
    /// Rows whose occurrence is after their notification.
    pub inconsistent_dates: usize,
    pub processing_steps: Vec<String>,
}

/// Canonicalizes headers, dates and labels of a raw table.
///
/// Normalization never drops a row and never mutates its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnNormalizer;

impl ColumnNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a table, discarding the report.
    pub fn normalize(&self, df: &DataFrame) -> Result<DataFrame> {
        Ok(self.normalize_with_report(df)?.0)
    }

    /// Normalize a table and describe what changed.
    pub fn normalize_with_report(
        &self,
        df: &DataFrame,
    ) -> Result<(DataFrame, NormalizationReport)> {
        let mut report = NormalizationReport::default();
        let mut out = df.clone();

        let headers = canonical_headers(&out);
        out.set_column_names(headers.iter().map(|h| h.as_str()))?;

        let string_columns: Vec<String> = out
            .get_columns()
            .iter()
            .filter(|c| c.dtype() == &DataType::String)
            .map(|c| c.name().to_string())
            .collect();
        for name in &string_columns {
            let series = out.column(name)?.as_materialized_series().clone();
            out.replace(name, trim_blank_to_null(&series)?)?;
        }

        self.parse_date_columns(&mut out, &mut report)?;
        self.derive_calendar_columns(&mut out, &mut report)?;
        self.flag_inconsistent_dates(&mut out, &mut report)?;

        if let Ok(col) = out.column(ANOMALY_LABEL) {
            let labels = label_to_int32(col.as_materialized_series())?;
            out.replace(ANOMALY_LABEL, labels)?;
            report
                .processing_steps
                .push(format!("Coerced '{ANOMALY_LABEL}' to integer labels"));
        }

        debug_assert_eq!(out.height(), df.height());
        info!(
            "Normalized table: {} rows, {} columns, {} date columns",
            out.height(),
            out.width(),
            report.date_columns.len()
        );
        Ok((out, report))
    }

    fn parse_date_columns(
        &self,
        df: &mut DataFrame,
        report: &mut NormalizationReport,
    ) -> Result<()> {
        let candidates: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| is_date_column(n))
            .collect();

        for name in candidates {
            let series = df.column(&name)?.as_materialized_series().clone();
            if is_datetime_dtype(series.dtype()) {
                report.date_columns.push(name);
                continue;
            }
            if series.dtype() != &DataType::String {
                continue;
            }

            match string_to_datetime(&series)? {
                Some(parsed) => {
                    let failed = parsed.null_count().saturating_sub(series.null_count());
                    if failed > 0 {
                        debug!("{failed} values in '{name}' could not be parsed as dates");
                    }
                    df.replace(&name, parsed)?;
                    report
                        .processing_steps
                        .push(format!("Parsed '{name}' as day-first dates"));
                    report.date_columns.push(name);
                }
                None => {
                    warn!("No value in '{name}' parses as a date; keeping it as text");
                    report.unparsed_date_columns.push(name);
                }
            }
        }
        Ok(())
    }

    fn derive_calendar_columns(
        &self,
        df: &mut DataFrame,
        report: &mut NormalizationReport,
    ) -> Result<()> {
        let source = [OCCURRENCE_DATE, NOTIFICATION_DATE].into_iter().find(|name| {
            df.column(name)
                .map(|c| is_datetime_dtype(c.dtype()))
                .unwrap_or(false)
        });
        let Some(source) = source else {
            debug!("No parsed event date; skipping {YEAR}/{MONTH} derivation");
            return Ok(());
        };

        let dates = series_to_datetimes(df.column(source)?.as_materialized_series())?;
        let years: Vec<Option<i32>> = dates.iter().map(|d| d.map(|d| d.year())).collect();
        let months: Vec<Option<i32>> = dates
            .iter()
            .map(|d| d.map(|d| d.month() as i32))
            .collect();

        df.with_column(Series::new(YEAR.into(), years))?;
        df.with_column(Series::new(MONTH.into(), months))?;

        report.year_source = Some(source.to_string());
        report
            .processing_steps
            .push(format!("Derived {YEAR}/{MONTH} from '{source}'"));
        Ok(())
    }

    fn flag_inconsistent_dates(
        &self,
        df: &mut DataFrame,
        report: &mut NormalizationReport,
    ) -> Result<()> {
        let (Ok(occurrence), Ok(notification)) =
            (df.column(OCCURRENCE_DATE), df.column(NOTIFICATION_DATE))
        else {
            return Ok(());
        };
        if !is_datetime_dtype(occurrence.dtype()) || !is_datetime_dtype(notification.dtype()) {
            return Ok(());
        }

        let occurred = series_to_datetimes(occurrence.as_materialized_series())?;
        let notified = series_to_datetimes(notification.as_materialized_series())?;
        let flags: Vec<bool> = occurred
            .iter()
            .zip(&notified)
            .map(|(o, n)| is_inconsistent(*o, *n))
            .collect();

        report.inconsistent_dates = flags.iter().filter(|&&f| f).count();
        if report.inconsistent_dates > 0 {
            warn!(
                "{} rows were notified before they occurred",
                report.inconsistent_dates
            );
        }
        df.with_column(Series::new(INCONSISTENT_DATES.into(), flags))?;
        Ok(())
    }
}

fn is_inconsistent(occurred: Option<NaiveDateTime>, notified: Option<NaiveDateTime>) -> bool {
    matches!((occurred, notified), (Some(o), Some(n)) if o > n)
}

/// Whether a canonical header names a date column.
pub fn is_date_column(name: &str) -> bool {
    name.split('_').any(|token| DATE_TOKENS.contains(&token))
}

/// Upper-case trimmed headers, with label aliases resolved and duplicates
/// suffixed `_2`, `_3`, ...
fn canonical_headers(df: &DataFrame) -> Vec<String> {
    let raw: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.trim().to_uppercase())
        .collect();
    let has_label = raw.iter().any(|h| h == ANOMALY_LABEL);

    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());
    for header in raw {
        let header = if !has_label && ANOMALY_LABEL_ALIASES.contains(&header.as_str()) {
            ANOMALY_LABEL.to_string()
        } else {
            header
        };
        let mut candidate = header.clone();
        let mut suffix = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{header}_{suffix}");
            suffix += 1;
        }
        if candidate != header {
            warn!("Duplicate header '{header}' renamed to '{candidate}'");
        }
        headers.push(candidate);
    }
    headers
}
