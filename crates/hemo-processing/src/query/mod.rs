//! Filtering and read-side summaries over the scored table.
//!
//! Every predicate in [`FilterCriteria`] is optional; supplied predicates
//! are combined with AND. A predicate whose column is missing from the table
//! is logged and ignored.

use crate::error::Result;
use crate::schema::{ANOMALY_LABEL, NOTIFICATION_DATE, OCCURRENCE_DATE, REACTION_TYPE, REGION, YEAR};
use crate::types::{BreakdownDimension, BreakdownRow, FilterOptions, TableSummary};
use crate::utils::{is_datetime_dtype, round2, series_to_datetimes, series_to_strings};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Row predicates for a filtered view.
///
/// Empty lists and `None` bounds mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Region codes (`UF_NOTIFICACAO`), matched exactly.
    pub regions: Vec<String>,
    /// Reaction types (`TIPO_REACAO_TRANSFUSIONAL`), matched exactly.
    pub reaction_types: Vec<String>,
    pub years: Vec<i32>,
    /// First calendar day included.
    pub date_from: Option<NaiveDate>,
    /// Last calendar day included.
    pub date_to: Option<NaiveDate>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
            && self.reaction_types.is_empty()
            && self.years.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }
}

/// Rows of `df` matching every supplied predicate, in original order.
pub fn filter(df: &DataFrame, criteria: &FilterCriteria) -> Result<DataFrame> {
    if criteria.is_empty() {
        return Ok(df.clone());
    }

    let mut mask = vec![true; df.height()];
    if !criteria.regions.is_empty() {
        restrict_to_values(df, REGION, &criteria.regions, &mut mask)?;
    }
    if !criteria.reaction_types.is_empty() {
        restrict_to_values(df, REACTION_TYPE, &criteria.reaction_types, &mut mask)?;
    }
    if !criteria.years.is_empty() {
        restrict_to_years(df, &criteria.years, &mut mask)?;
    }
    if criteria.date_from.is_some() || criteria.date_to.is_some() {
        restrict_to_dates(df, criteria.date_from, criteria.date_to, &mut mask)?;
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    let out = df.filter(&mask)?;
    debug!("Filter kept {} of {} rows", out.height(), df.height());
    Ok(out)
}

/// Sorted distinct values for each filter dimension.
pub fn filter_options(df: &DataFrame) -> Result<FilterOptions> {
    let years = match df.column(YEAR) {
        Ok(col) => {
            let cast = col.as_materialized_series().cast(&DataType::Int32)?;
            cast.i32()?
                .into_iter()
                .flatten()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }
        Err(_) => Vec::new(),
    };

    Ok(FilterOptions {
        regions: distinct_strings(df, REGION)?,
        reaction_types: distinct_strings(df, REACTION_TYPE)?,
        years,
    })
}

/// Record and anomaly counts for a table.
pub fn summarize(df: &DataFrame) -> Result<TableSummary> {
    let total_records = df.height();
    let total_anomalies = match df.column(ANOMALY_LABEL) {
        Ok(col) => {
            let cast = col.as_materialized_series().cast(&DataType::Int32)?;
            cast.i32()?.into_iter().filter(|v| *v == Some(1)).count()
        }
        Err(_) => 0,
    };
    let anomaly_percentage = if total_records > 0 {
        round2(total_anomalies as f64 / total_records as f64 * 100.0)
    } else {
        0.0
    };

    Ok(TableSummary {
        total_records,
        total_anomalies,
        anomaly_percentage,
    })
}

/// Record and anomaly counts per value of `dimension`.
///
/// Rows with no value are left out. Years are listed in ascending order;
/// regions and reaction types by descending record count, ties by value.
/// An absent dimension column yields an empty list.
pub fn breakdown(df: &DataFrame, dimension: BreakdownDimension) -> Result<Vec<BreakdownRow>> {
    let column = dimension.column();
    if df.column(column).is_err() {
        warn!("Column '{column}' not present; no {dimension:?} breakdown");
        return Ok(Vec::new());
    }

    let mut aggregations = vec![len().alias(RECORDS)];
    if df.column(ANOMALY_LABEL).is_ok() {
        aggregations.push(
            col(ANOMALY_LABEL)
                .cast(DataType::Int64)
                .sum()
                .alias(ANOMALIES),
        );
    }
    let grouped = df
        .clone()
        .lazy()
        .filter(col(column).is_not_null())
        .group_by([col(column)])
        .agg(aggregations)
        .collect()?;

    let values = series_to_strings(grouped.column(column)?.as_materialized_series())?;
    let records = counts(&grouped, RECORDS)?;
    let anomalies = if grouped.column(ANOMALIES).is_ok() {
        counts(&grouped, ANOMALIES)?
    } else {
        vec![0; grouped.height()]
    };

    let mut rows: Vec<BreakdownRow> = values
        .into_iter()
        .zip(records)
        .zip(anomalies)
        .filter_map(|((value, records), anomalies)| {
            value.map(|value| BreakdownRow {
                value,
                records,
                anomalies,
            })
        })
        .collect();
    match dimension {
        BreakdownDimension::Year => rows.sort_by(|a, b| a.value.cmp(&b.value)),
        _ => rows.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.value.cmp(&b.value))),
    }
    Ok(rows)
}

/// Name of the date column used for range filters.
///
/// The occurrence date is preferred; the notification date stands in when
/// the occurrence date is absent or was not parsed.
pub fn primary_date_column(df: &DataFrame) -> Option<&'static str> {
    [OCCURRENCE_DATE, NOTIFICATION_DATE].into_iter().find(|name| {
        df.column(name)
            .map(|c| is_datetime_dtype(c.dtype()))
            .unwrap_or(false)
    })
}

// =============================================================================
// Aggregation helpers
// =============================================================================

const RECORDS: &str = "__records";
const ANOMALIES: &str = "__anomalies";

fn counts(df: &DataFrame, column: &str) -> Result<Vec<usize>> {
    let cast = df.column(column)?.as_materialized_series().cast(&DataType::Int64)?;
    Ok(cast
        .i64()?
        .into_iter()
        .map(|v| v.map_or(0, |n| n.max(0) as usize))
        .collect())
}

// =============================================================================
// Predicates
// =============================================================================

fn restrict_to_values(df: &DataFrame, column: &str, allowed: &[String], mask: &mut [bool]) -> Result<()> {
    let Ok(col) = df.column(column) else {
        warn!("Column '{column}' not present; ignoring its filter");
        return Ok(());
    };
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let values = series_to_strings(col.as_materialized_series())?;
    for (keep, value) in mask.iter_mut().zip(values) {
        *keep &= value.is_some_and(|v| allowed.contains(v.as_str()));
    }
    Ok(())
}

fn restrict_to_years(df: &DataFrame, years: &[i32], mask: &mut [bool]) -> Result<()> {
    let Ok(col) = df.column(YEAR) else {
        warn!("Column '{YEAR}' not present; ignoring the year filter");
        return Ok(());
    };
    let cast = col.as_materialized_series().cast(&DataType::Int32)?;
    for (keep, year) in mask.iter_mut().zip(cast.i32()?) {
        *keep &= year.is_some_and(|y| years.contains(&y));
    }
    Ok(())
}

fn restrict_to_dates(
    df: &DataFrame,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    mask: &mut [bool],
) -> Result<()> {
    let Some(column) = primary_date_column(df) else {
        warn!("No parsed event date column; ignoring the date range");
        return Ok(());
    };
    let dates = series_to_datetimes(df.column(column)?.as_materialized_series())?;
    for (keep, date) in mask.iter_mut().zip(dates) {
        *keep &= date.is_some_and(|dt| {
            let day = dt.date();
            from.is_none_or(|f| day >= f) && to.is_none_or(|t| day <= t)
        });
    }
    Ok(())
}

fn distinct_strings(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let Ok(col) = df.column(column) else {
        return Ok(Vec::new());
    };
    Ok(series_to_strings(col.as_materialized_series())?
        .into_iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}
