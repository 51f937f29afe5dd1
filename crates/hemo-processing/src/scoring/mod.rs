//! Anomaly scoring.
//!
//! Scorers implement [`OutlierDetector`]: they assign every row of a
//! [`FeatureMatrix`] an anomaly score, and [`OutlierDetector::fit_predict`]
//! turns scores into binary labels by flagging the `round(c * n)`
//! highest-scoring rows for contamination `c`.
//!
//! Labels are reproducible: the same matrix, seed and contamination always
//! produce the same labels, and raising the contamination only ever adds
//! rows to the anomalous set.

mod isolation_forest;

pub use isolation_forest::IsolationForest;

use crate::error::{PipelineError, Result};
use crate::features::FeatureMatrix;
use crate::schema::ANOMALY_LABEL;
use polars::prelude::*;
use std::cmp::Ordering;
use tracing::{info, warn};

/// Minimum number of rows a scorer needs to tell rows apart.
pub const MIN_SCORING_ROWS: usize = 2;

/// Unsupervised outlier detector.
///
/// Implementations must be `Send + Sync` so one detector can serve every
/// load pass of a shared pipeline.
pub trait OutlierDetector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Anomaly score per row; higher means more anomalous.
    fn score(&self, features: &FeatureMatrix, seed: u64) -> Vec<f64>;

    /// Label each row 1 (anomalous) or 0 (normal).
    ///
    /// Degenerate input (fewer than [`MIN_SCORING_ROWS`] rows, or every row
    /// identical) yields all-normal labels rather than an error.
    fn fit_predict(
        &self,
        features: &FeatureMatrix,
        contamination: f64,
        seed: u64,
    ) -> Result<Vec<i32>> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(PipelineError::InvalidConfig(format!(
                "contamination must be in (0.0, 0.5], got {contamination}"
            )));
        }

        let n = features.n_rows();
        if n < MIN_SCORING_ROWS || !features.has_distinct_rows() {
            warn!(
                "Degenerate scoring input ({} rows, distinct rows: {}); labeling all rows normal",
                n,
                features.has_distinct_rows()
            );
            return Ok(vec![0; n]);
        }

        let scores = self.score(features, seed);
        let labels = label_top_fraction(&scores, contamination);
        info!(
            "{} flagged {} of {} rows as anomalous (contamination {})",
            self.name(),
            labels.iter().filter(|&&l| l == 1).count(),
            n,
            contamination
        );
        Ok(labels)
    }
}

/// Number of rows flagged for a given contamination.
pub fn anomaly_count(n_rows: usize, contamination: f64) -> usize {
    ((contamination * n_rows as f64).round() as usize).min(n_rows)
}

/// Flag the `round(c * n)` highest scores; ties go to the earlier row.
pub fn label_top_fraction(scores: &[f64], contamination: f64) -> Vec<i32> {
    let k = anomaly_count(scores.len(), contamination);
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });

    let mut labels = vec![0; scores.len()];
    for &i in order.iter().take(k) {
        labels[i] = 1;
    }
    labels
}

/// Copy of `df` with the anomaly label column set to `labels`.
pub fn attach_labels(df: &DataFrame, labels: &[i32]) -> Result<DataFrame> {
    if labels.len() != df.height() {
        return Err(PipelineError::Polars(PolarsError::ShapeMismatch(
            format!("{} labels for {} rows", labels.len(), df.height()).into(),
        )));
    }
    let mut out = df.clone();
    out.with_column(Series::new(ANOMALY_LABEL.into(), labels))?;
    Ok(out)
}

/// Copy of a labeled table with missing labels read as normal.
pub fn fill_missing_labels(df: &DataFrame) -> Result<DataFrame> {
    let labels: Vec<i32> = df
        .column(ANOMALY_LABEL)?
        .as_materialized_series()
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();
    attach_labels(df, &labels)
}

/// Whether a table already carries anomaly labels worth reusing.
pub fn has_labels(df: &DataFrame) -> bool {
    df.column(ANOMALY_LABEL)
        .map(|c| c.len() > 0 && c.null_count() < c.len())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScores(Vec<f64>);

    impl OutlierDetector for FixedScores {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _features: &FeatureMatrix, _seed: u64) -> Vec<f64> {
            self.0.clone()
        }
    }

    fn matrix(values: Vec<f64>) -> FeatureMatrix {
        FeatureMatrix::from_columns(vec!["x".into()], vec![values]).unwrap()
    }

    #[test]
    fn test_anomaly_count_rounds() {
        assert_eq!(anomaly_count(1000, 0.01), 10);
        assert_eq!(anomaly_count(1000, 0.03), 30);
        assert_eq!(anomaly_count(149, 0.01), 1);
        assert_eq!(anomaly_count(40, 0.01), 0);
    }

    #[test]
    fn test_label_top_fraction_breaks_ties_by_row() {
        let labels = label_top_fraction(&[0.9, 0.5, 0.9, 0.1], 0.25);
        assert_eq!(labels, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_degenerate_inputs_are_all_normal() {
        let detector = FixedScores(vec![1.0]);
        assert_eq!(detector.fit_predict(&matrix(vec![3.0]), 0.5, 0).unwrap(), vec![0]);

        let detector = FixedScores(vec![1.0, 0.0, 0.5]);
        let constant = matrix(vec![3.0, 3.0, 3.0]);
        assert_eq!(detector.fit_predict(&constant, 0.5, 0).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let detector = FixedScores(vec![0.0, 1.0]);
        let err = detector
            .fit_predict(&matrix(vec![1.0, 2.0]), 0.0, 0)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_anomalous_set_grows_with_contamination() {
        let forest = IsolationForest::new(50, 64);
        let values: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
        let features = matrix(values);

        let low = forest.fit_predict(&features, 0.01, 42).unwrap();
        let high = forest.fit_predict(&features, 0.03, 42).unwrap();
        assert_eq!(low.iter().sum::<i32>(), 2);
        assert_eq!(high.iter().sum::<i32>(), 6);
        assert!(low.iter().zip(&high).all(|(l, h)| l <= h));
    }

    #[test]
    fn test_labels_reproducible_across_runs() {
        let forest = IsolationForest::default();
        let values: Vec<f64> = (0..300).map(|i| ((i * 13) % 97) as f64).collect();
        let features = matrix(values);
        assert_eq!(
            forest.fit_predict(&features, 0.01, 42).unwrap(),
            forest.fit_predict(&features, 0.01, 42).unwrap()
        );
    }

    #[test]
    fn test_attach_and_detect_labels() {
        let df = df!("UF" => &["SP", "RJ"]).unwrap();
        assert!(!has_labels(&df));
        let labeled = attach_labels(&df, &[0, 1]).unwrap();
        assert!(has_labels(&labeled));
        assert_eq!(labeled.column(ANOMALY_LABEL).unwrap().i32().unwrap().get(1), Some(1));
        assert!(attach_labels(&df, &[1]).is_err());
    }

    #[test]
    fn test_blank_label_column_is_not_reused() {
        let blank = df!("UF" => &["SP", "RJ"], ANOMALY_LABEL => &[None::<i32>, None]).unwrap();
        assert!(!has_labels(&blank));

        let partial = df!("UF" => &["SP", "RJ"], ANOMALY_LABEL => &[Some(1), None]).unwrap();
        assert!(has_labels(&partial));
        let filled = fill_missing_labels(&partial).unwrap();
        let values: Vec<Option<i32>> = filled.column(ANOMALY_LABEL).unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(0)]);
    }
}
