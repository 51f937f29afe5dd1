//! Dense numeric feature matrix.

use polars::error::PolarsError;
use polars::prelude::*;

/// Row-major `f64` matrix with named columns.
///
/// Built once per scoring pass and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build a matrix from equally long columns.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> PolarsResult<Self> {
        if names.len() != columns.len() {
            return Err(PolarsError::ShapeMismatch(
                format!("{} names for {} columns", names.len(), columns.len()).into(),
            ));
        }
        let n_rows = columns.first().map_or(0, Vec::len);
        if let Some(bad) = columns.iter().position(|c| c.len() != n_rows) {
            return Err(PolarsError::ShapeMismatch(
                format!(
                    "column '{}' has {} rows, expected {}",
                    names[bad],
                    columns[bad].len(),
                    n_rows
                )
                .into(),
            ));
        }

        let n_features = columns.len();
        let mut data = vec![0.0; n_rows * n_features];
        for (j, column) in columns.iter().enumerate() {
            for (i, value) in column.iter().enumerate() {
                data[i * n_features + j] = *value;
            }
        }
        Ok(Self {
            names,
            n_rows,
            data,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Feature values of one row.
    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.n_features();
        &self.data[i * width..(i + 1) * width]
    }

    pub fn value(&self, row: usize, feature: usize) -> f64 {
        self.data[row * self.n_features() + feature]
    }

    /// Whether at least two rows differ in some feature.
    pub fn has_distinct_rows(&self) -> bool {
        if self.n_rows < 2 {
            return false;
        }
        let first = self.row(0);
        (1..self.n_rows).any(|i| self.row(i) != first)
    }
}
