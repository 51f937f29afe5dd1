//! Imputation module for handling missing feature values.

mod statistical;

pub use statistical::StatisticalImputer;
