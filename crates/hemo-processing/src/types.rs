//! Shared data types for the hemovigilance pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Dataset tiers
// =============================================================================

/// A prioritized on-disk snapshot of the dataset.
///
/// Tiers are consulted in declaration order: the freshly processed file
/// first, then the previous download kept as backup, then the original
/// bundled copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetTier {
    Processed,
    Backup,
    Original,
}

impl DatasetTier {
    /// All tiers in priority order.
    pub const ALL: [DatasetTier; 3] = [Self::Processed, Self::Backup, Self::Original];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Backup => "backup",
            Self::Original => "original",
        }
    }
}

impl fmt::Display for DatasetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Why a tier was skipped during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TierFailureReason {
    /// The file does not exist.
    Missing,
    /// The file exists but could not be read.
    Unreadable(String),
    /// The file was read but is not a valid delimited table.
    Unparseable(String),
    /// The file parsed but holds no usable rows.
    Empty,
}

impl fmt::Display for TierFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Unreadable(reason) => write!(f, "unreadable ({reason})"),
            Self::Unparseable(reason) => write!(f, "unparseable ({reason})"),
            Self::Empty => f.write_str("empty"),
        }
    }
}

/// A tier that could not be used, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFailure {
    pub tier: DatasetTier,
    pub path: PathBuf,
    pub reason: TierFailureReason,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tier at '{}': {}", self.tier, self.path.display(), self.reason)
    }
}

// =============================================================================
// Read-side views
// =============================================================================

/// Distinct values available for each filter dimension, sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub reaction_types: Vec<String>,
    pub years: Vec<i32>,
}

/// Headline counts over a (possibly filtered) table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub total_records: usize,
    pub total_anomalies: usize,
    /// Share of anomalous rows in percent, rounded to two decimals.
    pub anomaly_percentage: f64,
}

/// Column a [`BreakdownRow`] list is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownDimension {
    Year,
    Region,
    ReactionType,
}

impl BreakdownDimension {
    /// Source column in the normalized table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Year => crate::schema::YEAR,
            Self::Region => crate::schema::REGION,
            Self::ReactionType => crate::schema::REACTION_TYPE,
        }
    }
}

/// Record and anomaly counts for one value of a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub value: String,
    pub records: usize,
    pub anomalies: usize,
}

/// Provenance of the currently cached table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub tier: DatasetTier,
    pub source_path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    pub source_modified: Option<DateTime<Utc>>,
    pub rows: usize,
}

/// Health snapshot exposed to front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStatus {
    /// `"online"` when a table is available, `"offline"` otherwise.
    pub status: String,
    /// Source-file modification time formatted `dd/mm/yyyy HH:MM:SS`.
    pub last_updated: Option<String>,
    pub total_records: usize,
    pub tier: Option<DatasetTier>,
}

/// Result of a refresh attempt against the upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The tier-1 file was atomically replaced.
    Replaced { path: PathBuf, rows: usize },
    /// Upstream answered with a table that has no rows; nothing was written.
    Empty,
}

impl FetchOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}
