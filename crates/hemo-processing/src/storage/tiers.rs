//! Multi-tier fallback resolution.
//!
//! The resolver walks an ordered list of tier files and loads the first one
//! that exists, parses and holds rows. A broken tier is logged and skipped,
//! never retried and never merged with another tier.

use crate::codec::read_table;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{DatasetTier, TierFailure, TierFailureReason};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A tier and the file that backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSource {
    pub tier: DatasetTier,
    pub path: PathBuf,
}

impl TierSource {
    pub fn new(tier: DatasetTier, path: impl Into<PathBuf>) -> Self {
        Self {
            tier,
            path: path.into(),
        }
    }
}

/// Resolution progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Resolved(DatasetTier),
    NoData,
}

impl Resolution {
    /// Transition after evaluating one tier.
    fn on_tier(self, tier: DatasetTier, usable: bool) -> Self {
        match (self, usable) {
            (Self::Unresolved, true) => Self::Resolved(tier),
            (state, _) => state,
        }
    }

    /// Transition once every tier has been evaluated.
    fn finish(self) -> Self {
        match self {
            Self::Unresolved => Self::NoData,
            state => state,
        }
    }
}

/// The table loaded from the winning tier.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub tier: DatasetTier,
    pub path: PathBuf,
    pub table: DataFrame,
    pub modified: Option<DateTime<Utc>>,
    /// Higher-priority tiers that were skipped, in evaluation order.
    pub skipped: Vec<TierFailure>,
}

/// Picks the highest-priority usable tier.
#[derive(Debug, Clone)]
pub struct TierResolver {
    sources: Vec<TierSource>,
}

impl TierResolver {
    pub fn new(sources: Vec<TierSource>) -> Self {
        Self { sources }
    }

    /// Processed, backup and original tiers under the configured data dir.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            DatasetTier::ALL
                .iter()
                .map(|&tier| TierSource::new(tier, config.tier_path(tier)))
                .collect(),
        )
    }

    pub fn sources(&self) -> &[TierSource] {
        &self.sources
    }

    /// Load the first usable tier.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable`, carrying every tier failure, when no tier is
    /// usable.
    pub fn resolve(&self) -> Result<ResolvedTable> {
        let mut state = Resolution::Unresolved;
        let mut failures = Vec::new();
        let mut resolved = None;

        for source in &self.sources {
            let outcome = load_tier(&source.path);
            state = state.on_tier(source.tier, outcome.is_ok());
            match outcome {
                Ok((table, modified)) => {
                    info!(
                        "Loaded {} tier from {} ({} rows)",
                        source.tier,
                        source.path.display(),
                        table.height()
                    );
                    resolved = Some((source, table, modified));
                    break;
                }
                Err(reason) => {
                    if reason == TierFailureReason::Missing {
                        debug!("{} tier not present at {}", source.tier, source.path.display());
                    } else {
                        warn!(
                            "Skipping {} tier at {}: {}",
                            source.tier,
                            source.path.display(),
                            reason
                        );
                    }
                    failures.push(TierFailure {
                        tier: source.tier,
                        path: source.path.clone(),
                        reason,
                    });
                }
            }
        }

        match (state.finish(), resolved) {
            (Resolution::Resolved(tier), Some((source, table, modified))) => Ok(ResolvedTable {
                tier,
                path: source.path.clone(),
                table,
                modified,
                skipped: failures,
            }),
            _ => {
                warn!("No usable dataset tier among {} candidates", self.sources.len());
                Err(PipelineError::SourceUnavailable { attempts: failures })
            }
        }
    }
}

/// Modification time of a file, if the platform reports one.
pub fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn load_tier(path: &Path) -> std::result::Result<(DataFrame, Option<DateTime<Utc>>), TierFailureReason> {
    if !path.is_file() {
        return Err(TierFailureReason::Missing);
    }
    let bytes = fs::read(path).map_err(|e| TierFailureReason::Unreadable(e.to_string()))?;
    let table = read_table(&bytes, &path.display().to_string())
        .map_err(|e| TierFailureReason::Unparseable(e.to_string()))?;
    if table.height() == 0 {
        return Err(TierFailureReason::Empty);
    }
    Ok((table, modified_time(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &[u8] = b"UF_NOTIFICACAO;GRAU_RISCO\nSP;Grau I\nRJ;Grau II\n";

    fn resolver(dir: &Path) -> TierResolver {
        TierResolver::new(vec![
            TierSource::new(DatasetTier::Processed, dir.join("processed.csv")),
            TierSource::new(DatasetTier::Backup, dir.join("backup.csv")),
            TierSource::new(DatasetTier::Original, dir.join("original.csv")),
        ])
    }

    #[test]
    fn test_first_valid_tier_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("processed.csv"), VALID).unwrap();
        fs::write(dir.path().join("original.csv"), b"A;B\n1;2\n").unwrap();

        let resolved = resolver(dir.path()).resolve().unwrap();
        assert_eq!(resolved.tier, DatasetTier::Processed);
        assert_eq!(resolved.table.height(), 2);
        assert!(resolved.skipped.is_empty());
        assert!(resolved.modified.is_some());
    }

    #[test]
    fn test_missing_and_empty_tiers_fall_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("backup.csv"), b"UF_NOTIFICACAO;GRAU_RISCO\n").unwrap();
        fs::write(dir.path().join("original.csv"), VALID).unwrap();

        let resolved = resolver(dir.path()).resolve().unwrap();
        assert_eq!(resolved.tier, DatasetTier::Original);
        let reasons: Vec<_> = resolved.skipped.iter().map(|f| f.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![TierFailureReason::Missing, TierFailureReason::Empty]
        );
    }

    #[test]
    fn test_unparseable_tier_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("processed.csv"), b"\x00\x01garbage without separators").unwrap();
        fs::write(dir.path().join("backup.csv"), VALID).unwrap();

        let resolved = resolver(dir.path()).resolve().unwrap();
        assert_eq!(resolved.tier, DatasetTier::Backup);
        assert!(matches!(
            resolved.skipped[0].reason,
            TierFailureReason::Unparseable(_)
        ));
    }

    #[test]
    fn test_no_tiers_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path()).resolve().unwrap_err();
        match err {
            PipelineError::SourceUnavailable { attempts } => assert_eq!(attempts.len(), 3),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_transitions() {
        let state = Resolution::Unresolved
            .on_tier(DatasetTier::Processed, false)
            .on_tier(DatasetTier::Backup, true)
            .on_tier(DatasetTier::Original, true);
        assert_eq!(state.finish(), Resolution::Resolved(DatasetTier::Backup));
        assert_eq!(Resolution::Unresolved.finish(), Resolution::NoData);
    }
}
