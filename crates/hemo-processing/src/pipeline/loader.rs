//! The load-and-score pass run on every cache miss.

use crate::cache::{LoadedTable, TableSource};
use crate::cleaner::ColumnNormalizer;
use crate::codec::{write_atomic, write_table};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features::FeatureTransformer;
use crate::pipeline::progress::{PipelineStage, ProgressReporter, ProgressUpdate};
use crate::scoring::{OutlierDetector, attach_labels, fill_missing_labels, has_labels};
use crate::storage::{TierResolver, modified_time};
use crate::types::DatasetTier;
use parking_lot::Mutex;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Resolves a tier, normalizes it and attaches anomaly labels.
///
/// Labels already present in the resolved table are reused. Freshly computed
/// labels are written back to the processed tier when persistence is on, so
/// the next load skips scoring.
pub(crate) struct PipelineLoader {
    config: PipelineConfig,
    resolver: TierResolver,
    normalizer: ColumnNormalizer,
    transformer: FeatureTransformer,
    detector: Arc<dyn OutlierDetector>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    /// Held while tier files are read or written.
    tier_lock: Arc<Mutex<()>>,
}

impl PipelineLoader {
    pub(crate) fn new(
        config: PipelineConfig,
        detector: Arc<dyn OutlierDetector>,
        progress_reporter: Option<Arc<dyn ProgressReporter>>,
        tier_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            resolver: TierResolver::from_config(&config),
            normalizer: ColumnNormalizer::new(),
            transformer: FeatureTransformer::new(config.features.clone()),
            config,
            detector,
            progress_reporter,
            tier_lock,
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn load_internal(&self) -> Result<LoadedTable> {
        let start = Instant::now();
        let _tiers = self.tier_lock.lock();

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Resolving,
            0.0,
            "Resolving dataset tier...",
        ));
        let resolved = self.resolver.resolve()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Resolving,
            1.0,
            format!("Loaded {} rows from {} tier", resolved.table.height(), resolved.tier),
        ));

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Normalizing,
            0.0,
            "Normalizing columns...",
        ));
        let (table, report) = self.normalizer.normalize_with_report(&resolved.table)?;
        for step in &report.processing_steps {
            debug!("{step}");
        }
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Normalizing,
            1.0,
            format!("Normalized {} columns", table.width()),
        ));

        let mut loaded = LoadedTable {
            table,
            tier: resolved.tier,
            source_path: resolved.path,
            source_modified: resolved.modified,
        };

        if has_labels(&loaded.table) {
            info!("Reusing anomaly labels stored in the {} tier", loaded.tier);
            loaded.table = fill_missing_labels(&loaded.table)?;
        } else if let Some(labels) = self.score(&loaded.table)? {
            loaded.table = attach_labels(&loaded.table, &labels)?;
            if self.config.persist_scores {
                self.persist(&mut loaded);
            }
        } else {
            loaded.table = attach_labels(&loaded.table, &vec![0; loaded.table.height()])?;
        }

        info!(
            "Load pass finished in {:.2}s ({} rows from {} tier)",
            start.elapsed().as_secs_f64(),
            loaded.table.height(),
            loaded.tier
        );
        Ok(loaded)
    }

    /// Labels for a normalized table, or `None` when no feature is derivable.
    fn score(&self, table: &DataFrame) -> Result<Option<Vec<i32>>> {
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FeatureEngineering,
            0.0,
            "Building feature matrix...",
        ));
        let features = match self.transformer.transform_with_report(table) {
            Ok(output) => output.matrix,
            Err(PipelineError::NoFeaturesAvailable { requested }) => {
                warn!(
                    "None of the features {:?} can be derived; labeling every row normal",
                    requested
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FeatureEngineering,
            1.0,
            format!("Built {} features", features.n_features()),
        ));

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Scoring,
            0.0,
            format!("Scoring with {}...", self.detector.name()),
        ));
        let labels = self
            .detector
            .fit_predict(&features, self.config.contamination, self.config.seed)?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Scoring,
            1.0,
            format!("Flagged {} anomalies", labels.iter().filter(|&&l| l == 1).count()),
        ));
        Ok(Some(labels))
    }

    /// Write a freshly scored table over the processed tier.
    ///
    /// A failed write is logged; the scored table is still served.
    fn persist(&self, loaded: &mut LoadedTable) {
        let target = self.config.tier_path(DatasetTier::Processed);
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Persisting,
            0.0,
            format!("Writing scores to {}", target.display()),
        ));

        let written = write_table(&loaded.table).and_then(|bytes| write_atomic(&target, &bytes));
        match written {
            Ok(()) => {
                info!("Persisted scored table to {}", target.display());
                loaded.tier = DatasetTier::Processed;
                loaded.source_modified = modified_time(&target);
                loaded.source_path = target;
            }
            Err(e) => warn!("Could not persist scores to {}: {}", target.display(), e),
        }
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Persisting,
            1.0,
            "Scores persisted",
        ));
    }
}

impl TableSource for PipelineLoader {
    fn load(&self) -> Result<LoadedTable> {
        match self.load_internal() {
            Ok(loaded) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Loaded {} rows",
                    loaded.table.height()
                )));
                Ok(loaded)
            }
            Err(e) => {
                error!("Load pass failed: {}", e);
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                Err(e)
            }
        }
    }
}
