//! The read-and-refresh facade over the cached table.

use crate::cache::{CacheManager, Clock, SystemClock};
use crate::cleaner::{anonymize, detect_sensitive_columns};
use crate::codec::write_table;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::loader::PipelineLoader;
use crate::pipeline::progress::{ClosureProgressReporter, ProgressReporter, ProgressUpdate};
use crate::query::{self, FilterCriteria};
use crate::schema::EXPORT_DATETIME_FORMAT;
use crate::scoring::{IsolationForest, OutlierDetector};
use crate::storage::RemoteFetcher;
use crate::types::{
    BreakdownDimension, BreakdownRow, CacheMetadata, DataStatus, FetchOutcome, FilterOptions,
    TableSummary,
};
use chrono::Local;
use parking_lot::Mutex;
use polars::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared entry point for readers and the refresh trigger.
///
/// All read operations go through the cache, so only the first read after
/// start-up or a successful refresh pays for resolving, normalizing and
/// scoring the dataset.
///
/// # Example
///
/// ```rust,ignore
/// use hemo_processing::{FilterCriteria, Pipeline, PipelineConfig};
///
/// let pipeline = Pipeline::builder()
///     .config(PipelineConfig::builder().data_dir("data").build()?)
///     .build()?;
///
/// let criteria = FilterCriteria {
///     regions: vec!["SP".into()],
///     ..Default::default()
/// };
/// let summary = pipeline.summary(&criteria)?;
/// let csv = pipeline.export_csv(&criteria)?;
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    cache: CacheManager,
    fetcher: RemoteFetcher,
    /// Serializes refreshes against each other. Never taken by readers.
    refresh_gate: Mutex<()>,
    /// Held by load passes and by the file replacement step of a refresh.
    tier_lock: Arc<Mutex<()>>,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The full scored table.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` when no tier holds a usable table.
    pub fn table(&self) -> Result<DataFrame> {
        self.cache.get()
    }

    /// Rows of the scored table matching `criteria`.
    pub fn filtered(&self, criteria: &FilterCriteria) -> Result<DataFrame> {
        query::filter(&self.cache.get()?, criteria)
    }

    /// Distinct regions, reaction types and years present in the table.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        query::filter_options(&self.cache.get()?)
    }

    /// Record and anomaly counts over the filtered rows.
    pub fn summary(&self, criteria: &FilterCriteria) -> Result<TableSummary> {
        query::summarize(&self.filtered(criteria)?)
    }

    /// Counts per year, region or reaction type over the filtered rows.
    pub fn breakdown(
        &self,
        criteria: &FilterCriteria,
        dimension: BreakdownDimension,
    ) -> Result<Vec<BreakdownRow>> {
        query::breakdown(&self.filtered(criteria)?, dimension)
    }

    /// Columns of the table that hold personal data.
    pub fn sensitive_columns(&self) -> Result<Vec<String>> {
        Ok(detect_sensitive_columns(&self.cache.get()?)?)
    }

    /// The filtered rows as `;`-delimited ISO-8859-1 bytes with a header.
    ///
    /// Dates are written day-first, matching the upstream files.
    pub fn export_csv(&self, criteria: &FilterCriteria) -> Result<Vec<u8>> {
        let rows = self.filtered(criteria)?;
        info!("Exporting {} rows", rows.height());
        write_table(&rows)
    }

    /// Like [`export_csv`](Self::export_csv), with every sensitive column
    /// masked.
    pub fn export_anonymized_csv(&self, criteria: &FilterCriteria) -> Result<Vec<u8>> {
        let rows = self.filtered(criteria)?;
        let sensitive = detect_sensitive_columns(&rows)?;
        let rows = anonymize(&rows, &sensitive)?;
        info!("Exporting {} rows with {} masked column(s)", rows.height(), sensitive.len());
        write_table(&rows)
    }

    /// Download the upstream dataset and, if it replaced the tier-1 file,
    /// drop the cached table.
    ///
    /// The download runs without any lock readers or load passes take, so
    /// warm and cold reads proceed while it is in flight. Only the file
    /// replacement and the cache invalidation run under the tier lock.
    /// On any error the files on disk and the cache are left as they were.
    pub fn refresh(&self) -> Result<FetchOutcome> {
        let _refresh = self.refresh_gate.lock();
        let Some(download) = self.fetcher.download_table()? else {
            return Ok(FetchOutcome::Empty);
        };

        let _tiers = self.tier_lock.lock();
        let outcome = self.fetcher.commit(download)?;
        self.cache.invalidate();
        Ok(outcome)
    }

    /// Drop the cached table; the next read reloads from disk.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Provenance of the cached table, if one is loaded.
    pub fn metadata(&self) -> Option<CacheMetadata> {
        self.cache.metadata()
    }

    /// Availability snapshot, loading the table if needed.
    ///
    /// Never fails: an unavailable source is reported as `"offline"`.
    pub fn status(&self) -> DataStatus {
        if let Err(e) = self.cache.get() {
            warn!("Dataset unavailable: {}", e);
            return DataStatus {
                status: "offline".to_string(),
                last_updated: None,
                total_records: 0,
                tier: None,
            };
        }

        let metadata = self.cache.metadata();
        DataStatus {
            status: "online".to_string(),
            last_updated: metadata
                .as_ref()
                .and_then(|m| m.source_modified)
                .map(|t| t.with_timezone(&Local).format(EXPORT_DATETIME_FORMAT).to_string()),
            total_records: metadata.as_ref().map(|m| m.rows).unwrap_or(0),
            tier: metadata.map(|m| m.tier),
        }
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    detector: Option<Arc<dyn OutlierDetector>>,
    clock: Option<Arc<dyn Clock>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default isolation forest.
    pub fn detector(mut self, detector: Arc<dyn OutlierDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Clock used to stamp cache entries.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the configuration fails validation or the HTTP
    /// client cannot be created.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let detector = self
            .detector
            .unwrap_or_else(|| Arc::new(IsolationForest::from_config(&config)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let tier_lock = Arc::new(Mutex::new(()));

        let loader = PipelineLoader::new(
            config.clone(),
            detector,
            self.progress_reporter,
            Arc::clone(&tier_lock),
        );
        let fetcher = RemoteFetcher::from_config(&config)?;

        Ok(Pipeline {
            cache: CacheManager::with_clock(Arc::new(loader), clock),
            fetcher,
            refresh_gate: Mutex::new(()),
            tier_lock,
            config,
        })
    }
}
