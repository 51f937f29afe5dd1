//! Hemovigilance Processing Library
//!
//! Ingestion, anomaly scoring and read-side querying for the published
//! hemovigilance adverse-event dataset, built with Rust and Polars.
//!
//! # Overview
//!
//! - **Tiered loading**: the freshest usable snapshot among the processed,
//!   backup and original files is loaded; broken tiers are skipped
//! - **Normalization**: canonical headers, day-first dates, derived
//!   `YEAR`/`MONTH` and date-consistency flags
//! - **Anomaly scoring**: an isolation forest over a small numeric projection
//!   of each record, labeling a fixed share of rows as anomalous
//! - **Caching**: one load-and-score pass per refresh, shared by every reader
//! - **Querying**: conjunctive filters, filter options, summaries, per-year,
//!   per-region and per-reaction breakdowns and `;`-delimited ISO-8859-1
//!   export, optionally with personal data masked
//! - **Refresh**: atomic replacement of the processed file from the upstream
//!   publication
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hemo_processing::{FilterCriteria, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .data_dir("data")
//!     .contamination(0.01)
//!     .build()?;
//!
//! let pipeline = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let options = pipeline.filter_options()?;
//! let criteria = FilterCriteria {
//!     years: options.years.last().copied().into_iter().collect(),
//!     ..Default::default()
//! };
//! println!("{:?}", pipeline.summary(&criteria)?);
//!
//! // Pull the latest publication; the next read reloads and rescores.
//! pipeline.refresh()?;
//! ```

pub mod cache;
pub mod cleaner;
pub mod codec;
pub mod config;
pub mod error;
pub mod features;
pub mod imputers;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod scoring;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cache::{CacheManager, Clock, LoadedTable, SystemClock, TableSource};
pub use cleaner::{ColumnNormalizer, NormalizationReport};
pub use config::{
    ANALYSIS_CONTAMINATION, ConfigValidationError, DEFAULT_CONTAMINATION, DEFAULT_DATA_URL,
    FeatureSet, PipelineConfig, PipelineConfigBuilder,
};
pub use error::{PipelineError, Result as PipelineResult, ResultExt};
pub use features::{FeatureMatrix, FeatureOutput, FeatureTransformer};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate,
};
pub use query::FilterCriteria;
pub use scoring::{IsolationForest, OutlierDetector};
pub use storage::{DownloadedTable, RemoteFetcher, ResolvedTable, TierResolver, TierSource};
pub use types::{
    BreakdownDimension, BreakdownRow, CacheMetadata, DataStatus, DatasetTier, FetchOutcome,
    FilterOptions, TableSummary, TierFailure, TierFailureReason,
};
