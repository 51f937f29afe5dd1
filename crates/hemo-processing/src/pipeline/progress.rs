//! Progress reporting for load-and-score passes.
//!
//! Every cache miss runs one pass through the stages below. A reporter
//! attached to the pipeline receives an update at the start and end of each
//! stage, plus a terminal `Complete` or `Failed` update.
//!
//! # Example
//!
//! ```rust,ignore
//! use hemo_processing::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//! let table = pipeline.table()?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of a load-and-score pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Picking the dataset tier to load
    Resolving,
    /// Canonicalizing headers, dates and labels
    Normalizing,
    /// Building the numeric feature matrix
    FeatureEngineering,
    /// Running the outlier detector
    Scoring,
    /// Writing scored rows back to the processed tier
    Persisting,
    /// Pass completed successfully
    Complete,
    /// Pass failed with an error
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Resolving => "Resolving Source",
            Self::Normalizing => "Normalizing Columns",
            Self::FeatureEngineering => "Engineering Features",
            Self::Scoring => "Scoring Anomalies",
            Self::Persisting => "Persisting Scores",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of a full pass spent in this stage (0.0 - 1.0).
    ///
    /// Weights of the working stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Resolving => 0.25,
            Self::Normalizing => 0.20,
            Self::FeatureEngineering => 0.10,
            Self::Scoring => 0.35,
            Self::Persisting => 0.10,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Resolving => 0.0,
            Self::Normalizing => 0.25,
            Self::FeatureEngineering => 0.45,
            Self::Scoring => 0.55,
            Self::Persisting => 0.90,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Receives progress updates from load passes.
///
/// Implementations must be `Send + Sync`: the pass runs on whichever thread
/// missed the cache.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WORKING_STAGES: [PipelineStage; 5] = [
        PipelineStage::Resolving,
        PipelineStage::Normalizing,
        PipelineStage::FeatureEngineering,
        PipelineStage::Scoring,
        PipelineStage::Persisting,
    ];

    #[test]
    fn test_stage_weights_sum() {
        let total: f32 = WORKING_STAGES.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.001, "Weights should sum to 1.0");
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        let mut expected = 0.0;
        for stage in WORKING_STAGES {
            assert!((stage.base_progress() - expected).abs() < 0.001, "{stage:?}");
            expected += stage.weight();
        }
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(PipelineStage::Scoring, 0.5, "Scoring...");
        assert_eq!(update.stage, PipelineStage::Scoring);
        assert!((update.progress - 0.725).abs() < 0.001);
        assert_eq!(update.stage_progress, 0.5);
    }

    #[test]
    fn test_terminal_updates() {
        let done = ProgressUpdate::complete("Done");
        assert_eq!(done.stage, PipelineStage::Complete);
        assert_eq!(done.progress, 1.0);

        let failed = ProgressUpdate::failed("boom");
        assert_eq!(failed.stage, PipelineStage::Failed);
        assert_eq!(failed.message, "boom");
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&PipelineStage::FeatureEngineering).unwrap();
        assert_eq!(json, "\"feature_engineering\"");
    }

    #[test]
    fn test_closure_reporter_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let remote = Arc::clone(&reporter);
        std::thread::spawn(move || {
            remote.report(ProgressUpdate::new(PipelineStage::Resolving, 0.0, "Resolving"));
        })
        .join()
        .unwrap();
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
