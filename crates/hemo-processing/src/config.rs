//! Configuration types for the hemovigilance pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use crate::error::{Result, ResultExt};
use crate::types::DatasetTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public endpoint that publishes the hemovigilance open dataset.
pub const DEFAULT_DATA_URL: &str =
    "https://dados.anvisa.gov.br/dados/DADOS_ABERTOS_HEMOVIGILANCIA.csv";

/// Contamination used by the serving pipeline.
pub const DEFAULT_CONTAMINATION: f64 = 0.01;

/// Contamination used by the exploratory analysis runs.
pub const ANALYSIS_CONTAMINATION: f64 = 0.03;

/// Which engineered features the scorer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "columns")]
pub enum FeatureSet {
    /// Reaction-type code, risk-grade code and patient age.
    #[default]
    Core,
    /// Core features plus risk-grade ordinal and the temporal features.
    Extended,
    /// An explicit list of derived feature names.
    Custom(Vec<String>),
}

/// Configuration for the pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use hemo_processing::config::{PipelineConfig, ANALYSIS_CONTAMINATION};
///
/// let config = PipelineConfig::builder()
///     .data_dir("data")
///     .contamination(ANALYSIS_CONTAMINATION)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the tier files.
    /// Default: "data"
    pub data_dir: PathBuf,

    /// File name of the tier-1 (processed) snapshot.
    pub processed_file: String,

    /// File name of the tier-2 (backup) snapshot.
    pub backup_file: String,

    /// File name of the tier-3 (original) snapshot.
    pub original_file: String,

    /// Upstream URL for refreshes.
    pub upstream_url: String,

    /// Timeout for the upstream request, in seconds.
    /// Default: 60
    pub fetch_timeout_secs: u64,

    /// Copy the current tier-1 file to the backup tier before replacing it.
    /// Default: true
    pub backup_on_fetch: bool,

    /// Expected share of anomalous rows, in (0, 0.5].
    /// Default: 0.01
    pub contamination: f64,

    /// Seed for the scorer's random source.
    /// Default: 42
    pub seed: u64,

    /// Number of isolation trees.
    /// Default: 100
    pub n_estimators: usize,

    /// Rows sampled per isolation tree.
    /// Default: 256
    pub max_samples: usize,

    /// Features handed to the scorer.
    /// Default: Core
    pub features: FeatureSet,

    /// Write freshly scored tables back to the processed tier.
    /// Default: true
    pub persist_scores: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            processed_file: "DADOS_HEMOVIGILANCIA_PROCESSADO.csv".to_string(),
            backup_file: "old.DADOS_ABERTOS_HEMOVIGILANCIA_UTF8.csv".to_string(),
            original_file: "DADOS_ABERTOS_HEMOVIGILANCIA_UTF8.csv".to_string(),
            upstream_url: DEFAULT_DATA_URL.to_string(),
            fetch_timeout_secs: 60,
            backup_on_fetch: true,
            contamination: DEFAULT_CONTAMINATION,
            seed: 42,
            n_estimators: 100,
            max_samples: 256,
            features: FeatureSet::default(),
            persist_scores: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// Fields missing from the file take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("Reading config file '{}'", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the file backing a tier.
    pub fn tier_path(&self, tier: DatasetTier) -> PathBuf {
        let name = match tier {
            DatasetTier::Processed => &self.processed_file,
            DatasetTier::Backup => &self.backup_file,
            DatasetTier::Original => &self.original_file,
        };
        self.data_dir.join(name)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigValidationError::InvalidContamination(
                self.contamination,
            ));
        }

        if self.n_estimators == 0 {
            return Err(ConfigValidationError::InvalidEstimators(self.n_estimators));
        }

        if self.max_samples < 2 {
            return Err(ConfigValidationError::InvalidMaxSamples(self.max_samples));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }

        for (field, name) in [
            ("processed_file", &self.processed_file),
            ("backup_file", &self.backup_file),
            ("original_file", &self.original_file),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigValidationError::EmptyFileName(field.to_string()));
            }
        }

        if let FeatureSet::Custom(columns) = &self.features
            && columns.is_empty()
        {
            return Err(ConfigValidationError::EmptyFeatureList);
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid contamination: {0} (must be in (0.0, 0.5])")]
    InvalidContamination(f64),

    #[error("Invalid tree count: {0} (must be at least 1)")]
    InvalidEstimators(usize),

    #[error("Invalid samples per tree: {0} (must be at least 2)")]
    InvalidMaxSamples(usize),

    #[error("Fetch timeout must be at least one second")]
    InvalidTimeout,

    #[error("File name for '{0}' must not be empty")]
    EmptyFileName(String),

    #[error("A custom feature set must name at least one feature")]
    EmptyFeatureList,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    data_dir: Option<PathBuf>,
    processed_file: Option<String>,
    backup_file: Option<String>,
    original_file: Option<String>,
    upstream_url: Option<String>,
    fetch_timeout_secs: Option<u64>,
    backup_on_fetch: Option<bool>,
    contamination: Option<f64>,
    seed: Option<u64>,
    n_estimators: Option<usize>,
    max_samples: Option<usize>,
    features: Option<FeatureSet>,
    persist_scores: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the directory holding the tier files.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn processed_file(mut self, name: impl Into<String>) -> Self {
        self.processed_file = Some(name.into());
        self
    }

    pub fn backup_file(mut self, name: impl Into<String>) -> Self {
        self.backup_file = Some(name.into());
        self
    }

    pub fn original_file(mut self, name: impl Into<String>) -> Self {
        self.original_file = Some(name.into());
        self
    }

    /// Set the upstream URL used by refreshes.
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    /// Set the upstream request timeout in seconds.
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = Some(secs);
        self
    }

    /// Keep the previous tier-1 file as the backup tier on refresh.
    pub fn backup_on_fetch(mut self, enable: bool) -> Self {
        self.backup_on_fetch = Some(enable);
        self
    }

    /// Set the expected anomalous fraction.
    ///
    /// # Arguments
    /// * `fraction` - Value in (0.0, 0.5] (e.g., 0.01 = 1%)
    pub fn contamination(mut self, fraction: f64) -> Self {
        self.contamination = Some(fraction);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = Some(n);
        self
    }

    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = Some(n);
        self
    }

    /// Choose which engineered features are scored.
    pub fn features(mut self, features: FeatureSet) -> Self {
        self.features = Some(features);
        self
    }

    /// Enable or disable writing scored tables back to the processed tier.
    pub fn persist_scores(mut self, persist: bool) -> Self {
        self.persist_scores = Some(persist);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            processed_file: self.processed_file.unwrap_or(defaults.processed_file),
            backup_file: self.backup_file.unwrap_or(defaults.backup_file),
            original_file: self.original_file.unwrap_or(defaults.original_file),
            upstream_url: self.upstream_url.unwrap_or(defaults.upstream_url),
            fetch_timeout_secs: self.fetch_timeout_secs.unwrap_or(defaults.fetch_timeout_secs),
            backup_on_fetch: self.backup_on_fetch.unwrap_or(defaults.backup_on_fetch),
            contamination: self.contamination.unwrap_or(defaults.contamination),
            seed: self.seed.unwrap_or(defaults.seed),
            n_estimators: self.n_estimators.unwrap_or(defaults.n_estimators),
            max_samples: self.max_samples.unwrap_or(defaults.max_samples),
            features: self.features.unwrap_or(defaults.features),
            persist_scores: self.persist_scores.unwrap_or(defaults.persist_scores),
        };

        config.validate()?;
        Ok(config)
    }
}

impl From<PipelineConfig> for PipelineConfigBuilder {
    fn from(config: PipelineConfig) -> Self {
        Self {
            data_dir: Some(config.data_dir),
            processed_file: Some(config.processed_file),
            backup_file: Some(config.backup_file),
            original_file: Some(config.original_file),
            upstream_url: Some(config.upstream_url),
            fetch_timeout_secs: Some(config.fetch_timeout_secs),
            backup_on_fetch: Some(config.backup_on_fetch),
            contamination: Some(config.contamination),
            seed: Some(config.seed),
            n_estimators: Some(config.n_estimators),
            max_samples: Some(config.max_samples),
            features: Some(config.features),
            persist_scores: Some(config.persist_scores),
        }
    }
}
