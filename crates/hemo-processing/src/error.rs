//! Error types for the hemovigilance pipeline.
//!
//! Errors are serializable as `{code, message}` so front ends can branch on
//! the failure kind without parsing messages.

use crate::config::ConfigValidationError;
use crate::types::TierFailure;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Every dataset tier was missing or unusable.
    #[error("No dataset tier could be loaded: {}", format_attempts(.attempts))]
    SourceUnavailable { attempts: Vec<TierFailure> },

    /// The upstream request timed out or the connection failed.
    #[error("Network failure fetching '{url}': {source}")]
    NetworkFailure {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("Upstream '{url}' answered with HTTP {status}")]
    UpstreamHttpError { url: String, status: u16 },

    /// Content could not be parsed as a delimited table.
    #[error("Failed to parse {origin}: {reason}")]
    ParseFailure {
        origin: String,
        reason: String,
        #[source]
        source: Option<polars::error::PolarsError>,
    },

    /// None of the requested feature columns can be derived.
    #[error("No feature columns available (requested: {})", .requested.join(", "))]
    NoFeaturesAvailable { requested: Vec<String> },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

fn format_attempts(attempts: &[TierFailure]) -> String {
    if attempts.is_empty() {
        return "no tiers configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    /// Build a parse failure without an underlying polars cause.
    pub fn parse(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseFailure {
            origin: origin.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Build a parse failure that keeps the polars error as its source.
    pub fn parse_with_source(origin: impl Into<String>, source: polars::error::PolarsError) -> Self {
        Self::ParseFailure {
            origin: origin.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for front-end handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::NetworkFailure { .. } => "NETWORK_FAILURE",
            Self::UpstreamHttpError { .. } => "UPSTREAM_HTTP_ERROR",
            Self::ParseFailure { .. } => "PARSE_FAILURE",
            Self::NoFeaturesAvailable { .. } => "NO_FEATURES_AVAILABLE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Strip any context wrappers and return the underlying error.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error came from the upstream fetch (network or HTTP).
    ///
    /// Fetch failures leave the on-disk tiers untouched, so callers can keep
    /// serving the cached table.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::NetworkFailure { .. } | Self::UpstreamHttpError { .. }
        )
    }

    /// Check if this error means no data can be served at all.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self.root(), Self::SourceUnavailable { .. })
    }
}

impl From<ConfigValidationError> for PipelineError {
    fn from(err: ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatasetTier, TierFailureReason};
    use std::path::PathBuf;

    #[test]
    fn test_error_code() {
        assert_eq!(
            PipelineError::UpstreamHttpError {
                url: "http://x".to_string(),
                status: 503
            }
            .error_code(),
            "UPSTREAM_HTTP_ERROR"
        );
        assert_eq!(
            PipelineError::parse("response body", "no header").error_code(),
            "PARSE_FAILURE"
        );
    }

    #[test]
    fn test_source_unavailable_lists_attempts() {
        let error = PipelineError::SourceUnavailable {
            attempts: vec![
                TierFailure {
                    tier: DatasetTier::Processed,
                    path: PathBuf::from("p.csv"),
                    reason: TierFailureReason::Missing,
                },
                TierFailure {
                    tier: DatasetTier::Original,
                    path: PathBuf::from("o.csv"),
                    reason: TierFailureReason::Empty,
                },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("p.csv"));
        assert!(message.contains("o.csv"));
        assert!(error.is_source_unavailable());
        assert!(!error.is_fetch_failure());
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::NoFeaturesAvailable {
            requested: vec!["GRAU_RISCO_COD".to_string()],
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("NO_FEATURES_AVAILABLE"));
        assert!(json.contains("GRAU_RISCO_COD"));
    }

    #[test]
    fn test_with_context() {
        let error = PipelineError::UpstreamHttpError {
            url: "http://x".to_string(),
            status: 500,
        }
        .with_context("During refresh");
        assert!(error.to_string().contains("During refresh"));
        assert_eq!(error.error_code(), "UPSTREAM_HTTP_ERROR");
        assert!(error.is_fetch_failure());
    }
}
