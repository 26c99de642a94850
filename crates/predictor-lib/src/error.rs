//! Error taxonomy for the build & serve pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictorError>;

/// Errors surfaced by any pipeline component
#[derive(Debug, Error)]
pub enum PredictorError {
    /// Source unreachable, unreadable, or empty
    #[error("data access error: {0}")]
    DataAccess(String),

    /// Unexpected column set or malformed categorical/garden values
    #[error("schema error: {0}")]
    Schema(String),

    /// Inference input does not match the feature vector contract
    #[error("feature vector mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    /// Degenerate training input
    #[error("training error: {0}")]
    Training(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Operation invalid for the current service state
    #[error("invalid state: {0}")]
    State(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PredictorError {
    /// Short stable label for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            PredictorError::DataAccess(_) => "data_access",
            PredictorError::Schema(_) => "schema",
            PredictorError::SchemaMismatch { .. } => "schema_mismatch",
            PredictorError::Training(_) => "training",
            PredictorError::Artifact(_) => "artifact",
            PredictorError::State(_) => "state",
            PredictorError::Config(_) => "config",
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self, PredictorError::Artifact(_))
    }
}

/// Failures reading or writing the persisted model
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt artifact at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to write artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<polars::prelude::PolarsError> for PredictorError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        PredictorError::DataAccess(e.to_string())
    }
}

impl From<sqlx::Error> for PredictorError {
    fn from(e: sqlx::Error) -> Self {
        PredictorError::DataAccess(e.to_string())
    }
}

impl From<config::ConfigError> for PredictorError {
    fn from(e: config::ConfigError) -> Self {
        PredictorError::Config(e.to_string())
    }
}
