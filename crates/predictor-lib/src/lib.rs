//! Core library for apartment rent prediction
//!
//! This crate provides the model build & serve pipeline:
//! - Raw listing access from CSV files or SQL tables
//! - Feature preparation into the fixed 9-column schema
//! - Random forest training with grid search and cross-validation
//! - Artifact persistence with atomic replace
//! - A load-or-build prediction service guarded by a single-flight gate

pub mod artifact;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod health;
pub mod models;
pub mod observability;
pub mod service;
pub mod trainer;

pub use artifact::{ArtifactMetadata, ArtifactStore, TrainedArtifact};
pub use config::{DataSourceConfig, PredictorConfig, SearchGrid, ServerConfig, TrainingConfig};
pub use error::{ArtifactError, PredictorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PredictorMetrics, StructuredLogger};
pub use service::{
    BuildOutput, LoadOutcome, ModelBuilder, PredictionService, ServiceState, SingleFlight,
};
pub use trainer::{ForestParams, SearchReport, SplitCriterion};
