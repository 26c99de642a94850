//! Load-or-build prediction service
//!
//! `PredictionService` starts UNINITIALIZED and becomes READY once an
//! artifact is in memory. `load()` builds the artifact first when none is
//! stored, and rebuilds once when the stored one cannot be read. The
//! check-then-build sequence runs under a per-path single-flight gate so
//! concurrent first callers train exactly once.

mod single_flight;

pub use single_flight::{FlightGuard, SingleFlight};

use crate::artifact::{ArtifactStore, TrainedArtifact};
use crate::config::PredictorConfig;
use crate::data::{build_source, DataSource};
use crate::error::{PredictorError, Result};
use crate::features::FeaturePreparer;
use crate::models::FeatureVector;
use crate::observability::{PredictorMetrics, StructuredLogger};
use crate::trainer::{ModelTrainer, SearchReport};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Lifecycle of a prediction service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
}

/// How `load()` obtained the artifact it installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A stored artifact was read as is
    Loaded,
    /// Nothing was stored, so one was built
    Built,
    /// The stored artifact was unusable and has been replaced
    Rebuilt,
}

impl LoadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadOutcome::Loaded => "loaded",
            LoadOutcome::Built => "built",
            LoadOutcome::Rebuilt => "rebuilt",
        }
    }
}

/// Result of an unconditional build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub artifact: TrainedArtifact,
    pub report: SearchReport,
    pub path: PathBuf,
}

/// Runs fetch, prepare, train and save
#[derive(Clone)]
pub struct ModelBuilder {
    config: PredictorConfig,
    source: Arc<dyn DataSource>,
    store: ArtifactStore,
    gate: SingleFlight,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

impl ModelBuilder {
    pub fn new(config: PredictorConfig, source: Arc<dyn DataSource>, logger: StructuredLogger) -> Self {
        Self {
            store: ArtifactStore::new(logger.clone()),
            config,
            source,
            gate: SingleFlight::global(),
            metrics: PredictorMetrics::new(),
            logger,
        }
    }

    /// Builder reading from the configured data source
    pub fn from_config(config: PredictorConfig, logger: StructuredLogger) -> Self {
        let source = build_source(&config, logger.clone());
        Self::new(config, source, logger)
    }

    pub fn with_gate(mut self, gate: SingleFlight) -> Self {
        self.gate = gate;
        self
    }

    /// Retrain and overwrite the artifact, whether or not one exists
    pub async fn build_and_save(&self) -> Result<BuildOutput> {
        let path = self.config.artifact_path();
        let _guard = self.gate.acquire(&path).await;
        self.build_and_save_locked(&path).await
    }

    /// Caller must hold the gate for `path`
    async fn build_and_save_locked(&self, path: &Path) -> Result<BuildOutput> {
        let started = Instant::now();
        let result = self.run_build(path).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(output) => {
                self.metrics.record_training(true, elapsed);
                self.metrics.set_test_r2(output.artifact.metadata().test_r2);
            }
            Err(e) => {
                self.metrics.record_training(false, elapsed);
                self.logger.log_build_failed(e.kind(), &e.to_string());
            }
        }
        result
    }

    async fn run_build(&self, path: &Path) -> Result<BuildOutput> {
        self.logger.log_build_started(&self.source.describe());
        let records = self.source.fetch().await?;

        let training = self.config.training.clone();
        let logger = self.logger.clone();
        let store = self.store.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let dataset = FeaturePreparer::new(logger.clone()).prepare(&records)?;
            let outcome = ModelTrainer::new(training, logger).train(&dataset)?;
            let report = outcome.report.clone();
            let artifact = TrainedArtifact::from_outcome(outcome);
            store.save(&artifact, &path)?;
            Ok(BuildOutput {
                artifact,
                report,
                path,
            })
        })
        .await
        .map_err(|e| PredictorError::Training(format!("build task failed: {}", e)))?
    }
}

/// Serves predictions from an in-memory artifact
pub struct PredictionService {
    config: PredictorConfig,
    store: ArtifactStore,
    builder: ModelBuilder,
    gate: SingleFlight,
    artifact: RwLock<Option<Arc<TrainedArtifact>>>,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    /// Service over the configured data source
    pub fn new(config: PredictorConfig, logger: StructuredLogger) -> Self {
        let source = build_source(&config, logger.clone());
        Self::with_source(config, source, logger)
    }

    pub fn with_source(
        config: PredictorConfig,
        source: Arc<dyn DataSource>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store: ArtifactStore::new(logger.clone()),
            builder: ModelBuilder::new(config.clone(), source, logger.clone()),
            gate: SingleFlight::global(),
            config,
            artifact: RwLock::new(None),
            metrics: PredictorMetrics::new(),
            logger,
        }
    }

    /// Share a gate other than the process-wide one
    pub fn with_gate(mut self, gate: SingleFlight) -> Self {
        self.builder = self.builder.with_gate(gate.clone());
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        match self.current() {
            Some(_) => ServiceState::Ready,
            None => ServiceState::Uninitialized,
        }
    }

    /// Artifact currently served, if READY
    pub fn current(&self) -> Option<Arc<TrainedArtifact>> {
        self.artifact
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Load the stored artifact, building it first when absent.
    ///
    /// An unreadable artifact triggers one rebuild unless this call just built
    /// it; a second failure is returned. Calling again while READY reloads.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let path = self.config.artifact_path();
        let _guard = self.gate.acquire(&path).await;

        let mut outcome = LoadOutcome::Loaded;
        if !self.store.exists(&path) {
            self.builder.build_and_save_locked(&path).await?;
            outcome = LoadOutcome::Built;
        }

        let artifact = match self.read_artifact(&path).await {
            Ok(artifact) => artifact,
            Err(e) if e.is_artifact() && outcome == LoadOutcome::Loaded => {
                self.logger
                    .log_artifact_rebuild(&path.display().to_string(), &e.to_string());
                self.builder.build_and_save_locked(&path).await?;
                outcome = LoadOutcome::Rebuilt;
                self.read_artifact(&path).await?
            }
            Err(e) => return Err(e),
        };
        self.install(artifact);
        Ok(outcome)
    }

    /// Load the stored artifact without ever building one
    pub async fn load_existing(&self) -> Result<()> {
        let path = self.config.artifact_path();
        let _guard = self.gate.acquire(&path).await;
        let artifact = self.read_artifact(&path).await?;
        self.install(artifact);
        Ok(())
    }

    async fn read_artifact(&self, path: &Path) -> Result<TrainedArtifact> {
        let store = self.store.clone();
        let path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || store.load(&path))
            .await
            .map_err(|e| PredictorError::State(format!("artifact load task failed: {}", e)))?;
        self.metrics.record_artifact_load(result.is_ok());
        result
    }

    fn install(&self, artifact: TrainedArtifact) {
        self.metrics.set_model_info(
            &self.config.model_name,
            artifact.params().criterion.as_str(),
        );
        *self
            .artifact
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(artifact));
    }

    /// Estimated rent for an ordered 9-value feature vector
    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        let started = Instant::now();
        let result = match self.current() {
            Some(artifact) => {
                FeatureVector::from_slice(features).and_then(|v| artifact.predict(&v))
            }
            None => Err(PredictorError::State(
                "no model loaded; call load() first".into(),
            )),
        };

        match &result {
            Ok(rent) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.metrics.observe_prediction(elapsed);
                self.logger.log_prediction(*rent, elapsed);
            }
            Err(e) => {
                self.metrics.inc_prediction_errors(e.kind());
                self.logger.log_prediction_rejected(e.kind(), &e.to_string());
            }
        }
        result
    }

    pub fn predict_vector(&self, features: &FeatureVector) -> Result<f64> {
        self.predict(&features.to_array())
    }
}
