//! Observability infrastructure for the rent predictor
//!
//! Provides:
//! - Prometheus metrics (training runs and duration, held-out R², prediction latency)
//! - Structured JSON logging with tracing through an explicit logger handle

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for single predictions (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Histogram buckets for a full build (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PredictorMetricsInner> = OnceLock::new();

struct PredictorMetricsInner {
    training_runs: IntCounterVec,
    training_duration_seconds: Histogram,
    test_r2: Gauge,
    prediction_latency_seconds: Histogram,
    predictions: IntCounter,
    prediction_errors: IntCounterVec,
    artifact_loads: IntCounterVec,
    model_info: GaugeVec,
}

impl PredictorMetricsInner {
    fn new() -> Self {
        Self {
            training_runs: register_int_counter_vec!(
                "rent_predictor_training_runs_total",
                "Model builds by outcome",
                &["outcome"]
            )
            .expect("Failed to register training_runs_total"),

            training_duration_seconds: register_histogram!(
                "rent_predictor_training_duration_seconds",
                "Wall time of a full fetch, prepare, search and fit run",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            test_r2: register_gauge!(
                "rent_predictor_test_r2",
                "Held-out R² of the most recently built model"
            )
            .expect("Failed to register test_r2"),

            prediction_latency_seconds: register_histogram!(
                "rent_predictor_prediction_latency_seconds",
                "Time spent evaluating the forest for one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions: register_int_counter!(
                "rent_predictor_predictions_total",
                "Total number of predictions served"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "rent_predictor_prediction_errors_total",
                "Rejected prediction requests by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            artifact_loads: register_int_counter_vec!(
                "rent_predictor_artifact_loads_total",
                "Artifact load attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register artifact_loads_total"),

            model_info: register_gauge_vec!(
                "rent_predictor_model_info",
                "Information about the currently loaded model",
                &["model", "criterion"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Predictor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PredictorMetrics {
    _private: (),
}

impl Default for PredictorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PredictorMetricsInner {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new)
    }

    /// Record a finished build
    pub fn record_training(&self, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().training_runs.with_label_values(&[outcome]).inc();
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn set_test_r2(&self, r2: f64) {
        self.inner().test_r2.set(r2);
    }

    /// Record a served prediction
    pub fn observe_prediction(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
        self.inner().predictions.inc();
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner().prediction_errors.with_label_values(&[kind]).inc();
    }

    pub fn record_artifact_load(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().artifact_loads.with_label_values(&[outcome]).inc();
    }

    /// Replace the loaded model labels
    pub fn set_model_info(&self, model: &str, criterion: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[model, criterion])
            .set(1.0);
    }
}

/// Structured logger for pipeline events
///
/// Passed explicitly into every component; carries the artifact name so all
/// events from one service instance can be correlated.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    model_name: String,
}

impl StructuredLogger {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn log_build_started(&self, source: &str) {
        info!(
            event = "build_started",
            model = %self.model_name,
            source = %source,
            "Building model from source data"
        );
    }

    pub fn log_data_fetch_started(&self, source: &str) {
        info!(
            event = "data_fetch_started",
            model = %self.model_name,
            source = %source,
            "Fetching raw listings"
        );
    }

    pub fn log_data_fetched(&self, source: &str, rows: usize) {
        info!(
            event = "data_fetched",
            model = %self.model_name,
            source = %source,
            rows = rows,
            "Fetched raw listings"
        );
    }

    pub fn log_features_prepared(&self, rows: usize, columns: usize) {
        info!(
            event = "features_prepared",
            model = %self.model_name,
            rows = rows,
            columns = columns,
            "Prepared feature matrix"
        );
    }

    pub fn log_search_completed(
        &self,
        candidates: usize,
        criterion: &str,
        max_depth: usize,
        n_estimators: usize,
        cv_r2: f64,
        elapsed_secs: f64,
    ) {
        info!(
            event = "search_completed",
            model = %self.model_name,
            candidates = candidates,
            criterion = %criterion,
            max_depth = max_depth,
            n_estimators = n_estimators,
            cv_r2 = cv_r2,
            elapsed_secs = elapsed_secs,
            "Grid search selected best configuration"
        );
    }

    pub fn log_model_evaluated(&self, test_r2: f64, train_rows: usize, test_rows: usize) {
        info!(
            event = "model_evaluated",
            model = %self.model_name,
            test_r2 = test_r2,
            train_rows = train_rows,
            test_rows = test_rows,
            "Evaluated model on held-out rows"
        );
    }

    pub fn log_build_failed(&self, kind: &str, error: &str) {
        warn!(
            event = "build_failed",
            model = %self.model_name,
            kind = %kind,
            error = %error,
            "Model build failed"
        );
    }

    pub fn log_artifact_saved(&self, path: &str, bytes: usize) {
        info!(
            event = "artifact_saved",
            model = %self.model_name,
            path = %path,
            bytes = bytes,
            "Model artifact written"
        );
    }

    pub fn log_artifact_loaded(&self, path: &str, criterion: &str, created_at: &str) {
        info!(
            event = "artifact_loaded",
            model = %self.model_name,
            path = %path,
            criterion = %criterion,
            created_at = %created_at,
            "Model artifact loaded"
        );
    }

    /// An unreadable artifact is being replaced by a fresh build
    pub fn log_artifact_rebuild(&self, path: &str, reason: &str) {
        warn!(
            event = "artifact_rebuild",
            model = %self.model_name,
            path = %path,
            reason = %reason,
            "Artifact unreadable, rebuilding once"
        );
    }

    pub fn log_prediction(&self, rent: f64, latency_secs: f64) {
        info!(
            event = "prediction_served",
            model = %self.model_name,
            rent = rent,
            latency_secs = latency_secs,
            "Served rent prediction"
        );
    }

    pub fn log_prediction_rejected(&self, kind: &str, error: &str) {
        warn!(
            event = "prediction_rejected",
            model = %self.model_name,
            kind = %kind,
            error = %error,
            "Rejected prediction request"
        );
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            model = %self.model_name,
            version = %version,
            port = port,
            "Rent predictor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            model = %self.model_name,
            reason = %reason,
            "Rent predictor shutting down"
        );
    }
}
