//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use predictor_lib::{
    format_currency,
    health::{ComponentStatus, HealthRegistry},
    FeatureVector, PredictionService, PredictorError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Message returned for any core failure; details stay in the logs
pub const PREDICTION_FAILED: &str = "Unable to estimate rent for this apartment";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, service: Arc<PredictionService>) -> Self {
        Self {
            health_registry,
            service,
        }
    }
}

/// One apartment, features named as in the model schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub area: f64,
    pub construction_year: f64,
    pub bedrooms: f64,
    /// Garden area in m², 0 when there is none
    pub garden: f64,
    #[serde(default)]
    pub balcony: u8,
    #[serde(default)]
    pub storage: u8,
    #[serde(default)]
    pub parking: u8,
    #[serde(default)]
    pub furnished: u8,
    #[serde(default)]
    pub garage: u8,
}

impl PredictRequest {
    /// Ordered values; indicator domains are checked by the service
    pub fn to_features(&self) -> [f64; 9] {
        FeatureVector {
            area: self.area,
            construction_year: self.construction_year,
            bedrooms: self.bedrooms,
            garden: self.garden,
            balcony: self.balcony,
            storage: self.storage,
            parking: self.parking,
            furnished: self.furnished,
            garage: self.garage,
        }
        .to_array()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub rent: f64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Status code for a core error surfaced by `/predict`
pub fn status_for(err: &PredictorError) -> StatusCode {
    match err {
        PredictorError::State(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictorError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once a model is loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Estimate the monthly rent of one apartment
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Response {
    match state.service.predict(&request.to_features()) {
        Ok(rent) => (
            StatusCode::OK,
            Json(PredictResponse {
                rent,
                formatted: format_currency(rent),
            }),
        )
            .into_response(),
        Err(e) => (
            status_for(&e),
            Json(ErrorResponse {
                error: PREDICTION_FAILED.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .with_state(state)
}

/// Start the API server, stopping once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use predictor_lib::ArtifactError;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&PredictorError::State("not loaded".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&PredictorError::SchemaMismatch {
                expected: "9 values".into(),
                actual: "8 values".into(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ArtifactError::NotFound(PathBuf::from("m.bin")).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_defaults_missing_amenities_to_zero() {
        let request: PredictRequest = serde_json::from_str(
            r#"{"area": 85, "construction_year": 2015, "bedrooms": 2, "garden": 20, "garage": 1}"#,
        )
        .unwrap();
        assert_eq!(
            request.to_features(),
            [85.0, 2015.0, 2.0, 20.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }
}
