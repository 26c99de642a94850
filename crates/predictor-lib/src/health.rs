//! Pipeline health for the service binary
//!
//! One entry per pipeline component. A load attempt moves every component at
//! once: success marks them healthy (the artifact store degraded if its file
//! had to be rebuilt), failure marks the component the error came from.
//! Readiness additionally requires a model to be installed.

use crate::service::LoadOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but something needed repair on the way
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    /// How the served model was obtained, once one is installed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_load: Option<String>,
}

impl HealthResponse {
    /// Worst component status; healthy when nothing is registered
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Pipeline component names
pub mod components {
    pub const DATA_SOURCE: &str = "data_source";
    pub const TRAINER: &str = "trainer";
    pub const ARTIFACT_STORE: &str = "artifact_store";
    pub const PREDICTOR: &str = "predictor";

    pub const ALL: [&str; 4] = [DATA_SOURCE, TRAINER, ARTIFACT_STORE, PREDICTOR];
}

#[derive(Debug, Default)]
struct State {
    components: HashMap<String, ComponentHealth>,
    last_load: Option<LoadOutcome>,
}

/// Shared between the load task and the HTTP handlers
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pipeline component healthy, no model installed
    pub async fn register_pipeline(&self) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state
                .components
                .insert(name.to_string(), ComponentHealth::healthy());
        }
        state.last_load = None;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    /// A model is installed; a rebuilt artifact leaves the store degraded
    pub async fn record_load(&self, outcome: LoadOutcome) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            let health = match outcome {
                LoadOutcome::Rebuilt if name == components::ARTIFACT_STORE => {
                    ComponentHealth::degraded("stored artifact was unusable and has been rebuilt")
                }
                _ => ComponentHealth::healthy(),
            };
            state.components.insert(name.to_string(), health);
        }
        state.last_load = Some(outcome);
    }

    /// Load failed in `component`; the previously installed model, if any, keeps serving
    pub async fn record_failure(&self, component: &str, message: impl Into<String>) {
        self.update(component, ComponentHealth::unhealthy(message))
            .await;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(&state.components),
            components: state.components.clone(),
            last_load: state.last_load.map(|o| o.as_str().to_string()),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if state.last_load.is_none() {
            Some("Model not yet loaded")
        } else if HealthResponse::compute_status(&state.components) == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy")
        } else {
            None
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.register_pipeline().await;
        registry
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy_and_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_registered_pipeline_waits_for_a_model() {
        let registry = registry().await;
        let health = registry.health().await;
        assert_eq!(health.components.len(), components::ALL.len());
        assert_eq!(health.last_load, None);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Model not yet loaded"));
    }

    #[tokio::test]
    async fn test_plain_load_is_healthy_and_ready() {
        let registry = registry().await;
        registry.record_load(LoadOutcome::Built).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.last_load.as_deref(), Some("built"));
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_rebuilt_artifact_degrades_store_but_stays_ready() {
        let registry = registry().await;
        registry.record_load(LoadOutcome::Rebuilt).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::ARTIFACT_STORE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::PREDICTOR].status,
            ComponentStatus::Healthy
        );
        assert!(registry.readiness().await.ready);

        registry.record_load(LoadOutcome::Loaded).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failure_marks_component_and_blocks_readiness() {
        let registry = registry().await;
        registry.record_load(LoadOutcome::Loaded).await;
        registry
            .record_failure(components::DATA_SOURCE, "no listings found")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            health.components[components::DATA_SOURCE].message.as_deref(),
            Some("no listings found")
        );

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Critical component unhealthy"));
    }

    #[test]
    fn test_worst_status_wins() {
        let mut components = HashMap::new();
        components.insert("a".to_string(), ComponentHealth::healthy());
        components.insert("b".to_string(), ComponentHealth::degraded("slow"));
        assert_eq!(HealthResponse::compute_status(&components), ComponentStatus::Degraded);

        components.insert("c".to_string(), ComponentHealth::unhealthy("down"));
        assert_eq!(HealthResponse::compute_status(&components), ComponentStatus::Unhealthy);
    }
}
