//! Startup model load and its effect on health

use predictor_lib::{
    health::{components, HealthRegistry},
    LoadOutcome, PredictionService, PredictorError,
};
use tracing::{error, info, warn};

/// Component a load failure is attributed to
pub fn component_for(err: &PredictorError) -> &'static str {
    match err {
        PredictorError::DataAccess(_) => components::DATA_SOURCE,
        PredictorError::Schema(_) | PredictorError::Training(_) => components::TRAINER,
        PredictorError::Artifact(_) => components::ARTIFACT_STORE,
        PredictorError::SchemaMismatch { .. }
        | PredictorError::State(_)
        | PredictorError::Config(_) => components::PREDICTOR,
    }
}

/// Register every pipeline component as healthy and not ready
pub async fn register_components(registry: &HealthRegistry) {
    registry.register_pipeline().await;
}

/// Run load-or-build and publish the outcome to the health registry
pub async fn load_model(
    service: &PredictionService,
    registry: &HealthRegistry,
) -> predictor_lib::Result<LoadOutcome> {
    match service.load().await {
        Ok(outcome) => {
            registry.record_load(outcome).await;
            if outcome == LoadOutcome::Rebuilt {
                warn!(
                    component = components::ARTIFACT_STORE,
                    "Stored artifact was unusable and has been rebuilt"
                );
            }
            if let Some(artifact) = service.current() {
                let meta = artifact.metadata();
                info!(
                    outcome = outcome.as_str(),
                    criterion = %meta.params.criterion,
                    max_depth = meta.params.max_depth,
                    n_estimators = meta.params.n_estimators,
                    test_r2 = meta.test_r2,
                    "Model ready"
                );
            }
            Ok(outcome)
        }
        Err(e) => {
            let component = component_for(&e);
            error!(component = component, kind = e.kind(), error = %e, "Model load failed");
            registry.record_failure(component, e.to_string()).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use predictor_lib::ArtifactError;
    use std::path::PathBuf;

    #[test]
    fn test_component_attribution() {
        assert_eq!(
            component_for(&PredictorError::DataAccess("empty".into())),
            components::DATA_SOURCE
        );
        assert_eq!(
            component_for(&PredictorError::Schema("bad garden".into())),
            components::TRAINER
        );
        assert_eq!(
            component_for(&ArtifactError::NotFound(PathBuf::from("m.bin")).into()),
            components::ARTIFACT_STORE
        );
        assert_eq!(
            component_for(&PredictorError::State("not loaded".into())),
            components::PREDICTOR
        );
    }
}
