//! Artifact persistence
//!
//! One file per configured name. The file is a bincode envelope carrying a
//! magic tag, a format version and the sha256 of the payload; every check has
//! to pass before the payload is decoded. Writes go to a temporary sibling
//! which is synced and renamed over the target, so readers see either the old
//! or the new artifact.

use crate::error::{ArtifactError, PredictorError, Result};
use crate::models::{FeatureVector, FEATURE_COLUMNS};
use crate::observability::StructuredLogger;
use crate::trainer::{ForestParams, RandomForest, TrainingOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const MAGIC: [u8; 8] = *b"RENTRFv1";

/// Bumped whenever the payload layout changes
pub const FORMAT_VERSION: u32 = 1;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Facts about how the stored model was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub params: ForestParams,
    /// Mean cross-validated R² of the chosen configuration
    pub cv_r2: f64,
    /// R² on the held-out partition
    pub test_r2: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub crate_version: String,
}

/// Fitted forest plus the metadata it was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    model: RandomForest,
    metadata: ArtifactMetadata,
}

impl TrainedArtifact {
    pub fn new(model: RandomForest, metadata: ArtifactMetadata) -> Self {
        Self { model, metadata }
    }

    pub fn from_outcome(outcome: TrainingOutcome) -> Self {
        let metadata = ArtifactMetadata {
            params: outcome.params(),
            cv_r2: outcome.cv_r2(),
            test_r2: outcome.test_r2,
            train_rows: outcome.train_rows,
            test_rows: outcome.test_rows,
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            created_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        Self::new(outcome.model, metadata)
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn params(&self) -> ForestParams {
        self.metadata.params
    }

    pub fn model(&self) -> &RandomForest {
        &self.model
    }

    /// Estimated rent for one apartment
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        self.check_schema()?;
        Ok(self.model.predict_row(&features.to_array()))
    }

    /// The stored column list must match the compiled-in one
    fn check_schema(&self) -> Result<()> {
        let stored = &self.metadata.feature_columns;
        if stored.len() != FEATURE_COLUMNS.len()
            || stored.iter().zip(FEATURE_COLUMNS).any(|(a, b)| a != b)
            || self.model.n_features() != FEATURE_COLUMNS.len()
        {
            return Err(PredictorError::SchemaMismatch {
                expected: FEATURE_COLUMNS.join(", "),
                actual: stored.join(", "),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 8],
    format_version: u32,
    checksum: String,
    payload: Vec<u8>,
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reads and writes artifacts on the local filesystem
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    logger: StructuredLogger,
}

impl ArtifactStore {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Serialize and atomically replace whatever is at `path`
    pub fn save(&self, artifact: &TrainedArtifact, path: &Path) -> Result<()> {
        let payload = bincode::serialize(artifact).map_err(|e| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("failed to encode model: {}", e),
        })?;
        let envelope = Envelope {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            checksum: compute_checksum(&payload),
            payload,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("failed to encode envelope: {}", e),
        })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ArtifactError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        write_atomic(path, &bytes)?;

        self.logger
            .log_artifact_saved(&path.display().to_string(), bytes.len());
        Ok(())
    }

    /// Read, verify and decode the artifact at `path`
    pub fn load(&self, path: &Path) -> Result<TrainedArtifact> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(path.to_path_buf()).into())
            }
            Err(source) => {
                return Err(ArtifactError::Read {
                    path: path.to_path_buf(),
                    source,
                }
                .into())
            }
        };

        let corrupt = |reason: String| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let envelope: Envelope = bincode::deserialize(&bytes)
            .map_err(|e| corrupt(format!("unreadable envelope: {}", e)))?;
        if envelope.magic != MAGIC {
            return Err(corrupt("not a rent model artifact".into()).into());
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} is not supported (expected {})",
                envelope.format_version, FORMAT_VERSION
            ))
            .into());
        }
        if compute_checksum(&envelope.payload) != envelope.checksum {
            return Err(corrupt("checksum mismatch".into()).into());
        }
        let artifact: TrainedArtifact = bincode::deserialize(&envelope.payload)
            .map_err(|e| corrupt(format!("unreadable model: {}", e)))?;
        artifact
            .model
            .validate()
            .map_err(|reason| corrupt(format!("malformed model: {}", reason)))?;
        artifact
            .check_schema()
            .map_err(|e| corrupt(format!("stale feature schema: {}", e)))?;

        self.logger.log_artifact_loaded(
            &path.display().to_string(),
            artifact.params().criterion.as_str(),
            &artifact.metadata().created_at.to_rfc3339(),
        );
        Ok(artifact)
    }
}

/// Write to a unique temporary sibling, sync, then rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(path);
    let write_err = |source| ArtifactError::Write {
        path: temp_path.clone(),
        source,
    };

    let result = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .map_err(write_err)
        .and_then(|_| {
            fs::rename(&temp_path, path).map_err(|source| ArtifactError::Write {
                path: path.to_path_buf(),
                source,
            })
        });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    Ok(result?)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::SplitCriterion;
    use ndarray::{Array1, Array2};
    use tempfile::TempDir;

    fn store() -> ArtifactStore {
        ArtifactStore::new(StructuredLogger::new("test"))
    }

    fn sample_artifact() -> TrainedArtifact {
        let x = Array2::from_shape_fn((30, 9), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| 500.0 + 10.0 * r.sum()).collect();
        let params = ForestParams {
            n_estimators: 5,
            criterion: SplitCriterion::SquaredError,
            max_depth: 4,
        };
        let model = RandomForest::fit(x.view(), y.view(), params, 42).unwrap();
        TrainedArtifact::new(
            model,
            ArtifactMetadata {
                params,
                cv_r2: 0.5,
                test_r2: 0.6,
                train_rows: 24,
                test_rows: 6,
                feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                created_at: Utc::now(),
                crate_version: "test".into(),
            },
        )
    }

    fn vector() -> FeatureVector {
        FeatureVector::from_slice(&[85.0, 2015.0, 2.0, 20.0, 1.0, 1.0, 0.0, 0.0, 1.0]).unwrap()
    }

    #[test]
    fn test_save_then_load_predicts_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/model.bin");
        let artifact = sample_artifact();

        store().save(&artifact, &path).unwrap();
        assert!(store().exists(&path));
        let loaded = store().load(&path).unwrap();

        assert_eq!(loaded, artifact);
        assert_eq!(loaded.predict(&vector()).unwrap(), artifact.predict(&vector()).unwrap());
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        store().save(&sample_artifact(), &path).unwrap();
        store().save(&sample_artifact(), &path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(!store().exists(&path));
        let err = store().load(&path).unwrap_err();
        assert!(matches!(err, PredictorError::Artifact(ArtifactError::NotFound(_))));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"definitely not a model").unwrap();

        let err = store().load(&path).unwrap_err();
        assert!(matches!(err, PredictorError::Artifact(ArtifactError::Corrupt { .. })));
    }

    #[test]
    fn test_flipped_payload_byte_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        store().save(&sample_artifact(), &path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        match store().load(&path).unwrap_err() {
            PredictorError::Artifact(ArtifactError::Corrupt { reason, .. }) => {
                assert_eq!(reason, "checksum mismatch")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stale_schema_is_corrupt_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        let mut artifact = sample_artifact();
        artifact.metadata.feature_columns.swap(0, 1);
        store().save(&artifact, &path).unwrap();

        match store().load(&path).unwrap_err() {
            PredictorError::Artifact(ArtifactError::Corrupt { reason, .. }) => {
                assert!(reason.starts_with("stale feature schema"), "{}", reason)
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_forest_is_corrupt_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        let mut artifact = sample_artifact();
        artifact.model.clear_trees();
        store().save(&artifact, &path).unwrap();

        match store().load(&path).unwrap_err() {
            PredictorError::Artifact(ArtifactError::Corrupt { reason, .. }) => {
                assert_eq!(reason, "malformed model: forest has no trees")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stale_schema_is_rejected_at_predict() {
        let mut artifact = sample_artifact();
        artifact.metadata.feature_columns.swap(0, 1);
        assert!(matches!(
            artifact.predict(&vector()),
            Err(PredictorError::SchemaMismatch { .. })
        ));
    }
}
