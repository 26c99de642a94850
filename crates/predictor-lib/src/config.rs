//! Predictor configuration
//!
//! One `PredictorConfig` value is loaded at process start and threaded through
//! every component. Nothing in the pipeline reads process-wide settings.

use crate::error::{PredictorError, Result};
use crate::trainer::SplitCriterion;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix (`RENT_MODEL_NAME`, `RENT_TRAINING__SEED`, ...)
pub const ENV_PREFIX: &str = "RENT";

/// Optional config file, any format the `config` crate recognises
pub const CONFIG_FILE: &str = "config/predictor";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Directory holding the model artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Artifact file name inside `model_path`
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub data_source: DataSourceConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where raw listings come from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataSourceConfig {
    Csv {
        path: PathBuf,
    },
    Sqlite {
        url: String,
        #[serde(default = "default_table")]
        table: String,
    },
}

/// Training pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Held-out share of rows
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Seed for the train/test split and forest bootstrap
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Worker threads for the search; 0 means all available cores
    #[serde(default)]
    pub max_parallelism: usize,

    /// Abort training after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    #[serde(default)]
    pub grid: SearchGrid,
}

/// Hyperparameter grid searched exhaustively
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchGrid {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: Vec<usize>,

    #[serde(default = "default_criteria")]
    pub criteria: Vec<SplitCriterion>,

    #[serde(default = "default_max_depth")]
    pub max_depth: Vec<usize>,
}

/// HTTP surface of the service binary
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_name() -> String {
    "rent_apartment_model.bin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_table() -> String {
    "rent_apartments".to_string()
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    5
}

fn default_n_estimators() -> Vec<usize> {
    vec![50, 70, 90]
}

fn default_criteria() -> Vec<SplitCriterion> {
    SplitCriterion::ALL.to_vec()
}

fn default_max_depth() -> Vec<usize> {
    vec![6, 8, 10]
}

fn default_port() -> u16 {
    8080
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        DataSourceConfig::Csv {
            path: PathBuf::from("data/rent_apartments.csv"),
        }
    }
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            criteria: default_criteria(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            cv_folds: default_cv_folds(),
            max_parallelism: 0,
            deadline_secs: None,
            grid: SearchGrid::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            model_name: default_model_name(),
            log_level: default_log_level(),
            data_source: DataSourceConfig::default(),
            training: TrainingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SearchGrid {
    /// Number of candidate configurations
    pub fn len(&self) -> usize {
        self.n_estimators.len() * self.criteria.len() * self.max_depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrainingConfig {
    /// Effective worker count for the search
    pub fn parallelism(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match self.max_parallelism {
            0 => cores,
            n => n.min(cores),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl PredictorConfig {
    /// Load from the optional config file and `RENT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("training.grid.n_estimators")
                    .with_list_parse_key("training.grid.criteria")
                    .with_list_parse_key("training.grid.max_depth"),
            )
            .build()?;

        let loaded: PredictorConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(PredictorError::Config("model_name must not be empty".into()));
        }
        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(PredictorError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                t.test_fraction
            )));
        }
        if t.cv_folds < 2 {
            return Err(PredictorError::Config(format!(
                "cv_folds must be at least 2, got {}",
                t.cv_folds
            )));
        }
        if t.grid.is_empty() {
            return Err(PredictorError::Config("search grid is empty".into()));
        }
        if t.grid.n_estimators.contains(&0) || t.grid.max_depth.contains(&0) {
            return Err(PredictorError::Config(
                "n_estimators and max_depth values must be positive".into(),
            ));
        }
        if let DataSourceConfig::Sqlite { table, .. } = &self.data_source {
            crate::data::validate_identifier(table)?;
        }
        Ok(())
    }

    /// Full path of the artifact: `<model_path>/<model_name>`
    pub fn artifact_path(&self) -> PathBuf {
        self.model_path.join(&self.model_name)
    }
}
