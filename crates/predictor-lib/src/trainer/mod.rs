//! Model training
//!
//! Splits the prepared data into train and test partitions, searches the
//! hyperparameter grid with k-fold cross-validation on a bounded rayon pool,
//! refits the winner on the full training partition and scores it on the
//! held-out rows.

mod forest;
pub mod metrics;
pub mod search;
mod split;
mod tree;

pub use forest::RandomForest;
pub use search::{CandidateScore, SearchReport};
pub use tree::DecisionTree;

use crate::config::TrainingConfig;
use crate::error::{PredictorError, Result};
use crate::features::Dataset;
use crate::observability::StructuredLogger;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Impurity measure used to choose splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    SquaredError,
    Poisson,
    AbsoluteError,
    FriedmanMse,
}

impl SplitCriterion {
    pub const ALL: [SplitCriterion; 4] = [
        SplitCriterion::SquaredError,
        SplitCriterion::Poisson,
        SplitCriterion::AbsoluteError,
        SplitCriterion::FriedmanMse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitCriterion::SquaredError => "squared_error",
            SplitCriterion::Poisson => "poisson",
            SplitCriterion::AbsoluteError => "absolute_error",
            SplitCriterion::FriedmanMse => "friedman_mse",
        }
    }
}

impl fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of the search grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub criterion: SplitCriterion,
    pub max_depth: usize,
}

/// Train/test partition of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

/// Everything a build produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: RandomForest,
    pub report: SearchReport,
    pub test_r2: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl TrainingOutcome {
    pub fn params(&self) -> ForestParams {
        self.model.params()
    }

    pub fn cv_r2(&self) -> f64 {
        self.report.best().mean_r2
    }
}

pub struct ModelTrainer {
    config: TrainingConfig,
    logger: StructuredLogger,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig, logger: StructuredLogger) -> Self {
        Self { config, logger }
    }

    /// Split, search, refit and evaluate
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome> {
        let deadline = self.config.deadline().map(|d| Instant::now() + d);
        let split = self.split(&dataset.features, &dataset.target)?;
        let (model, report) = self.search_with_deadline(&split.x_train, &split.y_train, deadline)?;
        let test_r2 = self.evaluate(&model, &split.x_test, &split.y_test)?;
        self.logger
            .log_model_evaluated(test_r2, split.x_train.nrows(), split.x_test.nrows());

        Ok(TrainingOutcome {
            model,
            report,
            test_r2,
            train_rows: split.x_train.nrows(),
            test_rows: split.x_test.nrows(),
        })
    }

    /// Seeded shuffle, then the first `ceil(n * test_fraction)` rows are held out
    pub fn split(&self, features: &Array2<f64>, target: &Array1<f64>) -> Result<DataSplit> {
        validate_inputs(features, target)?;
        let n = features.nrows();
        let n_test = (n as f64 * self.config.test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(PredictorError::Training(format!(
                "{} rows are too few for a {} test split",
                n, self.config.test_fraction
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        order.shuffle(&mut rng);
        let (test, train) = order.split_at(n_test);

        Ok(DataSplit {
            x_train: features.select(Axis(0), train),
            y_train: target.select(Axis(0), train),
            x_test: features.select(Axis(0), test),
            y_test: target.select(Axis(0), test),
        })
    }

    /// Grid search with cross-validation, then refit the winner on all of `x_train`
    pub fn search_and_fit(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
    ) -> Result<(RandomForest, SearchReport)> {
        let deadline = self.config.deadline().map(|d| Instant::now() + d);
        self.search_with_deadline(x_train, y_train, deadline)
    }

    fn search_with_deadline(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        deadline: Option<Instant>,
    ) -> Result<(RandomForest, SearchReport)> {
        validate_inputs(x_train, y_train)?;
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism())
            .build()
            .map_err(|e| PredictorError::Training(format!("failed to start search pool: {}", e)))?;

        let (model, report) = pool.install(|| -> Result<_> {
            let report = search::run(
                x_train,
                y_train,
                &self.config.grid,
                self.config.cv_folds,
                self.config.seed,
                deadline,
            )?;
            search::check_deadline(deadline)?;
            let model = RandomForest::fit(
                x_train.view(),
                y_train.view(),
                report.best().params,
                self.config.seed,
            )?;
            Ok((model, report))
        })?;

        let best = report.best();
        self.logger.log_search_completed(
            report.candidates.len(),
            best.params.criterion.as_str(),
            best.params.max_depth,
            best.params.n_estimators,
            best.mean_r2,
            started.elapsed().as_secs_f64(),
        );
        Ok((model, report))
    }

    /// R² on held-out rows; reported, never used as a gate
    pub fn evaluate(
        &self,
        model: &RandomForest,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<f64> {
        validate_inputs(x_test, y_test)?;
        if x_test.ncols() != model.n_features() {
            return Err(PredictorError::Training(format!(
                "model expects {} features, got {}",
                model.n_features(),
                x_test.ncols()
            )));
        }
        let pred = model.predict(x_test.view());
        Ok(metrics::r2_score(&y_test.to_vec(), &pred.to_vec()))
    }
}

/// Reject empty, ragged or non-finite training input
fn validate_inputs(features: &Array2<f64>, target: &Array1<f64>) -> Result<()> {
    if features.nrows() == 0 || features.ncols() == 0 {
        return Err(PredictorError::Training("feature matrix is empty".into()));
    }
    if features.nrows() != target.len() {
        return Err(PredictorError::Training(format!(
            "feature matrix has {} rows but target has {}",
            features.nrows(),
            target.len()
        )));
    }
    if features.iter().chain(target.iter()).any(|v| !v.is_finite()) {
        return Err(PredictorError::Training(
            "training data contains non-numeric values".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
