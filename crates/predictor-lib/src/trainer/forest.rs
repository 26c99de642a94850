//! Bagged ensemble of regression trees

use super::tree::DecisionTree;
use super::{ForestParams, SplitCriterion};
use crate::error::{PredictorError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest regressor; the prediction is the mean over trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit one tree per estimator on a seeded bootstrap sample
    ///
    /// Trees are grown on the current rayon pool. Tree `t` draws its sample
    /// from `seed + t`, so the result does not depend on scheduling.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: ForestParams,
        seed: u64,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(PredictorError::Training(format!(
                "cannot fit forest on {} rows with {} targets",
                n,
                y.len()
            )));
        }
        if params.n_estimators == 0 || params.max_depth == 0 {
            return Err(PredictorError::Training(format!(
                "invalid forest parameters {:?}",
                params
            )));
        }
        let y = y.to_vec();
        if params.criterion == SplitCriterion::Poisson {
            check_poisson_target(&y)?;
        }

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(x, &y, &sample, params.criterion, params.max_depth)
            })
            .collect();

        Ok(Self {
            params,
            n_features: x.ncols(),
            trees,
        })
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Structural check for a decoded forest; a fitted one always passes
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| format!("tree {}: {}", i, reason))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn clear_trees(&mut self) {
        self.trees.clear();
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(slice) => self.predict_row(slice),
                None => self.predict_row(&row.to_vec()),
            })
            .collect()
    }
}

fn check_poisson_target(y: &[f64]) -> Result<()> {
    if y.iter().any(|&v| v < 0.0) {
        return Err(PredictorError::Training(
            "poisson criterion requires a non-negative target".into(),
        ));
    }
    if y.iter().sum::<f64>() <= 0.0 {
        return Err(PredictorError::Training(
            "poisson criterion requires a target with positive sum".into(),
        ));
    }
    Ok(())
}
