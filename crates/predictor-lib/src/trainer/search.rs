//! Exhaustive grid search scored by k-fold cross-validation

use super::forest::RandomForest;
use super::metrics::{mean_std, r2_score};
use super::ForestParams;
use crate::config::SearchGrid;
use crate::error::{PredictorError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;

/// Cross-validation result for one grid candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ForestParams,
    pub fold_scores: Vec<f64>,
    pub mean_r2: f64,
    pub std_r2: f64,
    /// 1 is best; equal means share a rank
    pub rank: usize,
}

/// Every candidate in grid order plus the winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
}

impl SearchReport {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }

    /// Candidates ordered by rank, grid order within a rank
    pub fn leaderboard(&self) -> Vec<&CandidateScore> {
        let mut ranked: Vec<&CandidateScore> = self.candidates.iter().collect();
        ranked.sort_by_key(|c| c.rank);
        ranked
    }
}

/// Cartesian product ordered by criterion, then max_depth, then n_estimators
pub fn grid_candidates(grid: &SearchGrid) -> Vec<ForestParams> {
    let mut candidates = Vec::with_capacity(grid.len());
    for &criterion in &grid.criteria {
        for &max_depth in &grid.max_depth {
            for &n_estimators in &grid.n_estimators {
                candidates.push(ForestParams {
                    n_estimators,
                    criterion,
                    max_depth,
                });
            }
        }
    }
    candidates
}

/// Contiguous, unshuffled test ranges; the first `n % k` folds get one extra row
pub fn kfold_ranges(n: usize, k: usize) -> Vec<Range<usize>> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

fn take_rows(x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

/// Aborts once `deadline` has passed
pub(crate) fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(PredictorError::Training(
            "training deadline exceeded".into(),
        )),
        _ => Ok(()),
    }
}

/// Score every candidate on every fold. Must run inside the caller's pool.
pub(crate) fn run(
    x: &Array2<f64>,
    y: &Array1<f64>,
    grid: &SearchGrid,
    folds: usize,
    seed: u64,
    deadline: Option<Instant>,
) -> Result<SearchReport> {
    let n = x.nrows();
    if folds < 2 {
        return Err(PredictorError::Training(format!(
            "cross-validation needs at least 2 folds, got {}",
            folds
        )));
    }
    if n < folds {
        return Err(PredictorError::Training(format!(
            "{} training rows cannot be split into {} folds",
            n, folds
        )));
    }
    let candidates = grid_candidates(grid);
    if candidates.is_empty() {
        return Err(PredictorError::Training("search grid is empty".into()));
    }

    let splits: Vec<(Vec<usize>, Vec<usize>)> = kfold_ranges(n, folds)
        .into_iter()
        .map(|test| {
            let train = (0..n).filter(|i| !test.contains(i)).collect();
            (train, test.collect())
        })
        .collect();

    let tasks: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..folds).map(move |f| (c, f)))
        .collect();

    let scores = tasks
        .into_par_iter()
        .map(|(c, f)| -> Result<f64> {
            check_deadline(deadline)?;
            let (train, test) = &splits[f];
            let (x_train, y_train) = take_rows(x, y, train);
            let (x_test, y_test) = take_rows(x, y, test);
            let forest = RandomForest::fit(x_train.view(), y_train.view(), candidates[c], seed)?;
            let pred = forest.predict(x_test.view());
            Ok(r2_score(&y_test.to_vec(), &pred.to_vec()))
        })
        .collect::<Result<Vec<f64>>>()?;

    let mut results: Vec<CandidateScore> = candidates
        .into_iter()
        .zip(scores.chunks(folds))
        .map(|(params, fold_scores)| {
            let (mean_r2, std_r2) = mean_std(fold_scores);
            CandidateScore {
                params,
                fold_scores: fold_scores.to_vec(),
                mean_r2,
                std_r2,
                rank: 0,
            }
        })
        .collect();

    let mut best_index = 0;
    for (i, c) in results.iter().enumerate() {
        if c.mean_r2 > results[best_index].mean_r2 {
            best_index = i;
        }
    }
    let means: Vec<f64> = results.iter().map(|c| c.mean_r2).collect();
    for c in &mut results {
        c.rank = 1 + means.iter().filter(|&&m| m > c.mean_r2).count();
    }

    Ok(SearchReport {
        candidates: results,
        best_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::SplitCriterion;

    #[test]
    fn test_kfold_ranges_cover_all_rows() {
        let ranges = kfold_ranges(12, 5);
        assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10, 10..12]);
    }

    #[test]
    fn test_kfold_ranges_even_split() {
        let ranges = kfold_ranges(80, 5);
        assert!(ranges.iter().all(|r| r.len() == 16));
    }

    #[test]
    fn test_grid_order() {
        let grid = SearchGrid {
            n_estimators: vec![50, 70],
            criteria: vec![SplitCriterion::SquaredError, SplitCriterion::Poisson],
            max_depth: vec![6, 8],
        };
        let candidates = grid_candidates(&grid);
        assert_eq!(candidates.len(), 8);
        assert_eq!(
            candidates[0],
            ForestParams { n_estimators: 50, criterion: SplitCriterion::SquaredError, max_depth: 6 }
        );
        assert_eq!(
            candidates[1],
            ForestParams { n_estimators: 70, criterion: SplitCriterion::SquaredError, max_depth: 6 }
        );
        assert_eq!(
            candidates[2],
            ForestParams { n_estimators: 50, criterion: SplitCriterion::SquaredError, max_depth: 8 }
        );
        assert_eq!(candidates[4].criterion, SplitCriterion::Poisson);
    }

    #[test]
    fn test_default_grid_has_36_candidates() {
        assert_eq!(grid_candidates(&SearchGrid::default()).len(), 36);
    }

    #[test]
    fn test_identical_candidates_keep_the_first() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = x.column(0).mapv(|v| 10.0 + v);
        let grid = SearchGrid {
            n_estimators: vec![5, 5],
            criteria: vec![SplitCriterion::SquaredError],
            max_depth: vec![3],
        };

        let report = run(&x, &y, &grid, 4, 42, None).unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[0].mean_r2, report.candidates[1].mean_r2);
        assert_eq!(report.best_index, 0);
        assert_eq!(report.candidates[0].rank, 1);
        assert_eq!(report.candidates[1].rank, 1);
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = Array1::<f64>::ones(3);
        let err = run(&x, &y, &SearchGrid::default(), 5, 42, None).unwrap_err();
        assert!(matches!(err, PredictorError::Training(_)));
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let err = run(&x, &y, &SearchGrid::default(), 5, 42, Some(Instant::now())).unwrap_err();
        assert!(matches!(err, PredictorError::Training(_)));
    }
}
