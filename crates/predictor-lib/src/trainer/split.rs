//! Best-split search for regression trees
//!
//! Every feature is scanned in sorted order; candidate thresholds sit halfway
//! between consecutive distinct values. A split is accepted only when it
//! strictly decreases the node impurity.

use super::SplitCriterion;
use ndarray::ArrayView2;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Relative tolerance below which an impurity decrease counts as zero
const MIN_RELATIVE_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Split {
    pub feature: usize,
    pub threshold: f64,
    pub decrease: f64,
}

/// Best split of the rows in `indices`, if any improves the node
pub(crate) fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    indices: &[usize],
    criterion: SplitCriterion,
) -> Option<Split> {
    let mut best: Option<Split> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(indices.len());

    for feature in 0..x.ncols() {
        sorted.clear();
        sorted.extend(indices.iter().map(|&i| (x[[i, feature]], y[i])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((pos, decrease)) = scan(&sorted, criterion) {
            if best.map_or(true, |b| decrease > b.decrease) {
                best = Some(Split {
                    feature,
                    threshold: midpoint(sorted[pos].0, sorted[pos + 1].0),
                    decrease,
                });
            }
        }
    }
    best
}

/// Threshold between two distinct sorted values; rows `<= threshold` go left
fn midpoint(a: f64, b: f64) -> f64 {
    let mid = a + (b - a) / 2.0;
    if mid >= b {
        a
    } else {
        mid
    }
}

/// Best position `k` (left = `..=k`) and its impurity decrease
fn scan(sorted: &[(f64, f64)], criterion: SplitCriterion) -> Option<(usize, f64)> {
    let n = sorted.len();
    if n < 2 {
        return None;
    }
    let ys: Vec<f64> = sorted.iter().map(|&(_, y)| y).collect();
    let scanner = Scanner::new(&ys, criterion)?;

    let mut best: Option<(usize, f64)> = None;
    for k in 0..n - 1 {
        if sorted[k].0 == sorted[k + 1].0 {
            continue;
        }
        if let Some(decrease) = scanner.decrease(k) {
            if decrease > scanner.tolerance && best.map_or(true, |(_, d)| decrease > d) {
                best = Some((k, decrease));
            }
        }
    }
    best
}

/// Impurity bookkeeping for one feature in sorted order
struct Scanner {
    criterion: SplitCriterion,
    n: usize,
    /// Running sums of y
    prefix: Vec<f64>,
    /// Absolute deviation of rows `..=k` and `k..` around their medians
    abs_left: Vec<f64>,
    abs_right: Vec<f64>,
    parent: f64,
    tolerance: f64,
}

impl Scanner {
    /// `None` when the node cannot be scored at all (Poisson with zero sum)
    fn new(ys: &[f64], criterion: SplitCriterion) -> Option<Self> {
        let n = ys.len();
        let prefix: Vec<f64> = ys
            .iter()
            .scan(0.0, |acc, &y| {
                *acc += y;
                Some(*acc)
            })
            .collect();

        let (abs_left, abs_right) = if criterion == SplitCriterion::AbsoluteError {
            let left = prefix_abs_deviation(ys.iter().copied());
            let mut right = prefix_abs_deviation(ys.iter().rev().copied());
            right.reverse();
            (left, right)
        } else {
            (Vec::new(), Vec::new())
        };

        let total = prefix[n - 1];
        let parent = match criterion {
            SplitCriterion::SquaredError => total * total / n as f64,
            SplitCriterion::Poisson => poisson_term(total, n)?,
            SplitCriterion::AbsoluteError => abs_left[n - 1],
            // improvement is computed from the children alone
            SplitCriterion::FriedmanMse => 0.0,
        };

        Some(Self {
            criterion,
            n,
            prefix,
            abs_left,
            abs_right,
            parent,
            tolerance: MIN_RELATIVE_DECREASE * (parent.abs() + 1.0),
        })
    }

    /// Decrease for left = rows `0..=k`, right = rows `k+1..n`
    fn decrease(&self, k: usize) -> Option<f64> {
        let n_left = k + 1;
        let n_right = self.n - n_left;
        let s_left = self.prefix[k];
        let s_right = self.prefix[self.n - 1] - s_left;

        match self.criterion {
            SplitCriterion::SquaredError => Some(
                s_left * s_left / n_left as f64 + s_right * s_right / n_right as f64 - self.parent,
            ),
            SplitCriterion::FriedmanMse => {
                let (nl, nr) = (n_left as f64, n_right as f64);
                let diff = s_left / nl - s_right / nr;
                Some(nl * nr / (nl + nr) * diff * diff)
            }
            SplitCriterion::Poisson => {
                let left = poisson_term(s_left, n_left)?;
                let right = poisson_term(s_right, n_right)?;
                Some(left + right - self.parent)
            }
            SplitCriterion::AbsoluteError => {
                Some(self.parent - (self.abs_left[k] + self.abs_right[k + 1]))
            }
        }
    }
}

/// `S * ln(S / n)`; children with a non-positive sum cannot be scored
fn poisson_term(sum: f64, n: usize) -> Option<f64> {
    if sum <= f64::EPSILON {
        return None;
    }
    Some(sum * (sum / n as f64).ln())
}

/// Total order wrapper so f64 can live in a heap
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ordered(f64);

impl Eq for Ordered {}

impl PartialOrd for Ordered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordered {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Running median with the sums needed for absolute deviation
#[derive(Default)]
struct RunningMedian {
    low: BinaryHeap<Ordered>,
    high: BinaryHeap<Reverse<Ordered>>,
    low_sum: f64,
    high_sum: f64,
}

impl RunningMedian {
    fn push(&mut self, v: f64) {
        match self.low.peek() {
            Some(top) if v > top.0 => {
                self.high.push(Reverse(Ordered(v)));
                self.high_sum += v;
            }
            _ => {
                self.low.push(Ordered(v));
                self.low_sum += v;
            }
        }
        // keep low.len() == high.len() or high.len() + 1
        if self.low.len() > self.high.len() + 1 {
            if let Some(Ordered(m)) = self.low.pop() {
                self.low_sum -= m;
                self.high.push(Reverse(Ordered(m)));
                self.high_sum += m;
            }
        } else if self.high.len() > self.low.len() {
            if let Some(Reverse(Ordered(m))) = self.high.pop() {
                self.high_sum -= m;
                self.low.push(Ordered(m));
                self.low_sum += m;
            }
        }
    }

    /// Sum of |v - median| over everything pushed so far
    fn abs_deviation(&self) -> f64 {
        let median = match self.low.peek() {
            Some(Ordered(m)) => *m,
            None => return 0.0,
        };
        (median * self.low.len() as f64 - self.low_sum)
            + (self.high_sum - median * self.high.len() as f64)
    }
}

/// Absolute deviation of every prefix of `values`
fn prefix_abs_deviation(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut median = RunningMedian::default();
    values
        .map(|v| {
            median.push(v);
            median.abs_deviation()
        })
        .collect()
}

/// Median of a non-empty slice; the mean of the two middle values for even length
pub(crate) fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn brute_abs_deviation(values: &[f64]) -> f64 {
        let mut v = values.to_vec();
        let m = median(&mut v);
        values.iter().map(|x| (x - m).abs()).sum()
    }

    #[test]
    fn test_running_median_matches_brute_force() {
        let values = [5.0, 1.0, 9.0, 3.0, 3.0, 12.0, 7.0, 2.0];
        let running = prefix_abs_deviation(values.iter().copied());
        for k in 0..values.len() {
            let expected = brute_abs_deviation(&values[..=k]);
            assert!((running[k] - expected).abs() < 1e-9, "prefix {}", k);
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_every_criterion_finds_the_step() {
        // y jumps where feature 1 crosses 10; feature 0 is noise
        let x = array![
            [3.0, 1.0],
            [1.0, 2.0],
            [2.0, 3.0],
            [3.0, 11.0],
            [1.0, 12.0],
            [2.0, 13.0]
        ];
        let y = [1.0, 1.5, 1.0, 10.0, 10.5, 10.0];
        let indices: Vec<usize> = (0..6).collect();

        for criterion in SplitCriterion::ALL {
            let split = best_split(x.view(), &y, &indices, criterion).unwrap();
            assert_eq!(split.feature, 1, "{:?}", criterion);
            assert_eq!(split.threshold, 7.0, "{:?}", criterion);
            assert!(split.decrease > 0.0);
        }
    }

    #[test]
    fn test_constant_target_has_no_split() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [4.0, 4.0, 4.0];
        for criterion in SplitCriterion::ALL {
            assert!(best_split(x.view(), &y, &[0, 1, 2], criterion).is_none());
        }
    }

    #[test]
    fn test_constant_feature_has_no_split() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [1.0, 5.0, 9.0];
        assert!(best_split(x.view(), &y, &[0, 1, 2], SplitCriterion::SquaredError).is_none());
    }

    #[test]
    fn test_poisson_rejects_zero_sum_child() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [0.0, 0.0, 3.0, 5.0];
        let split = best_split(x.view(), &y, &[0, 1, 2, 3], SplitCriterion::Poisson);
        // left children holding only zeros are skipped
        assert_eq!(split.map(|s| s.threshold), Some(3.5));
    }

    #[test]
    fn test_midpoint_never_reaches_upper_value() {
        let a: f64 = 1.0;
        let b = f64::from_bits(a.to_bits() + 1);
        assert_eq!(midpoint(a, b), a);
        assert_eq!(midpoint(2.0, 4.0), 3.0);
    }
}
