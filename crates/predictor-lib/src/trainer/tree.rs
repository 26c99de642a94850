//! Regression tree grown greedily to a depth limit

use super::split::{best_split, median};
use super::SplitCriterion;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Nodes smaller than this are never split
const MIN_SAMPLES_SPLIT: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Flattened binary tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit on the rows listed in `indices` (repeats allowed for bootstrap samples)
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[f64],
        indices: &[usize],
        criterion: SplitCriterion,
        max_depth: usize,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut rows = indices.to_vec();
        tree.grow(x, y, &mut rows, criterion, max_depth, 0);
        tree
    }

    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[f64],
        rows: &mut [usize],
        criterion: SplitCriterion,
        max_depth: usize,
        depth: usize,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: leaf_value(y, rows, criterion),
        });

        if depth >= max_depth || rows.len() < MIN_SAMPLES_SPLIT || is_pure(y, rows) {
            return id;
        }
        let split = match best_split(x, y, rows, criterion) {
            Some(split) => split,
            None => return id,
        };

        let mid = partition(rows, |i| x[[i, split.feature]] <= split.threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(x, y, left_rows, criterion, max_depth, depth + 1);
        let right = self.grow(x, y, right_rows, criterion, max_depth, depth + 1);

        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Longest root-to-leaf path
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check that every split reads an existing feature and points at later nodes
    ///
    /// Children always follow their parent, so a tree that passes cannot
    /// send `predict_row` out of bounds or around a cycle.
    pub fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!(
                        "node {} splits on feature {} of {}",
                        id, feature, n_features
                    ));
                }
                for child in [*left, *right] {
                    if child <= id || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", id, child));
                    }
                }
            }
        }
        Ok(())
    }
}

fn leaf_value(y: &[f64], rows: &[usize], criterion: SplitCriterion) -> f64 {
    match criterion {
        SplitCriterion::AbsoluteError => {
            let mut values: Vec<f64> = rows.iter().map(|&i| y[i]).collect();
            median(&mut values)
        }
        _ => rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64,
    }
}

fn is_pure(y: &[f64], rows: &[usize]) -> bool {
    let first = y[rows[0]];
    rows.iter().all(|&i| y[i] == first)
}

/// Move rows satisfying `goes_left` to the front; returns how many did
fn partition(rows: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for k in 0..rows.len() {
        if goes_left(rows[k]) {
            rows.swap(mid, k);
            mid += 1;
        }
    }
    mid
}
