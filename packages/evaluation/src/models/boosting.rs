//! Gradient-boosted regression trees with squared loss.
//!
//! Starts from the target mean and adds `n_estimators` depth-limited
//! trees, each fitted to the current residuals and scaled by
//! `learning_rate`. Splits maximise the reduction in squared error.

use nalgebra::{DMatrix, DVector};

use super::Regressor;
use crate::EvaluationError;

/// Splits must improve squared error by more than this.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Self>,
        right: Box<Self>,
    },
}

impl Node {
    fn predict(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        match self {
            Self::Leaf(value) => *value,
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[(row, *feature)] <= *threshold {
                    left.predict(x, row)
                } else {
                    right.predict(x, row)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoosting {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    base: f64,
    trees: Vec<Node>,
}

impl GradientBoosting {
    #[must_use]
    pub const fn new(n_estimators: usize, learning_rate: f64, max_depth: usize) -> Self {
        Self {
            n_estimators,
            learning_rate,
            max_depth,
            base: 0.0,
            trees: Vec::new(),
        }
    }
}

impl Regressor for GradientBoosting {
    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), EvaluationError> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(EvaluationError::Fit {
                message: format!("{} design rows for {} targets", x.nrows(), y.len()),
            });
        }

        self.base = y.mean();
        self.trees.clear();
        let mut prediction = DVector::from_element(y.len(), self.base);

        for _ in 0..self.n_estimators {
            let residual = y - &prediction;
            let mut rows: Vec<usize> = (0..y.len()).collect();
            let tree = grow(x, &residual, &mut rows, self.max_depth);
            for (row, p) in prediction.iter_mut().enumerate() {
                *p += self.learning_rate * tree.predict(x, row);
            }
            self.trees.push(tree);
        }

        log::trace!(
            "boosted {} trees, train rmse {:.4}",
            self.trees.len(),
            (y - &prediction).norm() / (y.len() as f64).sqrt()
        );
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.nrows(),
            (0..x.nrows()).map(|row| {
                self.trees.iter().fold(self.base, |acc, tree| {
                    self.learning_rate.mul_add(tree.predict(x, row), acc)
                })
            }),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_of(target: &DVector<f64>, rows: &[usize]) -> f64 {
    rows.iter().map(|&r| target[r]).sum::<f64>() / rows.len() as f64
}

fn grow(x: &DMatrix<f64>, target: &DVector<f64>, rows: &mut [usize], depth: usize) -> Node {
    if depth == 0 || rows.len() < 2 {
        return Node::Leaf(mean_of(target, rows));
    }

    let Some((feature, threshold)) = best_split(x, target, rows) else {
        return Node::Leaf(mean_of(target, rows));
    };

    let mut left: Vec<usize> = Vec::new();
    let mut right: Vec<usize> = Vec::new();
    for &row in rows.iter() {
        if x[(row, feature)] <= threshold {
            left.push(row);
        } else {
            right.push(row);
        }
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, target, &mut left, depth - 1)),
        right: Box::new(grow(x, target, &mut right, depth - 1)),
    }
}

/// The `(feature, threshold)` with the largest squared-error reduction.
#[allow(clippy::cast_precision_loss)]
fn best_split(
    x: &DMatrix<f64>,
    target: &DVector<f64>,
    rows: &mut [usize],
) -> Option<(usize, f64)> {
    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&r| target[r]).sum();
    let parent = total * total / n;

    let mut best: Option<(f64, usize, f64)> = None;
    for feature in 0..x.ncols() {
        rows.sort_by(|&a, &b| x[(a, feature)].total_cmp(&x[(b, feature)]));

        let mut left_sum = 0.0;
        for k in 1..rows.len() {
            left_sum += target[rows[k - 1]];
            let lo = x[(rows[k - 1], feature)];
            let hi = x[(rows[k], feature)];
            if lo >= hi {
                continue;
            }

            let left_n = k as f64;
            let right_sum = total - left_sum;
            let gain =
                left_sum * left_sum / left_n + right_sum * right_sum / (n - left_n) - parent;
            if gain > MIN_GAIN && best.is_none_or(|(g, _, _)| gain > g) {
                best = Some((gain, feature, lo + (hi - lo) / 2.0));
            }
        }
    }

    best.map(|(_, feature, threshold)| (feature, threshold))
}
