#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Model, split, and report types for the evaluation harness.
//!
//! [`ModelKind`] and [`SplitStrategy`] are deserialised from the
//! `[evaluation]` section of the run configuration (tagged by `type`).
//! The harness emits one [`EvaluationResult`] per (model, split, fold)
//! and bundles them with the nitrogen response curve into an
//! [`EvaluationReport`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metric keys recorded for every fold.
pub mod metric {
    pub const TRAIN_R2: &str = "train_r2";
    pub const TRAIN_RMSE: &str = "train_rmse";
    pub const TEST_R2: &str = "test_r2";
    pub const TEST_RMSE: &str = "test_rmse";
    pub const TEST_MAE: &str = "test_mae";
    pub const N_TRAIN: &str = "n_train";
    pub const N_TEST: &str = "n_test";
}

/// A candidate regressor and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    /// Ordinary least squares with intercept.
    LinearRegression,
    /// L2-penalised least squares.
    Ridge {
        alpha: f64,
    },
    /// L1-penalised least squares (coordinate descent).
    Lasso {
        alpha: f64,
    },
    /// Mixed L1/L2 penalty (coordinate descent).
    ElasticNet {
        alpha: f64,
        l1_ratio: f64,
    },
    /// Boosted regression trees. Optional backend.
    GradientBoosting {
        #[serde(default = "default_estimators")]
        n_estimators: usize,
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_max_depth")]
        max_depth: usize,
    },
}

const fn default_estimators() -> usize {
    100
}

const fn default_learning_rate() -> f64 {
    0.1
}

const fn default_max_depth() -> usize {
    3
}

impl ModelKind {
    /// Display name used in results (e.g. `"Ridge(alpha=1)"`).
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::LinearRegression => "LinearRegression".to_string(),
            Self::Ridge { alpha } => format!("Ridge(alpha={alpha})"),
            Self::Lasso { alpha } => format!("Lasso(alpha={alpha})"),
            Self::ElasticNet { alpha, l1_ratio } => format!("ElasticNet({alpha},{l1_ratio})"),
            Self::GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth,
            } => format!("GradientBoosting({n_estimators},{learning_rate},{max_depth})"),
        }
    }
}

/// How the feature table is partitioned into train/test folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// A single shuffled train/test split.
    RandomHoldout {
        test_fraction: f64,
        #[serde(default)]
        seed: u64,
    },
    /// Shuffled k-fold cross-validation.
    KFold {
        k: usize,
        #[serde(default)]
        seed: u64,
    },
    /// Contiguous spatial blocks, one test fold per block, with a
    /// buffer of excluded cells between test and training cells.
    SpatialBlocks {
        blocks_x: usize,
        blocks_y: usize,
        #[serde(default = "default_buffer_cells")]
        buffer_cells: u32,
    },
}

const fn default_buffer_cells() -> u32 {
    1
}

impl SplitStrategy {
    /// Short label used in results (e.g. `"kfold(5)"`).
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::RandomHoldout { test_fraction, .. } => format!("holdout({test_fraction})"),
            Self::KFold { k, .. } => format!("kfold({k})"),
            Self::SpatialBlocks {
                blocks_x,
                blocks_y,
                buffer_cells,
            } => format!("spatial_blocks({blocks_x}x{blocks_y},buffer={buffer_cells})"),
        }
    }
}

/// Scores of one model on one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model_name: String,
    pub split_strategy: String,
    pub fold_index: usize,
    pub metrics: BTreeMap<String, f64>,
}

impl EvaluationResult {
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Coefficients of `yield = a + b·N + c·N²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl QuadraticCoefficients {
    #[must_use]
    pub fn predict(&self, n: f64) -> f64 {
        self.c.mul_add(n * n, self.b.mul_add(n, self.a))
    }
}

/// Outcome of the nitrogen response fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NitrogenCurveStatus {
    /// The parabola opens downward and has a usable vertex.
    Concave {
        optimal_rate: f64,
        predicted_yield: f64,
        /// The vertex lies outside the observed nitrogen range.
        extrapolated: bool,
    },
    /// `c >= 0`: no maximum exists, so no rate is recommended.
    NonConcave,
    /// Too few observations or distinct rates to fit three terms.
    InsufficientData,
}

/// Nitrogen response curve fitted over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NitrogenCurveReport {
    pub coefficients: Option<QuadraticCoefficients>,
    pub observations: usize,
    /// Observed `(min, max)` nitrogen rate.
    pub nitrogen_range: Option<(f64, f64)>,
    pub status: NitrogenCurveStatus,
}

impl NitrogenCurveReport {
    /// The recommended nitrogen rate, if the fit is usable.
    #[must_use]
    pub const fn recommended_rate(&self) -> Option<f64> {
        match self.status {
            NitrogenCurveStatus::Concave { optimal_rate, .. } => Some(optimal_rate),
            NitrogenCurveStatus::NonConcave | NitrogenCurveStatus::InsufficientData => None,
        }
    }
}

/// Everything one evaluation run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub results: Vec<EvaluationResult>,
    /// Configured models whose backend is not available in this build.
    pub skipped_models: Vec<String>,
    pub nitrogen_curve: NitrogenCurveReport,
}

impl EvaluationReport {
    /// Mean of `metric` over the folds of `model` under `split`.
    #[must_use]
    pub fn mean_metric(&self, model: &str, split: &str, metric: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .results
            .iter()
            .filter(|r| r.model_name == model && r.split_strategy == split)
            .filter_map(|r| r.metric(metric))
            .filter(|v| v.is_finite())
            .collect();

        if values.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let count = values.len() as f64;
        Some(values.iter().sum::<f64>() / count)
    }

    /// Models evaluated under `split`, best mean `metric` first.
    #[must_use]
    pub fn ranked_models(&self, split: &str, metric: &str) -> Vec<(String, f64)> {
        let mut names: Vec<&str> = self
            .results
            .iter()
            .filter(|r| r.split_strategy == split)
            .map(|r| r.model_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();

        let mut ranked: Vec<(String, f64)> = names
            .into_iter()
            .filter_map(|name| {
                self.mean_metric(name, split, metric)
                    .map(|v| (name.to_string(), v))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Distinct split labels in first-seen order.
    #[must_use]
    pub fn split_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for result in &self.results {
            if !labels.contains(&result.split_strategy) {
                labels.push(result.split_strategy.clone());
            }
        }
        labels
    }
}
