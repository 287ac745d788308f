#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Evaluation harness for per-acre yield datasets.
//!
//! [`evaluate_models`] turns an acre table into a design matrix, fits
//! each configured regressor under each configured split strategy, and
//! scores every fold. Spatial-block splits keep a buffer of excluded
//! cells between test and training cells so neighbouring acres cannot
//! leak into each other's folds. [`fit_nitrogen_curve`] fits the
//! quadratic nitrogen response and locates its maximum.

pub mod design;
mod harness;
pub mod metrics;
pub mod models;
mod nitrogen;
pub mod split;

pub use harness::{QUADRATIC_BASELINE_NAME, evaluate_models};
pub use nitrogen::fit_nitrogen_curve;

use acre_map_projection::ProjectionError;
use thiserror::Error;

/// Errors from the evaluation harness.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Too few usable rows for the requested evaluation.
    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    /// A model could not be fitted.
    #[error("Model fit failed: {message}")]
    Fit { message: String },

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
