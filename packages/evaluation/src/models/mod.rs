//! Candidate regressors.
//!
//! Every model implements [`Regressor`]. Optional backends are compiled
//! in by cargo feature; [`is_available`] reports whether a configured
//! [`ModelKind`] can be built in this binary, and the harness skips the
//! ones that cannot.

#[cfg(feature = "gradient-boosting")]
mod boosting;
mod linear;

use acre_map_evaluation_models::ModelKind;
use nalgebra::{DMatrix, DVector};

pub use linear::{LinearModel, Penalty};
pub(crate) use linear::least_squares;

use crate::EvaluationError;

/// A model that can be fitted on a design matrix and then predict.
pub trait Regressor {
    /// Fits the model to `x` (one row per sample) and target `y`.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Fit`] if the fit cannot be computed.
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), EvaluationError>;

    /// Predicts one value per row of `x`.
    fn predict(&self, x: &DMatrix<f64>) -> DVector<f64>;
}

/// Whether `kind` has a backend in this build.
#[must_use]
pub const fn is_available(kind: &ModelKind) -> bool {
    match kind {
        ModelKind::LinearRegression
        | ModelKind::Ridge { .. }
        | ModelKind::Lasso { .. }
        | ModelKind::ElasticNet { .. } => true,
        ModelKind::GradientBoosting { .. } => cfg!(feature = "gradient-boosting"),
    }
}

/// Builds an unfitted regressor for `kind`, or `None` when its backend
/// is not compiled in.
#[must_use]
pub fn build_regressor(kind: &ModelKind) -> Option<Box<dyn Regressor>> {
    match kind {
        ModelKind::LinearRegression => Some(Box::new(LinearModel::new(Penalty::None))),
        ModelKind::Ridge { alpha } => Some(Box::new(LinearModel::new(Penalty::Ridge {
            alpha: *alpha,
        }))),
        ModelKind::Lasso { alpha } => Some(Box::new(LinearModel::new(Penalty::ElasticNet {
            alpha: *alpha,
            l1_ratio: 1.0,
        }))),
        ModelKind::ElasticNet { alpha, l1_ratio } => {
            Some(Box::new(LinearModel::new(Penalty::ElasticNet {
                alpha: *alpha,
                l1_ratio: *l1_ratio,
            })))
        }
        #[cfg(feature = "gradient-boosting")]
        ModelKind::GradientBoosting {
            n_estimators,
            learning_rate,
            max_depth,
        } => Some(Box::new(boosting::GradientBoosting::new(
            *n_estimators,
            *learning_rate,
            *max_depth,
        ))),
        #[cfg(not(feature = "gradient-boosting"))]
        ModelKind::GradientBoosting { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_matches_builder() {
        let kinds = [
            ModelKind::LinearRegression,
            ModelKind::Ridge { alpha: 1.0 },
            ModelKind::Lasso { alpha: 0.1 },
            ModelKind::ElasticNet {
                alpha: 0.1,
                l1_ratio: 0.5,
            },
            ModelKind::GradientBoosting {
                n_estimators: 10,
                learning_rate: 0.1,
                max_depth: 2,
            },
        ];
        for kind in &kinds {
            assert_eq!(is_available(kind), build_regressor(kind).is_some());
        }
        assert!(is_available(&ModelKind::LinearRegression));
    }
}
