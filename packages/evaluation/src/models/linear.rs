//! Penalised and unpenalised least squares.
//!
//! All variants fit an unpenalised intercept by centring `x` and `y`.
//! OLS and ridge are solved with an SVD, which also handles
//! rank-deficient designs (duplicate or constant dummy columns).
//! Lasso and elastic net minimise
//!
//! ```text
//! 1/(2n)·‖y − Xβ‖² + α·ρ·‖β‖₁ + α·(1 − ρ)/2·‖β‖²
//! ```
//!
//! by cyclic coordinate descent.

use nalgebra::{DMatrix, DVector};

use super::Regressor;
use crate::EvaluationError;

const MAX_ITERATIONS: usize = 1000;
const TOLERANCE: f64 = 1e-4;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Penalty {
    None,
    Ridge { alpha: f64 },
    ElasticNet { alpha: f64, l1_ratio: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    penalty: Penalty,
    intercept: f64,
    coefficients: DVector<f64>,
}

impl LinearModel {
    #[must_use]
    pub fn new(penalty: Penalty) -> Self {
        Self {
            penalty,
            intercept: 0.0,
            coefficients: DVector::zeros(0),
        }
    }

    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    #[must_use]
    pub const fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }
}

impl Regressor for LinearModel {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), EvaluationError> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(EvaluationError::Fit {
                message: format!("{n} design rows for {} targets", y.len()),
            });
        }

        let x_mean = DVector::from_iterator(x.ncols(), x.column_iter().map(|c| c.mean()));
        let y_mean = y.mean();
        let mut xc = x.clone();
        for (mut column, mean) in xc.column_iter_mut().zip(x_mean.iter()) {
            column.add_scalar_mut(-mean);
        }
        let yc = y.add_scalar(-y_mean);

        let coefficients = if x.ncols() == 0 {
            DVector::zeros(0)
        } else {
            match self.penalty {
                Penalty::None => least_squares(&xc, &yc)?,
                Penalty::Ridge { alpha } => {
                    let xt = xc.transpose();
                    let gram = &xt * &xc + DMatrix::identity(x.ncols(), x.ncols()) * alpha;
                    least_squares(&gram, &(&xt * &yc))?
                }
                Penalty::ElasticNet { alpha, l1_ratio } => {
                    coordinate_descent(&xc, &yc, alpha, l1_ratio)
                }
            }
        };

        self.intercept = y_mean - x_mean.dot(&coefficients);
        self.coefficients = coefficients;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        if self.coefficients.is_empty() {
            return DVector::from_element(x.nrows(), self.intercept);
        }
        (x * &self.coefficients).add_scalar(self.intercept)
    }
}

/// Minimum-norm least-squares solution of `a·β = b`.
pub(crate) fn least_squares(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<DVector<f64>, EvaluationError> {
    let svd = a.clone().svd(true, true);
    let eps = svd.singular_values.max() * RANK_TOLERANCE;
    svd.solve(b, eps).map_err(|e| EvaluationError::Fit {
        message: e.to_string(),
    })
}

#[allow(clippy::cast_precision_loss)]
fn coordinate_descent(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    alpha: f64,
    l1_ratio: f64,
) -> DVector<f64> {
    let n = x.nrows() as f64;
    let p = x.ncols();
    let l1 = alpha * l1_ratio * n;
    let l2 = alpha * (1.0 - l1_ratio) * n;
    let norms: Vec<f64> = x.column_iter().map(|c| c.norm_squared()).collect();

    let mut w = DVector::zeros(p);
    let mut residual = y.clone();

    for iteration in 0..MAX_ITERATIONS {
        let mut max_change = 0.0_f64;
        let mut max_weight = 0.0_f64;

        for j in 0..p {
            if norms[j] <= 0.0 {
                continue;
            }
            let column = x.column(j);
            let old = w[j];
            if old != 0.0 {
                residual.axpy(old, &column, 1.0);
            }

            let rho = column.dot(&residual);
            let new = rho.signum() * (rho.abs() - l1).max(0.0) / (norms[j] + l2);
            if new != 0.0 {
                residual.axpy(-new, &column, 1.0);
            }

            w[j] = new;
            max_change = max_change.max((new - old).abs());
            max_weight = max_weight.max(new.abs());
        }

        if max_weight == 0.0 || max_change / max_weight < TOLERANCE {
            log::trace!("coordinate descent converged after {} passes", iteration + 1);
            return w;
        }
    }

    log::debug!("coordinate descent stopped after {MAX_ITERATIONS} passes without converging");
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 3 + 2·x1 − x2 on a small non-collinear design.
    fn linear_data() -> (DMatrix<f64>, DVector<f64>) {
        let x = DMatrix::from_row_slice(6, 2, &[
            0.0, 1.0, //
            1.0, 0.0, //
            2.0, 3.0, //
            3.0, 1.0, //
            4.0, 5.0, //
            5.0, 2.0, //
        ]);
        let y = DVector::from_iterator(6, x.row_iter().map(|r| 3.0 + 2.0 * r[0] - r[1]));
        (x, y)
    }

    #[test]
    fn ols_recovers_exact_coefficients() {
        let (x, y) = linear_data();
        let mut model = LinearModel::new(Penalty::None);
        model.fit(&x, &y).unwrap();
        assert!((model.intercept() - 3.0).abs() < 1e-9);
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-9);
        assert!((model.coefficients()[1] + 1.0).abs() < 1e-9);
        assert!((model.predict(&x) - &y).norm() < 1e-9);
    }

    #[test]
    fn ridge_shrinks_coefficients() {
        let (x, y) = linear_data();
        let mut ols = LinearModel::new(Penalty::None);
        let mut ridge = LinearModel::new(Penalty::Ridge { alpha: 10.0 });
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();
        assert!(ridge.coefficients().norm() < ols.coefficients().norm());
    }

    #[test]
    fn strong_lasso_predicts_the_mean() {
        let (x, y) = linear_data();
        let mut lasso = LinearModel::new(Penalty::ElasticNet {
            alpha: 1e6,
            l1_ratio: 1.0,
        });
        lasso.fit(&x, &y).unwrap();
        assert!(lasso.coefficients().iter().all(|&w| w == 0.0));
        assert!((lasso.intercept() - y.mean()).abs() < 1e-9);
    }

    #[test]
    fn weak_elastic_net_approaches_ols() {
        let (x, y) = linear_data();
        let mut enet = LinearModel::new(Penalty::ElasticNet {
            alpha: 1e-6,
            l1_ratio: 0.5,
        });
        enet.fit(&x, &y).unwrap();
        assert!((enet.coefficients()[0] - 2.0).abs() < 1e-2);
        assert!((enet.coefficients()[1] + 1.0).abs() < 1e-2);
    }

    #[test]
    fn duplicate_columns_still_fit() {
        let (x, y) = linear_data();
        let doubled = DMatrix::from_fn(6, 3, |r, c| x[(r, c.min(1))]);
        let mut model = LinearModel::new(Penalty::None);
        model.fit(&doubled, &y).unwrap();
        assert!((model.predict(&doubled) - &y).norm() < 1e-8);
    }

    #[test]
    fn intercept_only_when_no_columns() {
        let x = DMatrix::<f64>::zeros(3, 0);
        let y = DVector::from_vec(vec![1.0, 2.0, 6.0]);
        let mut model = LinearModel::new(Penalty::None);
        model.fit(&x, &y).unwrap();
        assert!((model.predict(&x)[0] - 3.0).abs() < 1e-12);
    }
}
