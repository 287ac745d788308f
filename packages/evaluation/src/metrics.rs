//! Regression scores.

use nalgebra::DVector;

/// Coefficient of determination.
///
/// A constant target scores 1 when predicted exactly and 0 otherwise.
#[must_use]
pub fn r2(actual: &DVector<f64>, predicted: &DVector<f64>) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let mean = actual.mean();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot <= 0.0 {
        return if ss_res <= 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rmse(actual: &DVector<f64>, predicted: &DVector<f64>) -> f64 {
    (actual - predicted).norm() / (actual.len() as f64).sqrt()
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mae(actual: &DVector<f64>, predicted: &DVector<f64>) -> f64 {
    (actual - predicted).lp_norm(1) / actual.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_and_mean_predictions() {
        let actual = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((r2(&actual, &actual) - 1.0).abs() < 1e-12);
        assert!(rmse(&actual, &actual).abs() < 1e-12);

        let mean = DVector::from_element(4, 2.5);
        assert!(r2(&actual, &mean).abs() < 1e-12);
    }

    #[test]
    fn known_errors() {
        let actual = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0]);
        let predicted = DVector::from_vec(vec![1.0, -1.0, 1.0, -1.0]);
        assert!((rmse(&actual, &predicted) - 1.0).abs() < 1e-12);
        assert!((mae(&actual, &predicted) - 1.0).abs() < 1e-12);
        assert!(r2(&actual, &predicted).abs() < 1e-12);
    }
}
