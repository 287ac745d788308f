//! Quadratic nitrogen response curve.

use std::collections::BTreeSet;

use acre_map_evaluation_models::{
    NitrogenCurveReport, NitrogenCurveStatus, QuadraticCoefficients,
};
use acre_map_field_models::AcreRow;
use nalgebra::{DMatrix, DVector};

use crate::models::least_squares;

/// Observations and distinct rates needed to fit three coefficients.
const MIN_OBSERVATIONS: usize = 3;

/// Fits `yield = a + b·N + c·N²` over rows with both values present.
///
/// The fit is never an error: too little data reports
/// [`NitrogenCurveStatus::InsufficientData`] and an upward-opening
/// parabola reports [`NitrogenCurveStatus::NonConcave`] with no
/// recommended rate.
#[must_use]
pub fn fit_nitrogen_curve(rows: &[AcreRow]) -> NitrogenCurveReport {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| Some((r.mean_nitrogen_lb_ac?, r.mean_yield_bu_ac?)))
        .filter(|(n, y)| n.is_finite() && y.is_finite())
        .collect();

    let nitrogen_range = pairs.iter().map(|&(n, _)| n).fold(None, |range, n| {
        Some(range.map_or((n, n), |(lo, hi): (f64, f64)| (lo.min(n), hi.max(n))))
    });

    let insufficient = || NitrogenCurveReport {
        coefficients: None,
        observations: pairs.len(),
        nitrogen_range,
        status: NitrogenCurveStatus::InsufficientData,
    };

    let distinct: BTreeSet<u64> = pairs.iter().map(|(n, _)| n.to_bits()).collect();
    if pairs.len() < MIN_OBSERVATIONS || distinct.len() < MIN_OBSERVATIONS {
        log::warn!(
            "Nitrogen curve: {} observations with {} distinct rates, not fitting",
            pairs.len(),
            distinct.len()
        );
        return insufficient();
    }

    // Fit on N / scale so the N² column stays well conditioned.
    let scale = pairs
        .iter()
        .map(|(n, _)| n.abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let x = DMatrix::from_fn(pairs.len(), 3, |r, c| {
        let u = pairs[r].0 / scale;
        match c {
            0 => 1.0,
            1 => u,
            _ => u * u,
        }
    });
    let y = DVector::from_iterator(pairs.len(), pairs.iter().map(|&(_, y)| y));

    let fitted = match least_squares(&x, &y) {
        Ok(fitted) => fitted,
        Err(e) => {
            log::warn!("Nitrogen curve fit failed: {e}");
            return insufficient();
        }
    };
    let coefficients = QuadraticCoefficients {
        a: fitted[0],
        b: fitted[1] / scale,
        c: fitted[2] / (scale * scale),
    };

    log::info!(
        "Nitrogen curve: yield = {:.3} + {:.4}·N + {:.6}·N² over {} acres",
        coefficients.a,
        coefficients.b,
        coefficients.c,
        pairs.len()
    );

    let status = if coefficients.c < 0.0 {
        let optimal_rate = -coefficients.b / (2.0 * coefficients.c);
        let extrapolated =
            nitrogen_range.is_some_and(|(lo, hi)| optimal_rate < lo || optimal_rate > hi);
        if extrapolated {
            log::warn!(
                "Optimal nitrogen rate {optimal_rate:.1} lb/ac lies outside the observed rates"
            );
        } else {
            log::info!("Optimal nitrogen rate {optimal_rate:.1} lb/ac");
        }
        NitrogenCurveStatus::Concave {
            optimal_rate,
            predicted_yield: coefficients.predict(optimal_rate),
            extrapolated,
        }
    } else {
        log::warn!(
            "Nitrogen curve does not bend down (c = {:.6}); no optimal rate",
            coefficients.c
        );
        NitrogenCurveStatus::NonConcave
    };

    NitrogenCurveReport {
        coefficients: Some(coefficients),
        observations: pairs.len(),
        nitrogen_range,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(nitrogen: Option<f64>, yield_bu: Option<f64>) -> AcreRow {
        AcreRow {
            mean_yield_bu_ac: yield_bu,
            mean_nitrogen_lb_ac: nitrogen,
            soil_musym: None,
            soil_muname: None,
            rainfall_in: None,
            lat: 38.95,
            lon: -92.33,
        }
    }

    #[test]
    fn recovers_known_quadratic_and_optimum() {
        let rows: Vec<AcreRow> = (0..=30)
            .map(|i| {
                let n = f64::from(i) * 10.0;
                row(Some(n), Some(0.4f64.mul_add(n, 150.0) - 0.001 * n * n))
            })
            .collect();

        let report = fit_nitrogen_curve(&rows);
        let coef = report.coefficients.unwrap();
        assert!((coef.a - 150.0).abs() < 1e-6);
        assert!((coef.b - 0.4).abs() < 1e-8);
        assert!((coef.c + 0.001).abs() < 1e-10);
        assert_eq!(report.observations, 31);
        assert_eq!(report.nitrogen_range, Some((0.0, 300.0)));

        let NitrogenCurveStatus::Concave {
            optimal_rate,
            predicted_yield,
            extrapolated,
        } = report.status
        else {
            panic!("expected a concave fit");
        };
        assert!((optimal_rate - 200.0).abs() < 1e-4);
        assert!((predicted_yield - 190.0).abs() < 1e-6);
        assert!(!extrapolated);
        assert!(report.recommended_rate().unwrap().is_finite());
    }

    #[test]
    fn upward_curve_is_non_concave() {
        let rows: Vec<AcreRow> = (0..10)
            .map(|i| {
                let n = f64::from(i) * 20.0;
                row(Some(n), Some(100.0 + 0.002 * n * n))
            })
            .collect();
        let report = fit_nitrogen_curve(&rows);
        assert_eq!(report.status, NitrogenCurveStatus::NonConcave);
        assert!(report.coefficients.is_some());
        assert!(report.recommended_rate().is_none());
    }

    #[test]
    fn vertex_beyond_observed_rates_is_flagged() {
        // Vertex at N = 200, but only rates up to 100 were applied.
        let rows: Vec<AcreRow> = (0..=10)
            .map(|i| {
                let n = f64::from(i) * 10.0;
                row(Some(n), Some(0.4f64.mul_add(n, 150.0) - 0.001 * n * n))
            })
            .collect();
        let report = fit_nitrogen_curve(&rows);
        assert!(matches!(
            report.status,
            NitrogenCurveStatus::Concave {
                extrapolated: true,
                ..
            }
        ));
    }

    #[test]
    fn too_few_distinct_rates() {
        let rows = vec![
            row(Some(100.0), Some(180.0)),
            row(Some(100.0), Some(182.0)),
            row(Some(150.0), Some(190.0)),
            row(None, Some(170.0)),
            row(Some(120.0), None),
        ];
        let report = fit_nitrogen_curve(&rows);
        assert_eq!(report.status, NitrogenCurveStatus::InsufficientData);
        assert_eq!(report.observations, 3);
        assert_eq!(report.nitrogen_range, Some((100.0, 150.0)));
        assert!(report.coefficients.is_none());
    }
}
