//! Model comparison across split strategies.

use std::collections::BTreeMap;

use acre_map_config::RunConfig;
use acre_map_evaluation_models::{EvaluationReport, EvaluationResult, ModelKind, metric};
use acre_map_field_models::AcreRow;
use acre_map_projection::Projector;

use crate::EvaluationError;
use crate::design::{DesignMatrix, build_design_matrix, build_quadratic_design};
use crate::metrics::{mae, r2, rmse};
use crate::models::{build_regressor, is_available};
use crate::nitrogen::fit_nitrogen_curve;
use crate::split::{Fold, lattice_cells, make_folds};

/// Result name of the `[N, N², soil]` OLS baseline.
pub const QUADRATIC_BASELINE_NAME: &str = "Quadratic_N+Soil";

struct Candidate<'a> {
    name: String,
    kind: ModelKind,
    design: &'a DesignMatrix,
}

/// Fits every configured model under every configured split and fits
/// the nitrogen response curve.
///
/// Results are ordered by candidate (baseline first), then split, then
/// fold. Models without a backend in this build are listed in
/// [`EvaluationReport::skipped_models`]. A split that cannot be made
/// for a candidate's rows, or a fold that fails to fit, is logged and
/// skipped.
///
/// # Errors
///
/// * [`EvaluationError::Projection`] - the configured CRS is unsupported
/// * [`EvaluationError::InsufficientData`] - fewer than two usable rows,
///   or no fold could be scored at all
pub fn evaluate_models(
    rows: &[AcreRow],
    config: &RunConfig,
) -> Result<EvaluationReport, EvaluationError> {
    let projector = Projector::new(&config.crs.geographic, &config.crs.projected)?;
    let settings = &config.evaluation;

    let design = build_design_matrix(rows, settings.use_coords);
    if design.nrows() < 2 {
        return Err(EvaluationError::InsufficientData {
            message: format!(
                "{} of {} rows are usable for modelling",
                design.nrows(),
                rows.len()
            ),
        });
    }
    log::info!(
        "Evaluating on {} acres with predictors {:?}",
        design.nrows(),
        design.columns
    );

    let quadratic = settings
        .include_quadratic_baseline
        .then(|| build_quadratic_design(rows));

    let mut candidates = Vec::new();
    if let Some(quadratic) = &quadratic {
        candidates.push(Candidate {
            name: QUADRATIC_BASELINE_NAME.to_string(),
            kind: ModelKind::LinearRegression,
            design: quadratic,
        });
    }

    let mut skipped_models = Vec::new();
    for kind in &settings.models {
        if is_available(kind) {
            candidates.push(Candidate {
                name: kind.name(),
                kind: kind.clone(),
                design: &design,
            });
        } else {
            log::info!("{} is not available in this build; skipping", kind.name());
            skipped_models.push(kind.name());
        }
    }

    let mut results = Vec::new();
    for candidate in &candidates {
        let cells = lattice_cells(
            &candidate.design.locations,
            &projector,
            config.grid.cell_size_m,
        )?;

        for split in &settings.splits {
            let label = split.label();
            let folds = match make_folds(split, &cells) {
                Ok(folds) => folds,
                Err(e) => {
                    log::warn!("{}: {label} skipped: {e}", candidate.name);
                    continue;
                }
            };

            for (fold_index, fold) in folds.iter().enumerate() {
                match score_fold(candidate, fold) {
                    Ok(metrics) => results.push(EvaluationResult {
                        model_name: candidate.name.clone(),
                        split_strategy: label.clone(),
                        fold_index,
                        metrics,
                    }),
                    Err(e) => {
                        log::warn!("{}: {label} fold {fold_index} failed: {e}", candidate.name);
                    }
                }
            }
        }
    }

    if results.is_empty() {
        return Err(EvaluationError::InsufficientData {
            message: "no model could be scored on any fold".to_string(),
        });
    }

    let report = EvaluationReport {
        results,
        skipped_models,
        nitrogen_curve: fit_nitrogen_curve(rows),
    };

    for label in report.split_labels() {
        if let Some((best, score)) = report.ranked_models(&label, metric::TEST_R2).first() {
            log::info!("{label}: best model {best} (mean test R² {score:.3})");
        }
    }

    Ok(report)
}

#[allow(clippy::cast_precision_loss)]
fn score_fold(
    candidate: &Candidate<'_>,
    fold: &Fold,
) -> Result<BTreeMap<String, f64>, EvaluationError> {
    let design = candidate.design;
    let x_train = design.x.select_rows(fold.train.iter());
    let y_train = design.y.select_rows(fold.train.iter());
    let x_test = design.x.select_rows(fold.test.iter());
    let y_test = design.y.select_rows(fold.test.iter());

    let mut model = build_regressor(&candidate.kind).ok_or_else(|| EvaluationError::Fit {
        message: format!("{} has no backend", candidate.name),
    })?;
    model.fit(&x_train, &y_train)?;

    let train_pred = model.predict(&x_train);
    let test_pred = model.predict(&x_test);

    Ok(BTreeMap::from([
        (metric::TRAIN_R2.to_string(), r2(&y_train, &train_pred)),
        (metric::TRAIN_RMSE.to_string(), rmse(&y_train, &train_pred)),
        (metric::TEST_R2.to_string(), r2(&y_test, &test_pred)),
        (metric::TEST_RMSE.to_string(), rmse(&y_test, &test_pred)),
        (metric::TEST_MAE.to_string(), mae(&y_test, &test_pred)),
        (metric::N_TRAIN.to_string(), fold.train.len() as f64),
        (metric::N_TEST.to_string(), fold.test.len() as f64),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use acre_map_config::EXAMPLE_CONFIG;
    use acre_map_evaluation_models::{NitrogenCurveStatus, SplitStrategy};
    use geo::Coord;

    const SIZE: f64 = 63.6;

    /// An 8x8-acre field. Nitrogen rises west to east; the southern
    /// half is on a soil that yields 10 bu/ac more.
    fn field_rows() -> Vec<AcreRow> {
        let projector = Projector::new("EPSG:4326", "EPSG:32615").unwrap();
        let mut cells = Vec::new();
        let mut centres = Vec::new();
        for row in 0..8_u32 {
            for col in 0..8_u32 {
                cells.push((row, col));
                centres.push(Coord {
                    x: (f64::from(col) + 0.5).mul_add(SIZE, 500_000.0),
                    y: (f64::from(row) + 0.5).mul_add(SIZE, 4_300_000.0),
                });
            }
        }
        let lon_lat = projector.to_geographic(&centres).unwrap();

        cells
            .iter()
            .zip(lon_lat)
            .map(|(&(row, col), position)| {
                let n = f64::from(col).mul_add(30.0, 60.0) + f64::from(row % 3) * 5.0;
                let soil = if row < 4 { "60B" } else { "30A" };
                let bonus = if row < 4 { 10.0 } else { 0.0 };
                AcreRow {
                    mean_yield_bu_ac: Some(0.4f64.mul_add(n, 150.0) - 0.001 * n * n + bonus),
                    mean_nitrogen_lb_ac: Some(n),
                    soil_musym: Some(soil.to_string()),
                    soil_muname: Some(format!("{soil} silt loam")),
                    rainfall_in: Some(18.0),
                    lat: position.y,
                    lon: position.x,
                }
            })
            .collect()
    }

    fn config() -> RunConfig {
        let mut config = RunConfig::from_toml_str(EXAMPLE_CONFIG).unwrap();
        config.evaluation.models = vec![
            ModelKind::LinearRegression,
            ModelKind::Ridge { alpha: 1.0 },
            ModelKind::GradientBoosting {
                n_estimators: 20,
                learning_rate: 0.1,
                max_depth: 2,
            },
        ];
        config.evaluation.splits = vec![
            SplitStrategy::KFold { k: 4, seed: 1 },
            SplitStrategy::SpatialBlocks {
                blocks_x: 2,
                blocks_y: 2,
                buffer_cells: 1,
            },
        ];
        config.evaluation.include_quadratic_baseline = true;
        config
    }

    #[test]
    fn scores_every_available_model_on_every_fold() {
        let report = evaluate_models(&field_rows(), &config()).unwrap();

        let available = if cfg!(feature = "gradient-boosting") { 3 } else { 2 };
        // Baseline plus models, 4 k-fold folds plus 4 quadrant folds.
        assert_eq!(report.results.len(), (available + 1) * 8);
        assert_eq!(
            report.skipped_models.is_empty(),
            cfg!(feature = "gradient-boosting")
        );
        assert_eq!(report.results[0].model_name, QUADRATIC_BASELINE_NAME);

        for result in &report.results {
            assert!(result.metric(metric::TEST_RMSE).unwrap().is_finite());
            let n_train = result.metric(metric::N_TRAIN).unwrap();
            let n_test = result.metric(metric::N_TEST).unwrap();
            if result.split_strategy.starts_with("spatial_blocks") {
                assert!((n_test - 16.0).abs() < f64::EPSILON);
                assert!((n_train - 39.0).abs() < f64::EPSILON);
            } else {
                assert!((n_train + n_test - 64.0).abs() < f64::EPSILON);
            }
        }

        let baseline = report
            .mean_metric(QUADRATIC_BASELINE_NAME, "kfold(4)", metric::TEST_R2)
            .unwrap();
        assert!(baseline > 0.99, "baseline test R² {baseline}");

        assert!(matches!(
            report.nitrogen_curve.status,
            NitrogenCurveStatus::Concave { .. }
        ));
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let rows = field_rows().into_iter().take(1).collect::<Vec<_>>();
        assert!(matches!(
            evaluate_models(&rows, &config()),
            Err(EvaluationError::InsufficientData { .. })
        ));
    }
}
