//! Assignment of projected points to acre cells.

use acre_map_config::AggregateConfig;
use acre_map_field_models::{CellAggregate, MeasurementType, ProjectedPoint};
use acre_map_grid::{AcreGrid, index::CellIndex};
use geo::Coord;

use crate::nitrogen::merge_nitrogen_passes;

/// Per-cell summaries plus what could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOutcome {
    /// One aggregate per grid cell, in `cell_id` order.
    pub aggregates: Vec<CellAggregate>,
    /// Points that fell outside every cell's tolerance buffer.
    pub unassigned: usize,
    /// Points dropped because their value was not finite.
    pub invalid: usize,
}

/// Welford accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation.
    #[allow(clippy::cast_precision_loss)]
    fn std(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

/// Summarises yield and nitrogen points per acre cell.
///
/// Every cell of `grid` gets an aggregate, including cells no point
/// fell into; their yield and nitrogen fields are `None`. A point on a
/// shared edge is counted once, in the lowest-numbered cell.
/// Nitrogen passes are merged first when
/// `config.nitrogen_merge_resolution_m` is set.
#[must_use]
pub fn aggregate_points(
    grid: &AcreGrid,
    index: &CellIndex,
    points: &[ProjectedPoint],
    config: &AggregateConfig,
) -> AggregationOutcome {
    let merged;
    let points = match config.nitrogen_merge_resolution_m {
        Some(resolution) => {
            merged = merge_nitrogen_passes(points, resolution);
            merged.as_slice()
        }
        None => points,
    };

    let mut yield_stats = vec![RunningStats::default(); grid.len()];
    let mut nitrogen_stats = vec![RunningStats::default(); grid.len()];
    let mut unassigned = 0_usize;
    let mut invalid = 0_usize;

    for point in points {
        if !point.value.is_finite() {
            invalid += 1;
            continue;
        }
        let Some(cell_id) = index.locate(Coord {
            x: point.x,
            y: point.y,
        }) else {
            unassigned += 1;
            continue;
        };
        let Ok(i) = usize::try_from(cell_id.0) else {
            unassigned += 1;
            continue;
        };
        let stats = match point.measurement_type {
            MeasurementType::Yield => &mut yield_stats,
            MeasurementType::Nitrogen => &mut nitrogen_stats,
        };
        if let Some(s) = stats.get_mut(i) {
            s.push(point.value);
        }
    }

    let aggregates: Vec<CellAggregate> = grid
        .cells()
        .iter()
        .zip(yield_stats.iter().zip(&nitrogen_stats))
        .map(|(cell, (y, n))| CellAggregate {
            cell_id: cell.cell_id,
            mean_yield: y.mean(),
            yield_point_count: y.count,
            yield_std: y.std(),
            mean_nitrogen: n.mean(),
            nitrogen_point_count: n.count,
        })
        .collect();

    let with_yield = aggregates.iter().filter(|a| a.yield_point_count > 0).count();
    log::info!(
        "Aggregated {} points into {} cells ({with_yield} with yield data)",
        points.len() - unassigned - invalid,
        aggregates.len()
    );
    if unassigned > 0 {
        log::warn!("{unassigned} points fell outside every acre cell");
    }
    if invalid > 0 {
        log::warn!("{invalid} points had a non-finite value and were skipped");
    }

    AggregationOutcome {
        aggregates,
        unassigned,
        invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acre_map_config::GridConfig;
    use acre_map_field_models::CellId;
    use acre_map_grid::builder::build_acre_grid;
    use geo::{MultiPolygon, Rect};
    use proptest::prelude::*;

    const SIZE: f64 = 63.6;

    fn grid_2x2() -> AcreGrid {
        let boundary = MultiPolygon(vec![
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord {
                x: 2.0 * SIZE,
                y: 2.0 * SIZE,
            })
            .to_polygon(),
        ]);
        build_acre_grid(Some(&boundary), &[], &GridConfig::default()).unwrap()
    }

    fn point(x: f64, y: f64, value: f64, kind: MeasurementType) -> ProjectedPoint {
        ProjectedPoint {
            x,
            y,
            value,
            measurement_type: kind,
            source_id: "test".to_string(),
        }
    }

    #[test]
    fn computes_mean_count_and_sample_std() {
        let grid = grid_2x2();
        let index = CellIndex::new(&grid, 1.0);
        let points = vec![
            point(10.0, 10.0, 170.0, MeasurementType::Yield),
            point(20.0, 10.0, 180.0, MeasurementType::Yield),
            point(30.0, 10.0, 190.0, MeasurementType::Yield),
            point(15.0, 15.0, 150.0, MeasurementType::Nitrogen),
            point(80.0, 10.0, 200.0, MeasurementType::Yield),
        ];
        let outcome = aggregate_points(&grid, &index, &points, &AggregateConfig::default());

        assert_eq!(outcome.aggregates.len(), 4);
        let first = &outcome.aggregates[0];
        assert_eq!(first.cell_id, CellId(0));
        assert_eq!(first.yield_point_count, 3);
        assert!((first.mean_yield.unwrap() - 180.0).abs() < 1e-9);
        assert!((first.yield_std.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(first.nitrogen_point_count, 1);
        assert!((first.mean_nitrogen.unwrap() - 150.0).abs() < 1e-9);

        let second = &outcome.aggregates[1];
        assert_eq!(second.yield_point_count, 1);
        assert!(second.yield_std.is_none());
    }

    #[test]
    fn empty_cells_are_missing_not_zero() {
        let grid = grid_2x2();
        let index = CellIndex::new(&grid, 1.0);
        let outcome = aggregate_points(
            &grid,
            &index,
            &[point(10.0, 10.0, 0.0, MeasurementType::Yield)],
            &AggregateConfig::default(),
        );

        assert_eq!(outcome.aggregates[0].mean_yield, Some(0.0));
        assert_eq!(outcome.aggregates[3], CellAggregate::empty(CellId(3)));
    }

    #[test]
    fn nitrogen_passes_are_summed_before_averaging() {
        let grid = grid_2x2();
        let index = CellIndex::new(&grid, 1.0);
        let points = vec![
            point(10.0, 10.0, 60.0, MeasurementType::Nitrogen),
            point(10.0, 10.0, 100.0, MeasurementType::Nitrogen),
            point(20.0, 10.0, 160.0, MeasurementType::Nitrogen),
        ];

        let merged = aggregate_points(&grid, &index, &points, &AggregateConfig::default());
        assert_eq!(merged.aggregates[0].nitrogen_point_count, 2);
        assert!((merged.aggregates[0].mean_nitrogen.unwrap() - 160.0).abs() < 1e-9);

        let raw = aggregate_points(&grid, &index, &points, &AggregateConfig {
            nitrogen_merge_resolution_m: None,
        });
        assert_eq!(raw.aggregates[0].nitrogen_point_count, 3);
    }

    #[test]
    fn reports_points_outside_the_grid_and_bad_values() {
        let grid = grid_2x2();
        let index = CellIndex::new(&grid, 1.0);
        let points = vec![
            point(500.0, 500.0, 180.0, MeasurementType::Yield),
            point(10.0, 10.0, f64::NAN, MeasurementType::Yield),
        ];
        let outcome = aggregate_points(&grid, &index, &points, &AggregateConfig::default());
        assert_eq!(outcome.unassigned, 1);
        assert_eq!(outcome.invalid, 1);
        assert!(outcome.aggregates.iter().all(|a| a.yield_point_count == 0));
    }

    proptest! {
        #[test]
        fn every_point_is_counted_exactly_once(
            coords in proptest::collection::vec((-3.0f64..2.0 * SIZE + 3.0, -3.0f64..2.0 * SIZE + 3.0, 100.0f64..250.0), 0..300),
        ) {
            let grid = grid_2x2();
            let index = CellIndex::new(&grid, 1.0);
            let points: Vec<ProjectedPoint> = coords
                .iter()
                .map(|&(x, y, v)| point(x, y, v, MeasurementType::Yield))
                .collect();
            let outcome = aggregate_points(&grid, &index, &points, &AggregateConfig::default());
            let counted: usize = outcome.aggregates.iter().map(|a| a.yield_point_count).sum();
            prop_assert_eq!(counted + outcome.unassigned, points.len());

            let again = aggregate_points(&grid, &index, &points, &AggregateConfig::default());
            prop_assert_eq!(outcome, again);
        }
    }
}
