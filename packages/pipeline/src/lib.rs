#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds the per-acre dataset for one field and season.
//!
//! [`build_field_dataset`] runs projection, grid construction, point
//! aggregation, phantom filtering, the external weather/soil join, and
//! record assembly in that order. Each stage only sees the previous
//! stage's output, so a run can be abandoned between stages without
//! leaving anything half-written.

mod points;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use acre_map_aggregate::{
    AggregateError, AggregationOutcome, PhantomFilterOutcome, aggregate_points,
    filter_phantom_acres,
};
use acre_map_config::RunConfig;
use acre_map_external::{
    ExternalJoin, JoinError, JoinOutcome, ProgressCallback, SoilLookup, WeatherLookup,
};
use acre_map_features::{FeatureError, assemble_acre_records, write_acre_csv};
use acre_map_field_models::{
    AcreRecord, CellId, GeoLocation, MeasurementType, PointMeasurement, ProjectedPoint,
};
use acre_map_grid::builder::build_acre_grid;
use acre_map_grid::index::CellIndex;
use acre_map_grid::{AcreGrid, GridError};
use acre_map_projection::{ProjectionError, Projector};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use thiserror::Error;

pub use points::{read_points_csv, read_points_csv_from};

/// File name of the persisted dataset inside the field's output directory.
pub const DATASET_FILE_NAME: &str = "acre_dataset.csv";

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The field has no point measurements at all.
    #[error("No point measurements were provided for {field}")]
    NoPoints { field: String },

    /// Points were provided but none of them are yield readings.
    #[error("None of the {total} point measurements for {field} are yield readings")]
    NoYieldPoints { field: String, total: usize },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("Failed to read point measurements: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything produced while building one field's dataset.
#[derive(Debug, Clone)]
pub struct FieldDataset {
    pub grid: AcreGrid,
    pub aggregation: AggregationOutcome,
    pub phantom: PhantomFilterOutcome,
    /// External weather and soil attributes for the surviving cells.
    pub attributes: JoinOutcome,
    /// One record per surviving acre, in `cell_id` order.
    pub records: Vec<AcreRecord>,
}

/// Turns raw point measurements into acre records.
///
/// `boundary` is the field outline in the geographic CRS. Without one,
/// the grid covers the convex hull of the yield points expanded by the
/// configured margin.
///
/// # Errors
///
/// * [`PipelineError::Projection`] - the configured CRS is unsupported or
///   a point or boundary vertex cannot be projected
/// * [`PipelineError::NoPoints`] / [`PipelineError::NoYieldPoints`] - no
///   usable input; no grid is built
/// * [`PipelineError::Grid`] - the grid could not be built
/// * [`PipelineError::Aggregate`] - every cell was a phantom acre
/// * [`PipelineError::Join`] - too many cells failed external lookups
/// * [`PipelineError::Feature`] - a required column could not be filled
pub async fn build_field_dataset(
    config: &RunConfig,
    points: &[PointMeasurement],
    boundary: Option<&MultiPolygon<f64>>,
    weather: Arc<dyn WeatherLookup>,
    soil: Arc<dyn SoilLookup>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<FieldDataset, PipelineError> {
    let field = format!("{} {}", config.field.farm_name, config.field.field_name);
    let projector = Projector::new(&config.crs.geographic, &config.crs.projected)?;

    if points.is_empty() {
        return Err(PipelineError::NoPoints { field });
    }
    let yield_count = points
        .iter()
        .filter(|p| p.measurement_type == MeasurementType::Yield)
        .count();
    if yield_count == 0 {
        return Err(PipelineError::NoYieldPoints {
            field,
            total: points.len(),
        });
    }
    log::info!(
        "{field}: {} points ({yield_count} yield, {} nitrogen)",
        points.len(),
        points.len() - yield_count
    );

    let projected = project_points(points, &projector)?;
    let boundary = boundary
        .map(|b| project_boundary(b, &projector))
        .transpose()?;

    let yield_coords: Vec<Coord<f64>> = projected
        .iter()
        .filter(|p| p.measurement_type == MeasurementType::Yield)
        .map(|p| Coord { x: p.x, y: p.y })
        .collect();
    let grid = build_acre_grid(boundary.as_ref(), &yield_coords, &config.grid)?;
    log::info!("{field}: built {} acre cells", grid.len());

    let index = CellIndex::new(&grid, config.grid.assignment_tolerance_m);
    let aggregation = aggregate_points(&grid, &index, &projected, &config.aggregate);

    let phantom = filter_phantom_acres(&aggregation.aggregates, &config.phantom)?;
    log::info!(
        "{field}: {} acres kept, {} phantom acres removed",
        phantom.kept.len(),
        phantom.rejected.len()
    );

    let cells = kept_cell_locations(&grid, &phantom, &projector)?;
    let join = ExternalJoin::new(weather, soil, &config.external);
    let attributes = join
        .join(&cells, &config.field.season_range(), progress)
        .await?;

    let records = assemble_acre_records(
        &grid,
        &phantom.kept,
        &attributes.attributes,
        &projector,
        &config.features,
    )?;
    log::info!("{field}: assembled {} acre records", records.len());

    Ok(FieldDataset {
        grid,
        aggregation,
        phantom,
        attributes,
        records,
    })
}

/// Writes `dataset` to `<dir>/acre_dataset.csv` and returns the path.
///
/// # Errors
///
/// Returns [`PipelineError::Feature`] if the file cannot be written.
pub fn write_field_dataset(dataset: &FieldDataset, dir: &Path) -> Result<PathBuf, PipelineError> {
    let path = dir.join(DATASET_FILE_NAME);
    write_acre_csv(&path, &dataset.records)?;
    log::info!(
        "Wrote {} acre records to {}",
        dataset.records.len(),
        path.display()
    );
    Ok(path)
}

fn project_points(
    points: &[PointMeasurement],
    projector: &Projector,
) -> Result<Vec<ProjectedPoint>, ProjectionError> {
    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();
    let projected = projector.to_projected(&coords)?;

    Ok(points
        .iter()
        .zip(projected)
        .map(|(point, coord)| ProjectedPoint {
            x: coord.x,
            y: coord.y,
            value: point.value,
            measurement_type: point.measurement_type,
            source_id: point.source_id.clone(),
        })
        .collect())
}

fn project_ring(
    ring: &LineString<f64>,
    projector: &Projector,
) -> Result<LineString<f64>, ProjectionError> {
    Ok(LineString::new(projector.to_projected(&ring.0)?))
}

fn project_boundary(
    boundary: &MultiPolygon<f64>,
    projector: &Projector,
) -> Result<MultiPolygon<f64>, ProjectionError> {
    let polygons = boundary
        .0
        .iter()
        .map(|polygon| {
            let exterior = project_ring(polygon.exterior(), projector)?;
            let interiors = polygon
                .interiors()
                .iter()
                .map(|ring| project_ring(ring, projector))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;
    Ok(MultiPolygon(polygons))
}

/// Geographic centroids of the cells that survived the phantom filter.
fn kept_cell_locations(
    grid: &AcreGrid,
    phantom: &PhantomFilterOutcome,
    projector: &Projector,
) -> Result<Vec<(CellId, GeoLocation)>, ProjectionError> {
    let (ids, centroids): (Vec<CellId>, Vec<Coord<f64>>) = phantom
        .kept
        .iter()
        .filter_map(|aggregate| {
            grid.get(aggregate.cell_id)
                .map(|cell| (cell.cell_id, cell.centroid))
        })
        .unzip();

    let geographic = projector.to_geographic(&centroids)?;
    Ok(ids
        .into_iter()
        .zip(geographic)
        .map(|(cell_id, coord)| {
            (
                cell_id,
                GeoLocation {
                    latitude: coord.y,
                    longitude: coord.x,
                },
            )
        })
        .collect())
}
