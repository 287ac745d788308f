//! Relational join of cell aggregates and external attributes.

use std::collections::BTreeMap;

use acre_map_config::FeatureConfig;
use acre_map_field_models::{AcreRecord, CellAggregate, CellId, ExternalAttributes};
use acre_map_grid::AcreGrid;
use acre_map_projection::Projector;
use geo::Coord;

use crate::FeatureError;

/// Builds one [`AcreRecord`] per kept cell, ordered by `cell_id`.
///
/// Attributes are matched to aggregates by `cell_id`; a kept cell with
/// no attribute entry gets empty weather and soil columns. Cell centres
/// are back-projected to WGS84 in one batch.
///
/// # Errors
///
/// * [`FeatureError::DuplicateCell`] - a cell occurs twice in either input
/// * [`FeatureError::UnknownCell`] - a kept cell is not part of `grid`
/// * [`FeatureError::MissingRequiredColumn`] - a non-optional column is empty
/// * [`FeatureError::Projection`] - a centre cannot be back-projected
pub fn assemble_acre_records(
    grid: &AcreGrid,
    kept: &[CellAggregate],
    attributes: &[ExternalAttributes],
    projector: &Projector,
    config: &FeatureConfig,
) -> Result<Vec<AcreRecord>, FeatureError> {
    let mut by_cell: BTreeMap<CellId, &ExternalAttributes> = BTreeMap::new();
    for attrs in attributes {
        if by_cell.insert(attrs.cell_id, attrs).is_some() {
            return Err(FeatureError::DuplicateCell {
                cell_id: attrs.cell_id,
                source_name: "external attributes",
            });
        }
    }

    let mut aggregates: BTreeMap<CellId, &CellAggregate> = BTreeMap::new();
    for aggregate in kept {
        if aggregates.insert(aggregate.cell_id, aggregate).is_some() {
            return Err(FeatureError::DuplicateCell {
                cell_id: aggregate.cell_id,
                source_name: "cell aggregates",
            });
        }
    }

    let centroids = aggregates
        .keys()
        .map(|&cell_id| {
            grid.get(cell_id)
                .map(|cell| cell.centroid)
                .ok_or(FeatureError::UnknownCell { cell_id })
        })
        .collect::<Result<Vec<Coord<f64>>, _>>()?;
    let lon_lat = projector.to_geographic(&centroids)?;

    let mut records = Vec::with_capacity(aggregates.len());
    let mut incomplete = 0_usize;
    for ((&cell_id, aggregate), position) in aggregates.iter().zip(lon_lat) {
        let mean_yield_bu_ac = aggregate
            .mean_yield
            .ok_or(FeatureError::MissingRequiredColumn {
                column: "mean_yield_bu_ac",
                cell_id,
            })?;

        let attrs = by_cell.get(&cell_id);
        let record = AcreRecord {
            cell_id,
            lat: position.y,
            lon: position.x,
            mean_yield_bu_ac,
            mean_nitrogen_lb_ac: aggregate.mean_nitrogen,
            rainfall_in: attrs.and_then(|a| a.rainfall_in),
            soil_musym: attrs.and_then(|a| a.soil_musym.clone()),
            soil_muname: attrs.and_then(|a| a.soil_muname.clone()),
        };

        check_required(&record, config)?;
        if !attrs.is_some_and(|a| a.is_complete()) {
            incomplete += 1;
        }
        records.push(record);
    }

    log::info!(
        "Assembled {} acre records ({incomplete} with missing external attributes)",
        records.len()
    );

    Ok(records)
}

fn check_required(record: &AcreRecord, config: &FeatureConfig) -> Result<(), FeatureError> {
    let optional_columns = [
        ("mean_nitrogen_lb_ac", record.mean_nitrogen_lb_ac.is_some()),
        ("rainfall_in", record.rainfall_in.is_some()),
        ("soil_musym", record.soil_musym.is_some()),
        ("soil_muname", record.soil_muname.is_some()),
    ];

    for (column, present) in optional_columns {
        if !present && !config.is_optional(column) {
            return Err(FeatureError::MissingRequiredColumn {
                column,
                cell_id: record.cell_id,
            });
        }
    }
    Ok(())
}
