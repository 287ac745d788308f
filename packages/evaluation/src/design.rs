//! Design matrices built from the acre table.
//!
//! Numeric predictors are used as-is. `soil_musym` is dummy coded with
//! missing values mapped to [`UNKNOWN_SOIL`]; levels are sorted and the
//! first is dropped as the reference level. Columns with no values at
//! all are dropped, then rows with any remaining gap.

use std::collections::BTreeSet;

use acre_map_field_models::AcreRow;
use geo::Coord;
use nalgebra::{DMatrix, DVector};

/// Level used for cells whose soil lookup failed.
pub const UNKNOWN_SOIL: &str = "UNK";

/// Predictors, target, and the location of each row.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub columns: Vec<String>,
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    /// `(lon, lat)` of each row, for spatial splitting.
    pub locations: Vec<Coord<f64>>,
}

impl DesignMatrix {
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.y.len()
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }
}

type Column = (String, Vec<Option<f64>>);

/// The standard candidate-model design: nitrogen, rainfall, optionally
/// `lat`/`lon`, and soil dummies. Rows without yield are skipped.
#[must_use]
pub fn build_design_matrix(rows: &[AcreRow], use_coords: bool) -> DesignMatrix {
    let kept: Vec<&AcreRow> = rows
        .iter()
        .filter(|r| r.mean_yield_bu_ac.is_some_and(f64::is_finite))
        .collect();

    let mut columns: Vec<Column> = vec![
        (
            "mean_nitrogen_lb_ac".to_string(),
            kept.iter().map(|r| r.mean_nitrogen_lb_ac).collect(),
        ),
        (
            "rainfall_in".to_string(),
            kept.iter().map(|r| r.rainfall_in).collect(),
        ),
    ];
    if use_coords {
        columns.push(("lat".to_string(), kept.iter().map(|r| Some(r.lat)).collect()));
        columns.push(("lon".to_string(), kept.iter().map(|r| Some(r.lon)).collect()));
    }
    columns.extend(soil_dummies(&kept));

    assemble(columns, &kept)
}

/// The `[N, N², soil]` baseline design. Rows without yield or nitrogen
/// are skipped.
#[must_use]
pub fn build_quadratic_design(rows: &[AcreRow]) -> DesignMatrix {
    let kept: Vec<&AcreRow> = rows
        .iter()
        .filter(|r| r.mean_yield_bu_ac.is_some_and(f64::is_finite))
        .filter(|r| r.mean_nitrogen_lb_ac.is_some_and(f64::is_finite))
        .collect();

    let mut columns: Vec<Column> = vec![
        (
            "N".to_string(),
            kept.iter().map(|r| r.mean_nitrogen_lb_ac).collect(),
        ),
        (
            "N2".to_string(),
            kept.iter()
                .map(|r| r.mean_nitrogen_lb_ac.map(|n| n * n))
                .collect(),
        ),
    ];
    columns.extend(soil_dummies(&kept));

    assemble(columns, &kept)
}

fn soil_dummies(rows: &[&AcreRow]) -> Vec<Column> {
    let level = |row: &AcreRow| -> String {
        row.soil_musym
            .clone()
            .unwrap_or_else(|| UNKNOWN_SOIL.to_string())
    };

    let levels: BTreeSet<String> = rows.iter().map(|r| level(*r)).collect();

    levels
        .into_iter()
        .skip(1)
        .map(|name| {
            let values = rows
                .iter()
                .map(|r| Some(if level(*r) == name { 1.0 } else { 0.0 }))
                .collect();
            (format!("soil_musym_{name}"), values)
        })
        .collect()
}

fn assemble(columns: Vec<Column>, rows: &[&AcreRow]) -> DesignMatrix {
    let (empty, columns): (Vec<Column>, Vec<Column>) = columns
        .into_iter()
        .partition(|(_, values)| values.iter().all(|v| !v.is_some_and(f64::is_finite)));
    if !empty.is_empty() {
        let names: Vec<&str> = empty.iter().map(|(name, _)| name.as_str()).collect();
        log::info!("Dropping all-missing feature columns: {names:?}");
    }

    let complete: Vec<usize> = (0..rows.len())
        .filter(|&i| {
            columns
                .iter()
                .all(|(_, values)| values[i].is_some_and(f64::is_finite))
        })
        .collect();
    let dropped = rows.len() - complete.len();
    if dropped > 0 {
        log::info!("Dropping {dropped} rows with missing feature values");
    }

    let x = DMatrix::from_fn(complete.len(), columns.len(), |r, c| {
        columns[c].1[complete[r]].unwrap_or_default()
    });
    let y = DVector::from_iterator(
        complete.len(),
        complete
            .iter()
            .map(|&i| rows[i].mean_yield_bu_ac.unwrap_or_default()),
    );
    let locations = complete
        .iter()
        .map(|&i| Coord {
            x: rows[i].lon,
            y: rows[i].lat,
        })
        .collect();

    log::debug!("Design matrix: {} x {}", x.nrows(), x.ncols());

    DesignMatrix {
        columns: columns.into_iter().map(|(name, _)| name).collect(),
        x,
        y,
        locations,
    }
}
