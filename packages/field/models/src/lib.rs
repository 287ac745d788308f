#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point, cell, and acre record types for the acre map pipeline.
//!
//! Loaders produce [`PointMeasurement`] records in WGS84. Everything
//! downstream of the grid refers to cells by [`CellId`] only; geometry
//! lives with the grid itself. The final row type [`AcreRow`] is the
//! persisted CSV contract and its column order is fixed by
//! [`ACRE_COLUMNS`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Column names of the persisted acre dataset, in file order.
///
/// Downstream consumers (including the evaluation harness) depend on
/// these exact names.
pub const ACRE_COLUMNS: [&str; 7] = [
    "mean_yield_bu_ac",
    "mean_nitrogen_lb_ac",
    "soil_musym",
    "soil_muname",
    "rainfall_in",
    "lat",
    "lon",
];

/// What a point measurement measures.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MeasurementType {
    /// Harvester yield monitor reading (bu/ac).
    Yield,
    /// Nitrogen application record (lb/ac).
    Nitrogen,
}

/// A single raw measurement as handed over by a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMeasurement {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Measured value in the unit implied by `measurement_type`.
    pub value: f64,
    /// Yield or nitrogen.
    pub measurement_type: MeasurementType,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Identifies the file/pass the point came from.
    pub source_id: String,
}

/// A measurement after projection into the field's linear CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
    pub value: f64,
    pub measurement_type: MeasurementType,
    pub source_id: String,
}

/// Stable identifier of a grid cell, assigned in row-major scan order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05}", self.0)
    }
}

/// A WGS84 location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Growing-season date range used for weather lookups (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeasonRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Per-cell summary statistics.
///
/// Yield fields are `None` when no yield point fell in the cell, so
/// "no data" is never confused with a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellAggregate {
    pub cell_id: CellId,
    pub mean_yield: Option<f64>,
    pub yield_point_count: usize,
    /// Sample standard deviation; `None` below two points.
    pub yield_std: Option<f64>,
    pub mean_nitrogen: Option<f64>,
    pub nitrogen_point_count: usize,
}

impl CellAggregate {
    /// An aggregate for a cell no point fell into.
    #[must_use]
    pub const fn empty(cell_id: CellId) -> Self {
        Self {
            cell_id,
            mean_yield: None,
            yield_point_count: 0,
            yield_std: None,
            mean_nitrogen: None,
            nitrogen_point_count: 0,
        }
    }

    /// Coefficient of variation of the yield readings, when defined.
    #[must_use]
    pub fn yield_cv(&self) -> Option<f64> {
        match (self.yield_std, self.mean_yield) {
            (Some(std), Some(mean)) if mean.abs() > f64::EPSILON => Some(std / mean.abs()),
            _ => None,
        }
    }
}

/// A soil map unit descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoilUnit {
    /// Map unit symbol (e.g. `"60B"`).
    pub musym: String,
    /// Map unit name (e.g. `"Mexico silt loam, 1 to 4 percent slopes"`).
    pub muname: String,
}

/// Weather and soil attributes attached to one cell.
///
/// Each attribute is `None` when its lookup failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAttributes {
    pub cell_id: CellId,
    pub rainfall_in: Option<f64>,
    pub soil_musym: Option<String>,
    pub soil_muname: Option<String>,
}

impl ExternalAttributes {
    /// Whether every attribute resolved.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.rainfall_in.is_some() && self.soil_musym.is_some() && self.soil_muname.is_some()
    }
}

/// One row of the final feature table, still carrying its join key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcreRecord {
    pub cell_id: CellId,
    pub lat: f64,
    pub lon: f64,
    pub mean_yield_bu_ac: f64,
    pub mean_nitrogen_lb_ac: Option<f64>,
    pub rainfall_in: Option<f64>,
    pub soil_musym: Option<String>,
    pub soil_muname: Option<String>,
}

/// The persisted form of an [`AcreRecord`].
///
/// Field order matches [`ACRE_COLUMNS`]; `cell_id` is internal and
/// not written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcreRow {
    pub mean_yield_bu_ac: Option<f64>,
    pub mean_nitrogen_lb_ac: Option<f64>,
    pub soil_musym: Option<String>,
    pub soil_muname: Option<String>,
    pub rainfall_in: Option<f64>,
    pub lat: f64,
    pub lon: f64,
}

impl From<&AcreRecord> for AcreRow {
    fn from(record: &AcreRecord) -> Self {
        Self {
            mean_yield_bu_ac: Some(record.mean_yield_bu_ac),
            mean_nitrogen_lb_ac: record.mean_nitrogen_lb_ac,
            soil_musym: record.soil_musym.clone(),
            soil_muname: record.soil_muname.clone(),
            rainfall_in: record.rainfall_in,
            lat: record.lat,
            lon: record.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_type_parses_snake_case() {
        assert_eq!(
            "yield".parse::<MeasurementType>().unwrap(),
            MeasurementType::Yield
        );
        assert_eq!(
            "nitrogen".parse::<MeasurementType>().unwrap(),
            MeasurementType::Nitrogen
        );
        assert!("moisture".parse::<MeasurementType>().is_err());
        assert_eq!(MeasurementType::Nitrogen.to_string(), "nitrogen");
    }

    #[test]
    fn acre_row_serializes_in_contract_order() {
        let row = AcreRow {
            mean_yield_bu_ac: Some(180.0),
            mean_nitrogen_lb_ac: None,
            soil_musym: Some("60B".to_string()),
            soil_muname: Some("Mexico silt loam".to_string()),
            rainfall_in: Some(18.5),
            lat: 38.95,
            lon: -92.33,
        };
        let value = serde_json::to_value(&row).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let mut expected = ACRE_COLUMNS.to_vec();
        expected.sort_unstable();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn yield_cv_requires_std_and_nonzero_mean() {
        let mut agg = CellAggregate::empty(CellId(3));
        assert!(agg.yield_cv().is_none());

        agg.mean_yield = Some(200.0);
        agg.yield_std = Some(20.0);
        assert!((agg.yield_cv().unwrap() - 0.1).abs() < 1e-12);

        agg.mean_yield = Some(0.0);
        assert!(agg.yield_cv().is_none());
    }

    #[test]
    fn cell_id_displays_zero_padded() {
        assert_eq!(CellId(42).to_string(), "00042");
    }
}
