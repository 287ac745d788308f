#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Acre grid construction and cell lookups.
//!
//! [`builder::build_acre_grid`] lays an axis-aligned lattice of
//! one-acre cells over a field boundary in projected coordinates and
//! numbers the kept cells in row-major order. [`index::CellIndex`]
//! answers "which cell holds this point" through an R-tree over cell
//! extents. The resulting [`AcreGrid`] is the only place cell geometry
//! lives; every other component refers to cells by [`CellId`].

pub mod builder;
pub mod index;

use acre_map_field_models::CellId;
use geo::{Coord, MultiPolygon, Polygon};
use geojson::GeoJson;
use thiserror::Error;

/// Errors from grid construction or boundary parsing.
#[derive(Debug, Error)]
pub enum GridError {
    /// No points were supplied to derive a boundary from.
    #[error("Cannot build a grid from zero points")]
    EmptyInput,

    /// The boundary has no extent.
    #[error("Field boundary is empty")]
    EmptyBoundary,

    /// The lattice produced no cells inside the boundary.
    #[error("No grid cell falls inside the field boundary")]
    NoCells,

    /// The configured cell does not cover one acre.
    #[error("Invalid cell size: {message}")]
    CellSize { message: String },

    /// A boundary document could not be interpreted.
    #[error("Boundary parse error: {message}")]
    Boundary {
        /// Description of what went wrong.
        message: String,
    },
}

/// One acre cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub cell_id: CellId,
    /// Lattice row, counted north from the southern edge.
    pub row: u32,
    /// Lattice column, counted east from the western edge.
    pub col: u32,
    /// Centre in projected coordinates.
    pub centroid: Coord<f64>,
    pub polygon: Polygon<f64>,
    pub area_m2: f64,
}

impl GridCell {
    /// Whether two cells share an edge or a corner.
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        let dr = self.row.abs_diff(other.row);
        let dc = self.col.abs_diff(other.col);
        dr <= 1 && dc <= 1 && !(dr == 0 && dc == 0)
    }
}

/// The full set of cells built for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct AcreGrid {
    cells: Vec<GridCell>,
    cell_size_m: f64,
    origin: Coord<f64>,
    rows: u32,
    cols: u32,
}

impl AcreGrid {
    /// Cells in `cell_id` order.
    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Looks up a cell by id.
    #[must_use]
    pub fn get(&self, cell_id: CellId) -> Option<&GridCell> {
        usize::try_from(cell_id.0)
            .ok()
            .and_then(|i| self.cells.get(i))
            .filter(|cell| cell.cell_id == cell_id)
    }

    #[must_use]
    pub const fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    /// South-west corner of the lattice.
    #[must_use]
    pub const fn origin(&self) -> Coord<f64> {
        self.origin
    }

    /// Lattice dimensions `(rows, cols)` before boundary filtering.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }
}

/// Parses a `GeoJSON` geometry, feature, or feature collection into a
/// [`MultiPolygon`]. Every polygonal geometry found is included.
///
/// # Errors
///
/// Returns [`GridError::Boundary`] if the document is not valid
/// `GeoJSON` or contains no polygons.
pub fn parse_boundary_geojson(geojson_str: &str) -> Result<MultiPolygon<f64>, GridError> {
    let geojson: GeoJson = geojson_str.parse().map_err(|e| GridError::Boundary {
        message: format!("invalid GeoJSON: {e}"),
    })?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geom) => vec![geom],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geom in geometries {
        let geo_geom: geo::Geometry<f64> = geom.try_into().map_err(|e| GridError::Boundary {
            message: format!("unsupported geometry: {e}"),
        })?;
        match geo_geom {
            geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            geo::Geometry::Polygon(p) => polygons.push(p),
            other => {
                log::warn!("Ignoring non-polygon boundary geometry: {other:?}");
            }
        }
    }

    if polygons.is_empty() {
        return Err(GridError::Boundary {
            message: "no polygon found in boundary document".to_string(),
        });
    }

    Ok(MultiPolygon(polygons))
}
