#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row-per-acre feature table.
//!
//! [`assemble_acre_records`] joins the cells that survived the phantom
//! filter with their external attributes and back-projects each cell
//! centre to WGS84. [`write_acre_csv`] and [`read_acre_csv`] persist
//! the table with the fixed column contract of
//! [`acre_map_field_models::ACRE_COLUMNS`].

mod assemble;
mod io;
mod summary;

pub use assemble::assemble_acre_records;
pub use io::{read_acre_csv, read_acre_csv_from, write_acre_csv, write_acre_csv_to};
pub use summary::{CategoricalSummary, NumericSummary, PredictorSummary, summarize_predictors};

use acre_map_field_models::CellId;
use acre_map_projection::ProjectionError;
use thiserror::Error;

/// Errors from assembling, writing, or reading the feature table.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A required column has no value for a surviving cell.
    #[error("Required column '{column}' is missing for cell {cell_id}")]
    MissingRequiredColumn {
        column: &'static str,
        cell_id: CellId,
    },

    /// Two inputs claim the same cell.
    #[error("Cell {cell_id} appears more than once in {source_name}")]
    DuplicateCell {
        cell_id: CellId,
        source_name: &'static str,
    },

    /// A surviving cell is not part of the grid.
    #[error("Cell {cell_id} is not in the grid")]
    UnknownCell { cell_id: CellId },

    /// A CSV file does not carry the contract columns in order.
    #[error("Schema mismatch: expected columns {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
