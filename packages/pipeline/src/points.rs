//! Point measurement CSV input.
//!
//! One row per reading with the columns `latitude, longitude, value,
//! measurement_type, timestamp, source_id`. `measurement_type` is
//! `yield` or `nitrogen` and `timestamp` is RFC 3339.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use acre_map_field_models::PointMeasurement;

use crate::PipelineError;

/// Reads point measurements from a CSV file.
///
/// # Errors
///
/// * [`PipelineError::Io`] - the file cannot be opened
/// * [`PipelineError::Csv`] - a row is malformed
pub fn read_points_csv(path: &Path) -> Result<Vec<PointMeasurement>, PipelineError> {
    let points = read_points_csv_from(BufReader::new(File::open(path)?))?;
    log::debug!("Read {} points from {}", points.len(), path.display());
    Ok(points)
}

/// Reads point measurements from any CSV source.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if a row is malformed.
pub fn read_points_csv_from<R: Read>(reader: R) -> Result<Vec<PointMeasurement>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    reader
        .deserialize()
        .collect::<Result<Vec<PointMeasurement>, csv::Error>>()
        .map_err(PipelineError::from)
}
