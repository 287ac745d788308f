//! CSV persistence of the acre table.
//!
//! The header is written from [`AcreRow`]'s field order and checked on
//! read against [`ACRE_COLUMNS`], so a renamed or reordered column is
//! caught before any row is parsed.

use std::io::{Read, Write};
use std::path::Path;

use acre_map_field_models::{ACRE_COLUMNS, AcreRecord, AcreRow};

use crate::FeatureError;

/// Writes `records` as CSV to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`FeatureError::Io`] or [`FeatureError::Csv`] on write
/// failure.
pub fn write_acre_csv(path: &Path, records: &[AcreRecord]) -> Result<(), FeatureError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_acre_csv_to(file, records)?;
    log::info!("Wrote {} acre rows to {}", records.len(), path.display());
    Ok(())
}

/// Writes `records` as CSV to any writer.
///
/// # Errors
///
/// Returns [`FeatureError::Csv`] on serialization or write failure.
pub fn write_acre_csv_to<W: Write>(writer: W, records: &[AcreRecord]) -> Result<(), FeatureError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    // Written explicitly so an empty table still carries its header.
    csv_writer.write_record(ACRE_COLUMNS)?;
    for record in records {
        csv_writer.serialize(AcreRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Reads an acre table from `path`.
///
/// # Errors
///
/// Returns [`FeatureError::SchemaMismatch`] if the header is not
/// exactly [`ACRE_COLUMNS`], and [`FeatureError::Csv`] for a row that
/// does not parse.
pub fn read_acre_csv(path: &Path) -> Result<Vec<AcreRow>, FeatureError> {
    let file = std::fs::File::open(path)?;
    let rows = read_acre_csv_from(file)?;
    log::debug!("Read {} acre rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Reads an acre table from any reader.
///
/// # Errors
///
/// See [`read_acre_csv`].
pub fn read_acre_csv_from<R: Read>(reader: R) -> Result<Vec<AcreRow>, FeatureError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let found: Vec<String> = csv_reader.headers()?.iter().map(ToString::to_string).collect();
    if found != ACRE_COLUMNS {
        return Err(FeatureError::SchemaMismatch {
            expected: ACRE_COLUMNS.iter().map(ToString::to_string).collect(),
            found,
        });
    }

    csv_reader
        .deserialize::<AcreRow>()
        .map(|row| row.map_err(FeatureError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use acre_map_field_models::CellId;

    fn record(id: u64, nitrogen: Option<f64>, soil: Option<&str>) -> AcreRecord {
        AcreRecord {
            cell_id: CellId(id),
            lat: 38.95,
            lon: -92.33,
            mean_yield_bu_ac: 181.5,
            mean_nitrogen_lb_ac: nitrogen,
            rainfall_in: Some(18.25),
            soil_musym: soil.map(ToString::to_string),
            soil_muname: soil.map(|_| "Mexico silt loam, 1 to 4 percent slopes".to_string()),
        }
    }

    #[test]
    fn writes_contract_header_and_empty_cells() {
        let mut buf = Vec::new();
        write_acre_csv_to(&mut buf, &[record(0, None, Some("60B"))]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "mean_yield_bu_ac,mean_nitrogen_lb_ac,soil_musym,soil_muname,rainfall_in,lat,lon"
        );
        assert_eq!(
            lines.next().unwrap(),
            "181.5,,60B,\"Mexico silt loam, 1 to 4 percent slopes\",18.25,38.95,-92.33"
        );
    }

    #[test]
    fn file_round_trip_preserves_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("acre_dataset.csv");
        let records = vec![record(0, Some(140.0), Some("60B")), record(1, None, None)];

        write_acre_csv(&path, &records).unwrap();
        let rows = read_acre_csv(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], AcreRow::from(&records[0]));
        assert_eq!(rows[1].mean_nitrogen_lb_ac, None);
        assert_eq!(rows[1].soil_musym, None);
        assert_eq!(rows[1].mean_yield_bu_ac, Some(181.5));
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_acre_csv(&path, &[]).unwrap();
        assert!(read_acre_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn reordered_columns_are_a_schema_mismatch() {
        let csv = "lat,lon,mean_yield_bu_ac,mean_nitrogen_lb_ac,soil_musym,soil_muname,rainfall_in\n\
                   38.9,-92.3,180,,,,\n";
        let err = read_acre_csv_from(csv.as_bytes()).unwrap_err();
        let FeatureError::SchemaMismatch { found, .. } = err else {
            panic!("expected a schema mismatch");
        };
        assert_eq!(found[0], "lat");
    }

    #[test]
    fn renamed_column_is_a_schema_mismatch() {
        let csv = "yield,mean_nitrogen_lb_ac,soil_musym,soil_muname,rainfall_in,lat,lon\n";
        assert!(matches!(
            read_acre_csv_from(csv.as_bytes()),
            Err(FeatureError::SchemaMismatch { .. })
        ));
    }
}
