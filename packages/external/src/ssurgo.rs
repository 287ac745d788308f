//! USDA Soil Data Access (SSURGO) client.
//!
//! Posts a T-SQL query that selects the map unit intersecting a WGS84
//! point. The service answers `{"Table": [...]}` with each row either
//! an object or a positional array, and with an empty object when no
//! map unit matched.
//!
//! See <https://sdmdataaccess.nrcs.usda.gov/>

use acre_map_config::SoilServiceConfig;
use acre_map_field_models::{GeoLocation, SoilUnit};
use async_trait::async_trait;

use crate::http::{build_client, check_status, classify_error, read_json};
use crate::{JoinError, LookupError, SoilLookup};

pub struct SoilDataAccessClient {
    client: reqwest::Client,
    base_url: String,
}

impl SoilDataAccessClient {
    /// # Errors
    ///
    /// Returns [`JoinError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &SoilServiceConfig) -> Result<Self, JoinError> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl SoilLookup for SoilDataAccessClient {
    async fn lookup_soil(&self, location: GeoLocation) -> Result<SoilUnit, LookupError> {
        let query = map_unit_query(location);
        log::debug!(
            "SDA: lat={:.6} lon={:.6}",
            location.latitude,
            location.longitude
        );

        let response = self
            .client
            .post(&self.base_url)
            .form(&[("QUERY", query.as_str()), ("FORMAT", "JSON")])
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        check_status(response.status())?;
        let body = read_json(response).await?;
        parse_soil_response(&body)
    }
}

/// T-SQL selecting the first map unit under a WGS84 point.
#[must_use]
pub fn map_unit_query(location: GeoLocation) -> String {
    format!(
        "SELECT TOP 1 mu.musym, mu.muname FROM mapunit mu WHERE mu.mukey IN (\
         SELECT mukey FROM SDA_Get_Mukey_from_intersection_with_WktWgs84('point ({} {})'))",
        location.longitude, location.latitude
    )
}

/// Extracts the first row of an SDA `Table` response.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] for an empty table and
/// [`LookupError::Permanent`] for rows of an unexpected shape.
pub fn parse_soil_response(body: &serde_json::Value) -> Result<SoilUnit, LookupError> {
    let not_found = || LookupError::NotFound {
        message: "no soil map unit at location".to_string(),
    };

    let first = body
        .get("Table")
        .and_then(serde_json::Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or_else(not_found)?;

    let (musym, muname) = match first {
        serde_json::Value::Object(row) => (
            row.get("musym").and_then(serde_json::Value::as_str),
            row.get("muname").and_then(serde_json::Value::as_str),
        ),
        serde_json::Value::Array(row) if row.len() >= 2 => (row[0].as_str(), row[1].as_str()),
        other => {
            return Err(LookupError::Permanent {
                message: format!("unexpected SDA row: {other}"),
            });
        }
    };

    match (musym, muname) {
        (Some(musym), Some(muname)) => Ok(SoilUnit {
            musym: musym.to_string(),
            muname: muname.to_string(),
        }),
        _ => Err(not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_rows() {
        let body = serde_json::json!({
            "Table": [["60B", "Mexico silt loam, 1 to 4 percent slopes"]]
        });
        let unit = parse_soil_response(&body).unwrap();
        assert_eq!(unit.musym, "60B");
        assert_eq!(unit.muname, "Mexico silt loam, 1 to 4 percent slopes");
    }

    #[test]
    fn parses_object_rows() {
        let body = serde_json::json!({
            "Table": [{"musym": "30A", "muname": "Leonard silt loam"}]
        });
        assert_eq!(parse_soil_response(&body).unwrap().musym, "30A");
    }

    #[test]
    fn empty_response_is_not_found() {
        assert!(matches!(
            parse_soil_response(&serde_json::json!({})),
            Err(LookupError::NotFound { .. })
        ));
        assert!(matches!(
            parse_soil_response(&serde_json::Value::Null),
            Err(LookupError::NotFound { .. })
        ));
        assert!(matches!(
            parse_soil_response(&serde_json::json!({"Table": [[null, null]]})),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn query_uses_lon_lat_order() {
        let sql = map_unit_query(GeoLocation {
            latitude: 38.95,
            longitude: -92.33,
        });
        assert!(sql.contains("point (-92.33 38.95)"));
        assert!(sql.starts_with("SELECT TOP 1 mu.musym, mu.muname"));
    }
}
