//! Open-Meteo ERA5 archive client.
//!
//! Requests daily `precipitation_sum` (millimetres) for the growing
//! season at one location and reports the total in inches.
//!
//! See <https://open-meteo.com/en/docs/historical-weather-api>

use acre_map_config::WeatherServiceConfig;
use acre_map_field_models::{GeoLocation, SeasonRange};
use async_trait::async_trait;

use crate::http::{build_client, check_status, classify_error, read_json};
use crate::{JoinError, LookupError, WeatherLookup};

const MM_PER_INCH: f64 = 25.4;

pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    /// # Errors
    ///
    /// Returns [`JoinError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &WeatherServiceConfig) -> Result<Self, JoinError> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl WeatherLookup for OpenMeteoClient {
    async fn lookup_weather(
        &self,
        location: GeoLocation,
        season: &SeasonRange,
    ) -> Result<f64, LookupError> {
        log::debug!(
            "Open-Meteo: lat={:.4} lon={:.4} {}..{}",
            location.latitude,
            location.longitude,
            season.start,
            season.end
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("start_date", season.start.format("%Y-%m-%d").to_string()),
                ("end_date", season.end.format("%Y-%m-%d").to_string()),
                ("daily", "precipitation_sum".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        check_status(response.status())?;
        let body = read_json(response).await?;
        parse_rainfall(&body)
    }
}

/// Sums `daily.precipitation_sum`, skipping nulls, and converts to
/// inches.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] if the series is absent.
pub fn parse_rainfall(body: &serde_json::Value) -> Result<f64, LookupError> {
    if let Some(reason) = body.get("reason").and_then(serde_json::Value::as_str) {
        return Err(LookupError::Permanent {
            message: format!("Open-Meteo error: {reason}"),
        });
    }

    let series = body
        .pointer("/daily/precipitation_sum")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| LookupError::NotFound {
            message: "Open-Meteo response has no daily.precipitation_sum".to_string(),
        })?;

    let total_mm: f64 = series.iter().filter_map(serde_json::Value::as_f64).sum();
    Ok(total_mm / MM_PER_INCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_daily_precipitation_in_inches() {
        let body = serde_json::json!({
            "latitude": 39.0,
            "longitude": -92.25,
            "daily": {
                "time": ["2024-04-15", "2024-04-16", "2024-04-17", "2024-04-18"],
                "precipitation_sum": [12.7, null, 0.0, 12.7]
            }
        });
        let inches = parse_rainfall(&body).unwrap();
        assert!((inches - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_series_is_not_found() {
        let body = serde_json::json!({"daily": {"time": []}});
        assert!(matches!(
            parse_rainfall(&body),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn api_error_is_permanent() {
        let body = serde_json::json!({"error": true, "reason": "Latitude must be in range"});
        assert!(matches!(
            parse_rainfall(&body),
            Err(LookupError::Permanent { .. })
        ));
    }
}
