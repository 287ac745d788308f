//! The field-level external join.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use acre_map_config::ExternalConfig;
use acre_map_field_models::{CellId, ExternalAttributes, GeoLocation, SeasonRange, SoilUnit};
use futures::stream::{self, StreamExt as _};

use crate::cache::LookupCache;
use crate::key::{LocationKey, WeatherKey};
use crate::progress::ProgressCallback;
use crate::retry::{RetryPolicy, with_retry};
use crate::{JoinError, LookupError, SoilLookup, WeatherLookup};

/// Result of joining external attributes onto a set of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// One entry per input cell, ascending by `cell_id`.
    pub attributes: Vec<ExternalAttributes>,
    /// Distinct weather keys the cells reduced to.
    pub weather_keys: usize,
    /// Distinct soil keys the cells reduced to.
    pub soil_keys: usize,
    /// Cells left with at least one missing attribute.
    pub incomplete_cells: Vec<CellId>,
}

/// Weather and soil lookups with a per-run cache.
///
/// The cache lives as long as the `ExternalJoin`, so joining the same
/// cells twice issues no further calls.
pub struct ExternalJoin {
    weather: Arc<dyn WeatherLookup>,
    soil: Arc<dyn SoilLookup>,
    config: ExternalConfig,
    weather_cache: LookupCache<WeatherKey, f64>,
    soil_cache: LookupCache<LocationKey, SoilUnit>,
}

impl ExternalJoin {
    #[must_use]
    pub fn new(
        weather: Arc<dyn WeatherLookup>,
        soil: Arc<dyn SoilLookup>,
        config: &ExternalConfig,
    ) -> Self {
        Self {
            weather,
            soil,
            config: config.clone(),
            weather_cache: LookupCache::new(),
            soil_cache: LookupCache::new(),
        }
    }

    /// Attaches rainfall and soil attributes to each cell centroid.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::SystemicFailure`] when more than
    /// `max_failure_fraction` of the cells end up with a missing
    /// attribute.
    pub async fn join(
        &self,
        cells: &[(CellId, GeoLocation)],
        season: &SeasonRange,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<JoinOutcome, JoinError> {
        let weather_res = self.config.weather.resolution_deg;
        let soil_res = self.config.soil.resolution_deg;

        let keyed: Vec<(CellId, WeatherKey, LocationKey)> = cells
            .iter()
            .map(|&(cell_id, location)| {
                (
                    cell_id,
                    WeatherKey {
                        season: *season,
                        location: LocationKey::snap(location, weather_res),
                    },
                    LocationKey::snap(location, soil_res),
                )
            })
            .collect();

        let weather_keys: BTreeSet<WeatherKey> = keyed.iter().map(|(_, w, _)| *w).collect();
        let soil_keys: BTreeSet<LocationKey> = keyed.iter().map(|(_, _, s)| *s).collect();

        let weather_todo: Vec<WeatherKey> = weather_keys
            .iter()
            .filter(|k| !self.weather_cache.contains(k))
            .copied()
            .collect();
        let soil_todo: Vec<LocationKey> = soil_keys
            .iter()
            .filter(|k| !self.soil_cache.contains(k))
            .copied()
            .collect();

        log::info!(
            "External join: {} cells -> {} weather keys ({} uncached), {} soil keys ({} uncached)",
            cells.len(),
            weather_keys.len(),
            weather_todo.len(),
            soil_keys.len(),
            soil_todo.len()
        );

        progress.set_total((weather_todo.len() + soil_todo.len()) as u64);
        progress.set_message("Looking up weather and soil".to_string());

        tokio::join!(
            self.fetch_weather(&weather_todo, progress),
            self.fetch_soil(&soil_todo, progress)
        );

        progress.finish(format!(
            "Resolved {} weather and {} soil keys",
            self.weather_cache.len(),
            self.soil_cache.len()
        ));

        let mut attributes: Vec<ExternalAttributes> = keyed
            .iter()
            .map(|(cell_id, weather_key, soil_key)| {
                let soil = self.soil_cache.get(soil_key);
                ExternalAttributes {
                    cell_id: *cell_id,
                    rainfall_in: self.weather_cache.get(weather_key),
                    soil_musym: soil.as_ref().map(|s| s.musym.clone()),
                    soil_muname: soil.map(|s| s.muname),
                }
            })
            .collect();
        attributes.sort_by_key(|a| a.cell_id);

        let incomplete_cells: Vec<CellId> = attributes
            .iter()
            .filter(|a| !a.is_complete())
            .map(|a| a.cell_id)
            .collect();

        check_failure_fraction(
            &incomplete_cells,
            cells.len(),
            self.config.max_failure_fraction,
        )?;

        Ok(JoinOutcome {
            attributes,
            weather_keys: weather_keys.len(),
            soil_keys: soil_keys.len(),
            incomplete_cells,
        })
    }

    async fn fetch_weather(&self, keys: &[WeatherKey], progress: &Arc<dyn ProgressCallback>) {
        let policy = RetryPolicy::from_config(&self.config, self.config.weather.timeout_secs);
        let resolution = self.config.weather.resolution_deg;

        let results: BTreeMap<WeatherKey, Result<f64, LookupError>> =
            stream::iter(keys.iter().map(|&key| {
                let weather = Arc::clone(&self.weather);
                async move {
                    let location = key.location.location(resolution);
                    let result = with_retry("weather", &policy, || {
                        weather.lookup_weather(location, &key.season)
                    })
                    .await;
                    progress.inc(1);
                    (key, result)
                }
            }))
            .buffer_unordered(self.config.max_concurrent_requests.max(1))
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(rainfall) => {
                    self.weather_cache.insert_if_absent(key, rainfall);
                }
                Err(e) => log::warn!("Weather lookup failed for {key:?}: {e}"),
            }
        }
    }

    async fn fetch_soil(&self, keys: &[LocationKey], progress: &Arc<dyn ProgressCallback>) {
        let policy = RetryPolicy::from_config(&self.config, self.config.soil.timeout_secs);
        let resolution = self.config.soil.resolution_deg;

        let results: BTreeMap<LocationKey, Result<SoilUnit, LookupError>> =
            stream::iter(keys.iter().map(|&key| {
                let soil = Arc::clone(&self.soil);
                async move {
                    let location = key.location(resolution);
                    let result =
                        with_retry("soil", &policy, || soil.lookup_soil(location)).await;
                    progress.inc(1);
                    (key, result)
                }
            }))
            .buffer_unordered(self.config.max_concurrent_requests.max(1))
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(unit) => {
                    self.soil_cache.insert_if_absent(key, unit);
                }
                Err(e) => log::warn!("Soil lookup failed for {key:?}: {e}"),
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_failure_fraction(
    incomplete: &[CellId],
    total: usize,
    max_fraction: f64,
) -> Result<(), JoinError> {
    if incomplete.is_empty() || total == 0 {
        return Ok(());
    }

    let fraction = incomplete.len() as f64 / total as f64;
    if fraction > max_fraction {
        log::error!(
            "{} of {total} cells are missing external attributes (limit {max_fraction})",
            incomplete.len()
        );
        return Err(JoinError::SystemicFailure {
            cell_ids: incomplete.to_vec(),
            failed: incomplete.len(),
            total,
            max_fraction,
        });
    }

    log::warn!(
        "{} of {total} cells are missing an external attribute",
        incomplete.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use acre_map_config::{SoilServiceConfig, WeatherServiceConfig};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWeather {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherLookup for CountingWeather {
        async fn lookup_weather(
            &self,
            location: GeoLocation,
            _season: &SeasonRange,
        ) -> Result<f64, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(20.0 + location.longitude.abs() / 100.0)
        }
    }

    /// Fails for locations east of `fail_east_of`.
    struct CountingSoil {
        calls: AtomicUsize,
        fail_east_of: f64,
    }

    #[async_trait]
    impl SoilLookup for CountingSoil {
        async fn lookup_soil(&self, location: GeoLocation) -> Result<SoilUnit, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if location.longitude > self.fail_east_of {
                return Err(LookupError::NotFound {
                    message: "outside survey".to_string(),
                });
            }
            Ok(SoilUnit {
                musym: "60B".to_string(),
                muname: "Mexico silt loam".to_string(),
            })
        }
    }

    fn config(max_failure_fraction: f64) -> ExternalConfig {
        ExternalConfig {
            max_failure_fraction,
            max_concurrent_requests: 4,
            max_attempts: 2,
            backoff_base_ms: 1,
            weather: WeatherServiceConfig::default(),
            soil: SoilServiceConfig::default(),
        }
    }

    fn season() -> SeasonRange {
        SeasonRange {
            start: NaiveDate::from_ymd_opt(2024, 4, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 10, 15).unwrap(),
        }
    }

    /// 50 cells spread over three 0.25° weather cells.
    fn fifty_cells() -> Vec<(CellId, GeoLocation)> {
        let centers = [-92.25, -92.0, -91.75];
        (0..50u64)
            .map(|i| {
                let center = centers[usize::try_from(i % 3).unwrap()];
                #[allow(clippy::cast_precision_loss)]
                let jitter = (i as f64) * 0.0005;
                (CellId(i), GeoLocation {
                    latitude: 39.0 + jitter / 2.0,
                    longitude: center + jitter / 3.0,
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn fifty_cells_in_three_weather_cells_issue_three_weather_calls() {
        let weather = Arc::new(CountingWeather::default());
        let soil = Arc::new(CountingSoil {
            calls: AtomicUsize::new(0),
            fail_east_of: 0.0,
        });
        let join = ExternalJoin::new(weather.clone(), soil.clone(), &config(0.2));

        let outcome = join
            .join(&fifty_cells(), &season(), &null_progress())
            .await
            .unwrap();

        assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.weather_keys, 3);
        assert_eq!(soil.calls.load(Ordering::SeqCst), outcome.soil_keys);
        assert_eq!(outcome.attributes.len(), 50);
        assert!(outcome.attributes.iter().all(ExternalAttributes::is_complete));
        assert!(
            outcome
                .attributes
                .windows(2)
                .all(|w| w[0].cell_id < w[1].cell_id)
        );
    }

    #[tokio::test]
    async fn cached_keys_are_never_refetched() {
        let weather = Arc::new(CountingWeather::default());
        let soil = Arc::new(CountingSoil {
            calls: AtomicUsize::new(0),
            fail_east_of: 0.0,
        });
        let join = ExternalJoin::new(weather.clone(), soil.clone(), &config(0.2));
        let cells = fifty_cells();

        let first = join.join(&cells, &season(), &null_progress()).await.unwrap();
        let soil_calls = soil.calls.load(Ordering::SeqCst);
        let second = join.join(&cells, &season(), &null_progress()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
        assert_eq!(soil.calls.load(Ordering::SeqCst), soil_calls);
    }

    #[tokio::test]
    async fn a_few_failures_leave_missing_attributes() {
        let weather = Arc::new(CountingWeather::default());
        // Only the easternmost weather cell's acres fail.
        let soil = Arc::new(CountingSoil {
            calls: AtomicUsize::new(0),
            fail_east_of: -91.8,
        });
        let join = ExternalJoin::new(weather, soil, &config(0.5));

        let outcome = join
            .join(&fifty_cells(), &season(), &null_progress())
            .await
            .unwrap();

        assert_eq!(outcome.incomplete_cells.len(), 16);
        let failed = &outcome.attributes[2];
        assert_eq!(failed.cell_id, CellId(2));
        assert!(failed.rainfall_in.is_some());
        assert!(failed.soil_musym.is_none());
        assert!(failed.soil_muname.is_none());
    }

    #[tokio::test]
    async fn too_many_failures_is_a_systemic_error() {
        let weather = Arc::new(CountingWeather::default());
        let soil = Arc::new(CountingSoil {
            calls: AtomicUsize::new(0),
            fail_east_of: -91.8,
        });
        let join = ExternalJoin::new(weather, soil, &config(0.2));

        let err = join
            .join(&fifty_cells(), &season(), &null_progress())
            .await
            .unwrap_err();

        let JoinError::SystemicFailure {
            cell_ids,
            failed,
            total,
            ..
        } = err
        else {
            panic!("expected a systemic failure");
        };
        assert_eq!(failed, 16);
        assert_eq!(total, 50);
        assert_eq!(cell_ids[0], CellId(2));
    }

    #[tokio::test]
    async fn no_cells_is_an_empty_join() {
        let join = ExternalJoin::new(
            Arc::new(CountingWeather::default()),
            Arc::new(CountingSoil {
                calls: AtomicUsize::new(0),
                fail_east_of: 0.0,
            }),
            &config(0.0),
        );
        let outcome = join.join(&[], &season(), &null_progress()).await.unwrap();
        assert!(outcome.attributes.is_empty());
    }
}
