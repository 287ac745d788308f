//! Lookup keys snapped to a service's native resolution.

use acre_map_field_models::{GeoLocation, SeasonRange};
use serde::Serialize;

/// A location snapped to a regular lat/lon lattice.
///
/// Stored as integer lattice indices so keys compare and sort exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocationKey {
    pub lat_index: i64,
    pub lon_index: i64,
}

impl LocationKey {
    /// Snaps `location` to the nearest multiple of `resolution_deg`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn snap(location: GeoLocation, resolution_deg: f64) -> Self {
        Self {
            lat_index: (location.latitude / resolution_deg).round() as i64,
            lon_index: (location.longitude / resolution_deg).round() as i64,
        }
    }

    /// The lattice point this key stands for; lookups are issued here.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn location(self, resolution_deg: f64) -> GeoLocation {
        GeoLocation {
            latitude: self.lat_index as f64 * resolution_deg,
            longitude: self.lon_index as f64 * resolution_deg,
        }
    }
}

/// Weather lookups are keyed by season and snapped location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WeatherKey {
    pub season: SeasonRange,
    pub location: LocationKey,
}
