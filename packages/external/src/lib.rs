#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weather and soil attributes for acre cells.
//!
//! Every surviving cell centroid is reduced to a lookup key snapped to
//! the service's native resolution. Keys are deduplicated before any
//! call is issued, so fifty acres inside one weather grid cell cost a
//! single request. Calls run concurrently through a bounded buffered
//! stream with a per-attempt timeout and exponential backoff, and
//! results are merged back in key order.
//!
//! A failed lookup leaves the attribute missing for the cells that
//! share its key. The join as a whole only fails when the fraction of
//! affected cells exceeds `external.max_failure_fraction`.
//!
//! Two concrete clients are provided: [`open_meteo::OpenMeteoClient`]
//! (ERA5 daily precipitation) and [`ssurgo::SoilDataAccessClient`]
//! (USDA Soil Data Access map units).

pub mod cache;
mod http;
pub mod join;
pub mod key;
pub mod open_meteo;
pub mod progress;
pub mod retry;
pub mod ssurgo;

use acre_map_field_models::{CellId, GeoLocation, SeasonRange, SoilUnit};
use async_trait::async_trait;
use thiserror::Error;

pub use join::{ExternalJoin, JoinOutcome};
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Why a single lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No response within the per-attempt timeout.
    #[error("Lookup timed out")]
    Timeout,

    /// A failure worth retrying (connection error, HTTP 429 or 5xx).
    #[error("Transient lookup failure: {message}")]
    Transient {
        /// Description of what went wrong.
        message: String,
    },

    /// The service has no data for the location.
    #[error("No data for location: {message}")]
    NotFound {
        /// Description of what went wrong.
        message: String,
    },

    /// A failure that retrying will not fix.
    #[error("Lookup failed: {message}")]
    Permanent {
        /// Description of what went wrong.
        message: String,
    },
}

impl LookupError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient { .. })
    }
}

/// Errors that abort a whole field join.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Too many cells were left without an attribute.
    #[error(
        "External join failed for {failed} of {total} cells (limit {max_fraction}); affected cells: {cell_ids:?}"
    )]
    SystemicFailure {
        /// Cells with at least one missing attribute, ascending.
        cell_ids: Vec<CellId>,
        failed: usize,
        total: usize,
        max_fraction: f64,
    },

    /// A client could not be constructed.
    #[error("Client setup failed: {message}")]
    Client {
        /// Description of what went wrong.
        message: String,
    },
}

/// Growing-season rainfall at a location.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    /// Total rainfall in inches over `season`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the service fails or has no data.
    async fn lookup_weather(
        &self,
        location: GeoLocation,
        season: &SeasonRange,
    ) -> Result<f64, LookupError>;
}

/// Soil map unit at a location.
#[async_trait]
pub trait SoilLookup: Send + Sync {
    /// The map unit whose polygon contains `location`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the service fails or has no data.
    async fn lookup_soil(&self, location: GeoLocation) -> Result<SoilUnit, LookupError>;
}
