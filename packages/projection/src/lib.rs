#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch coordinate transforms between a geographic and a projected CRS.
//!
//! A [`Projector`] is built once per run from the configured CRS
//! identifiers and wraps a pair of PROJ transformations, one per
//! direction. Identifiers PROJ cannot resolve fail at construction, so
//! a bad configuration surfaces at startup rather than on the first
//! point. Both directions operate on whole slices of [`geo::Coord`]
//! with `x` as longitude/easting and `y` as latitude/northing.
//!
//! Any identifier PROJ knows is accepted (`EPSG:<code>`, WKT or a PROJ
//! string). The projected CRS is expected to have metre units, e.g. a
//! UTM zone (`EPSG:326zz`, `EPSG:269zz`) or a national equal-area grid
//! such as `EPSG:5070`.

use std::fmt;

use geo::Coord;
use proj::Proj;
use thiserror::Error;

/// Errors from CRS resolution or coordinate transformation.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// PROJ could not build a transformation between the identifiers.
    #[error("Unsupported CRS '{crs}': {reason}")]
    UnsupportedCrs {
        /// The identifier pair as configured.
        crs: String,
        /// PROJ's reason for rejecting it.
        reason: String,
    },

    /// A coordinate could not be transformed.
    #[error("Invalid coordinate at index {index}: ({x}, {y})")]
    InvalidCoordinate {
        /// Position in the input batch.
        index: usize,
        x: f64,
        y: f64,
    },
}

/// Converts batches of coordinates between the configured geographic
/// and projected CRS.
pub struct Projector {
    geographic_crs: String,
    projected_crs: String,
    forward: Proj,
    inverse: Proj,
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("geographic_crs", &self.geographic_crs)
            .field("projected_crs", &self.projected_crs)
            .finish_non_exhaustive()
    }
}

impl Projector {
    /// Builds a projector for the given CRS identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::UnsupportedCrs`] if PROJ cannot
    /// resolve either identifier or build a transformation between them.
    pub fn new(geographic_crs: &str, projected_crs: &str) -> Result<Self, ProjectionError> {
        let transform = |from: &str, to: &str| {
            Proj::new_known_crs(from, to, None).map_err(|e| ProjectionError::UnsupportedCrs {
                crs: format!("{from} -> {to}"),
                reason: e.to_string(),
            })
        };
        let forward = transform(geographic_crs, projected_crs)?;
        let inverse = transform(projected_crs, geographic_crs)?;

        log::debug!("Projector {geographic_crs} -> {projected_crs}");

        Ok(Self {
            geographic_crs: geographic_crs.to_string(),
            projected_crs: projected_crs.to_string(),
            forward,
            inverse,
        })
    }

    #[must_use]
    pub fn geographic_crs(&self) -> &str {
        &self.geographic_crs
    }

    #[must_use]
    pub fn projected_crs(&self) -> &str {
        &self.projected_crs
    }

    /// Projects `(lon, lat)` coordinates to `(easting, northing)`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidCoordinate`] for the first
    /// non-finite, out-of-range, or untransformable coordinate.
    pub fn to_projected(&self, coords: &[Coord<f64>]) -> Result<Vec<Coord<f64>>, ProjectionError> {
        convert_batch(&self.forward, coords, |c| {
            c.x.abs() <= 180.0 && c.y.abs() <= 90.0
        })
    }

    /// Converts `(easting, northing)` coordinates back to `(lon, lat)`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidCoordinate`] for the first
    /// non-finite input or result.
    pub fn to_geographic(&self, coords: &[Coord<f64>]) -> Result<Vec<Coord<f64>>, ProjectionError> {
        let out = convert_batch(&self.inverse, coords, |_| true)?;
        if let Some(index) = out.iter().position(|c| c.y.abs() > 90.0) {
            return Err(ProjectionError::InvalidCoordinate {
                index,
                x: coords[index].x,
                y: coords[index].y,
            });
        }
        Ok(out)
    }
}

fn convert_batch(
    proj: &Proj,
    coords: &[Coord<f64>],
    in_domain: impl Fn(&Coord<f64>) -> bool,
) -> Result<Vec<Coord<f64>>, ProjectionError> {
    coords
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let invalid = || ProjectionError::InvalidCoordinate {
                index,
                x: c.x,
                y: c.y,
            };
            if !(c.x.is_finite() && c.y.is_finite()) || !in_domain(c) {
                return Err(invalid());
            }
            let (x, y) = proj.convert((c.x, c.y)).map_err(|e| {
                log::debug!("PROJ rejected coordinate {index} ({}, {}): {e}", c.x, c.y);
                invalid()
            })?;
            if x.is_finite() && y.is_finite() {
                Ok(Coord { x, y })
            } else {
                Err(invalid())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn utm15n() -> Projector {
        Projector::new("EPSG:4326", "EPSG:32615").unwrap()
    }

    #[test]
    fn rejects_unknown_crs_at_construction() {
        assert!(matches!(
            Projector::new("EPSG:4326", "EPSG:999999"),
            Err(ProjectionError::UnsupportedCrs { .. })
        ));
        assert!(matches!(
            Projector::new("EPSG:4326", "UTM15"),
            Err(ProjectionError::UnsupportedCrs { .. })
        ));
    }

    #[test]
    fn accepts_utm_and_equal_area_systems() {
        assert!(Projector::new("EPSG:4326", "EPSG:26915").is_ok());
        assert!(Projector::new("EPSG:4326", "EPSG:32755").is_ok());

        let albers = Projector::new("EPSG:4326", "EPSG:5070").unwrap();
        assert_eq!(albers.projected_crs(), "EPSG:5070");
        let out = albers
            .to_projected(&[Coord { x: -93.0, y: 39.0 }, Coord { x: -93.0, y: 39.001 }])
            .unwrap();
        let dy = out[1].y - out[0].y;
        assert!((110.0..112.0).contains(&dy), "dy = {dy}");
    }

    #[test]
    fn projected_distances_are_metric() {
        let projector = utm15n();
        let out = projector
            .to_projected(&[Coord { x: -93.0, y: 39.0 }, Coord { x: -93.0, y: 39.001 }])
            .unwrap();
        let dy = out[1].y - out[0].y;
        // One thousandth of a degree of latitude is ~111 m at 39°N.
        assert!((110.8..111.1).contains(&dy), "dy = {dy}");
        assert!((out[0].x - 500_000.0).abs() < 1e-3);
    }

    #[test]
    fn southern_zone_uses_false_northing() {
        let projector = Projector::new("EPSG:4326", "EPSG:32715").unwrap();
        let out = projector.to_projected(&[Coord { x: -93.0, y: 0.0 }]).unwrap();
        assert!((out[0].y - 10_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn reports_index_of_invalid_coordinate() {
        let projector = utm15n();
        let err = projector
            .to_projected(&[
                Coord { x: -93.0, y: 39.0 },
                Coord {
                    x: f64::NAN,
                    y: 39.0,
                },
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidCoordinate { index: 1, .. }
        ));

        let beyond_pole = projector.to_projected(&[Coord { x: -93.0, y: 95.0 }]);
        assert!(matches!(
            beyond_pole,
            Err(ProjectionError::InvalidCoordinate { index: 0, .. })
        ));
    }

    #[test]
    fn empty_batch_is_empty() {
        assert!(utm15n().to_projected(&[]).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn round_trip_within_a_micro_degree(
            lon in -99.0f64..-87.0,
            lat in 25.0f64..49.0,
        ) {
            let projector = utm15n();
            let projected = projector.to_projected(&[Coord { x: lon, y: lat }]).unwrap();
            let back = projector.to_geographic(&projected).unwrap();
            prop_assert!((back[0].x - lon).abs() < 1e-6);
            prop_assert!((back[0].y - lat).abs() < 1e-6);
        }

        #[test]
        fn batch_preserves_order_and_length(
            lats in proptest::collection::vec(30.0f64..45.0, 0..50),
        ) {
            let projector = utm15n();
            let coords: Vec<Coord<f64>> = lats.iter().map(|&lat| Coord { x: -93.0, y: lat }).collect();
            let projected = projector.to_projected(&coords).unwrap();
            prop_assert_eq!(projected.len(), coords.len());
            for pair in projected.windows(2).zip(lats.windows(2)) {
                let (p, l) = pair;
                if l[0] < l[1] {
                    prop_assert!(p[0].y <= p[1].y);
                } else {
                    prop_assert!(p[0].y >= p[1].y);
                }
            }
        }
    }
}
