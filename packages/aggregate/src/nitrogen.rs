//! Merging of overlapping nitrogen application passes.

use std::collections::BTreeMap;

use acre_map_field_models::{MeasurementType, ProjectedPoint};

/// Sums nitrogen rates of points that land on the same spot.
///
/// Nitrogen points whose projected positions round to the same
/// multiple of `resolution_m` are collapsed into one point carrying the
/// total applied rate and the position and `source_id` of the first
/// point seen. Yield points pass through untouched. Output order
/// follows the first occurrence of each location.
#[must_use]
pub fn merge_nitrogen_passes(points: &[ProjectedPoint], resolution_m: f64) -> Vec<ProjectedPoint> {
    let mut merged: Vec<ProjectedPoint> = Vec::with_capacity(points.len());
    let mut by_location: BTreeMap<(i64, i64), usize> = BTreeMap::new();
    let mut collapsed = 0_usize;

    for point in points {
        if point.measurement_type != MeasurementType::Nitrogen {
            merged.push(point.clone());
            continue;
        }

        let key = location_key(point.x, point.y, resolution_m);
        if let Some(&i) = by_location.get(&key) {
            merged[i].value += point.value;
            collapsed += 1;
        } else {
            by_location.insert(key, merged.len());
            merged.push(point.clone());
        }
    }

    if collapsed > 0 {
        log::debug!(
            "Merged {collapsed} overlapping nitrogen points into {} locations",
            by_location.len()
        );
    }

    merged
}

#[allow(clippy::cast_possible_truncation)]
fn location_key(x: f64, y: f64, resolution_m: f64) -> (i64, i64) {
    (
        (x / resolution_m).round() as i64,
        (y / resolution_m).round() as i64,
    )
}
