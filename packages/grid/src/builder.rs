//! Lattice construction over a field boundary.

use std::f64::consts::TAU;

use acre_map_config::GridConfig;
use acre_map_field_models::CellId;
use geo::{
    Area, BooleanOps, BoundingRect, Contains, ConvexHull, Coord, MultiPoint, MultiPolygon, Point,
    Polygon, Rect,
};

use crate::{AcreGrid, GridCell, GridError};

/// Vertices used to approximate the rounded corners of the hull margin.
const MARGIN_SEGMENTS: usize = 16;

/// Absorbs floating-point noise when a boundary spans an exact multiple
/// of the cell size.
const LATTICE_EPSILON: f64 = 1e-9;

/// Builds the acre grid for one field.
///
/// The region covered is `boundary` when given, otherwise the convex
/// hull of `yield_points` grown by `config.hull_margin_m`. Both must
/// be in projected coordinates.
///
/// A lattice of `cell_size_m` squares is anchored at the south-west
/// corner of the region's bounding box. A cell is kept when its
/// centroid lies inside the region, or when at least
/// `min_overlap_fraction` of its area overlaps the region. A region
/// smaller than one cell always yields exactly one cell. When a thin
/// region leaves no cell qualifying, the cells it overlaps are kept
/// instead (only the largest overlap if the region is under an acre).
/// Kept cells are numbered in row-major order, south to north and west
/// to east.
///
/// # Errors
///
/// * [`GridError::EmptyInput`] - no boundary and no yield points
/// * [`GridError::EmptyBoundary`] - the boundary has no area
/// * [`GridError::CellSize`] - the cell area is not one acre within tolerance
/// * [`GridError::NoCells`] - the point hull has no area, or the region
///   overlaps no lattice cell
pub fn build_acre_grid(
    boundary: Option<&MultiPolygon<f64>>,
    yield_points: &[Coord<f64>],
    config: &GridConfig,
) -> Result<AcreGrid, GridError> {
    let size = config.cell_size_m;
    let cell_area = size * size;
    if !(size.is_finite() && size > 0.0)
        || (cell_area - config.acre_area_m2).abs() > config.area_tolerance_m2
    {
        return Err(GridError::CellSize {
            message: format!(
                "{size} m cells cover {cell_area:.2} m², expected {} ± {} m²",
                config.acre_area_m2, config.area_tolerance_m2
            ),
        });
    }

    let region = match boundary {
        Some(boundary) => {
            if boundary.0.is_empty() || boundary.unsigned_area() <= 0.0 {
                return Err(GridError::EmptyBoundary);
            }
            boundary.clone()
        }
        None => {
            if yield_points.is_empty() {
                return Err(GridError::EmptyInput);
            }
            let hull = MultiPolygon(vec![hull_with_margin(yield_points, config.hull_margin_m)]);
            if hull.unsigned_area() <= 0.0 {
                return Err(GridError::NoCells);
            }
            hull
        }
    };

    let bbox = region.bounding_rect().ok_or(GridError::EmptyBoundary)?;
    let origin = bbox.min();
    let cols = lattice_span(bbox.width(), size);
    let rows = lattice_span(bbox.height(), size);
    let single = rows == 1 && cols == 1;

    let mut kept = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let rect = lattice_rect(origin, size, row, col);
            if single || keep_cell(&region, &rect.to_polygon(), rect.center(), cell_area, config) {
                kept.push((row, col));
            }
        }
    }

    if kept.is_empty() {
        kept = thin_region_cells(&region, origin, size, rows, cols, cell_area);
        log::debug!(
            "No lattice cell met the overlap rule; kept {} cells overlapping a thin region",
            kept.len()
        );
    }
    if kept.is_empty() {
        return Err(GridError::NoCells);
    }

    let dropped = (0..rows).len() * (0..cols).len() - kept.len();
    let cells: Vec<GridCell> = kept
        .into_iter()
        .enumerate()
        .map(|(i, (row, col))| {
            let rect = lattice_rect(origin, size, row, col);
            GridCell {
                cell_id: CellId(i as u64),
                row,
                col,
                centroid: rect.center(),
                polygon: rect.to_polygon(),
                area_m2: cell_area,
            }
        })
        .collect();

    log::info!(
        "Built {} acre cells from a {rows}x{cols} lattice ({dropped} outside the boundary)",
        cells.len()
    );

    Ok(AcreGrid {
        cells,
        cell_size_m: size,
        origin,
        rows,
        cols,
    })
}

fn lattice_rect(origin: Coord<f64>, size: f64, row: u32, col: u32) -> Rect<f64> {
    let min = Coord {
        x: f64::from(col).mul_add(size, origin.x),
        y: f64::from(row).mul_add(size, origin.y),
    };
    Rect::new(min, Coord {
        x: min.x + size,
        y: min.y + size,
    })
}

/// Cells for a region so thin that no lattice cell holds its centroid
/// or meets the overlap fraction.
///
/// A region of at most one acre keeps the one cell it overlaps most,
/// the earliest in row-major order on ties. A larger region keeps every
/// cell it overlaps at all.
fn thin_region_cells(
    region: &MultiPolygon<f64>,
    origin: Coord<f64>,
    size: f64,
    rows: u32,
    cols: u32,
    cell_area: f64,
) -> Vec<(u32, u32)> {
    let overlapping = (0..rows)
        .flat_map(|row| (0..cols).map(move |col| (row, col)))
        .map(|(row, col)| {
            let cell = lattice_rect(origin, size, row, col).to_polygon();
            ((row, col), cell.intersection(region).unsigned_area())
        })
        .filter(|(_, overlap)| *overlap > 0.0);

    if region.unsigned_area() <= cell_area {
        overlapping
            .fold(None, |best: Option<((u32, u32), f64)>, (cell, overlap)| match best {
                Some((_, top)) if top >= overlap => best,
                _ => Some((cell, overlap)),
            })
            .map(|(cell, _)| vec![cell])
            .unwrap_or_default()
    } else {
        overlapping.map(|(cell, _)| cell).collect()
    }
}

fn keep_cell(
    region: &MultiPolygon<f64>,
    cell: &Polygon<f64>,
    centroid: Coord<f64>,
    cell_area: f64,
    config: &GridConfig,
) -> bool {
    if region.contains(&Point::from(centroid)) {
        return true;
    }
    let Some(min_fraction) = config.min_overlap_fraction else {
        return false;
    };
    let overlap = cell.intersection(region).unsigned_area() / cell_area;
    overlap >= min_fraction
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn lattice_span(extent: f64, size: f64) -> u32 {
    let span = (extent / size - LATTICE_EPSILON).ceil();
    if span < 1.0 { 1 } else { span as u32 }
}

/// Convex hull of `points`, grown outward by `margin`.
///
/// The margin is the hull of every hull vertex offset around a circle,
/// which is also well defined for collinear or coincident points.
#[allow(clippy::cast_precision_loss)]
fn hull_with_margin(points: &[Coord<f64>], margin: f64) -> Polygon<f64> {
    let hull = MultiPoint::from(points.to_vec()).convex_hull();
    if margin <= 0.0 {
        return hull;
    }

    let mut offsets = Vec::with_capacity(hull.exterior().0.len() * MARGIN_SEGMENTS);
    for vertex in hull.exterior().coords() {
        for k in 0..MARGIN_SEGMENTS {
            let theta = TAU * k as f64 / MARGIN_SEGMENTS as f64;
            offsets.push(Coord {
                x: margin.mul_add(theta.cos(), vertex.x),
                y: margin.mul_add(theta.sin(), vertex.y),
            });
        }
    }
    MultiPoint::from(offsets).convex_hull()
}
