//! R-tree lookup from a projected point to its acre cell.

use acre_map_field_models::CellId;
use geo::{BoundingRect, Coord, Intersects, Point, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::AcreGrid;

/// A cell extent stored in the R-tree, padded by the assignment
/// tolerance.
struct CellEntry {
    cell_id: CellId,
    rect: Rect<f64>,
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over the cells of one [`AcreGrid`].
///
/// A point belongs to the lowest-numbered cell whose polygon contains
/// it, edges and corners included. A point outside every polygon
/// falls back to the lowest-numbered cell within `tolerance_m` of it.
pub struct CellIndex {
    tree: RTree<CellEntry>,
    tolerance_m: f64,
}

impl CellIndex {
    #[must_use]
    pub fn new(grid: &AcreGrid, tolerance_m: f64) -> Self {
        let tolerance_m = tolerance_m.max(0.0);
        let entries = grid
            .cells()
            .iter()
            .filter_map(|cell| {
                let rect = cell.polygon.bounding_rect()?;
                let min = rect.min();
                let max = rect.max();
                Some(CellEntry {
                    cell_id: cell.cell_id,
                    rect,
                    polygon: cell.polygon.clone(),
                    envelope: AABB::from_corners(
                        [min.x - tolerance_m, min.y - tolerance_m],
                        [max.x + tolerance_m, max.y + tolerance_m],
                    ),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            tolerance_m,
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Finds the cell a projected point belongs to.
    #[must_use]
    pub fn locate(&self, point: Coord<f64>) -> Option<CellId> {
        let query_env = AABB::from_point([point.x, point.y]);
        let geo_point = Point::from(point);

        let mut containing: Option<CellId> = None;
        let mut nearby: Option<CellId> = None;

        for entry in self.tree.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.intersects(&geo_point) {
                containing = Some(containing.map_or(entry.cell_id, |c| c.min(entry.cell_id)));
            } else if rect_distance(&entry.rect, point) <= self.tolerance_m {
                nearby = Some(nearby.map_or(entry.cell_id, |c| c.min(entry.cell_id)));
            }
        }

        containing.or(nearby)
    }

    /// Locates every point, preserving input order.
    #[must_use]
    pub fn locate_all(&self, points: &[Coord<f64>]) -> Vec<Option<CellId>> {
        points.iter().map(|p| self.locate(*p)).collect()
    }
}

fn rect_distance(rect: &Rect<f64>, point: Coord<f64>) -> f64 {
    let dx = (rect.min().x - point.x).max(point.x - rect.max().x).max(0.0);
    let dy = (rect.min().y - point.y).max(point.y - rect.max().y).max(0.0);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_acre_grid;
    use acre_map_config::GridConfig;
    use geo::MultiPolygon;
    use proptest::prelude::*;

    const SIZE: f64 = 63.6;

    fn grid_4x3() -> AcreGrid {
        let boundary = MultiPolygon(vec![
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord {
                x: 4.0 * SIZE,
                y: 3.0 * SIZE,
            })
            .to_polygon(),
        ]);
        build_acre_grid(Some(&boundary), &[], &GridConfig::default()).unwrap()
    }

    #[test]
    fn interior_point_maps_to_its_cell() {
        let index = CellIndex::new(&grid_4x3(), 1.0);
        assert_eq!(index.size(), 12);
        assert_eq!(index.locate(Coord { x: 10.0, y: 10.0 }), Some(CellId(0)));
        assert_eq!(
            index.locate(Coord {
                x: 1.5 * SIZE,
                y: 2.5 * SIZE,
            }),
            Some(CellId(9))
        );
    }

    #[test]
    fn shared_edges_and_corners_go_to_lowest_cell_id() {
        let index = CellIndex::new(&grid_4x3(), 1.0);
        // Vertical edge between cells 0 and 1.
        assert_eq!(index.locate(Coord { x: SIZE, y: 20.0 }), Some(CellId(0)));
        // Corner shared by cells 0, 1, 4, and 5.
        assert_eq!(index.locate(Coord { x: SIZE, y: SIZE }), Some(CellId(0)));
        // Horizontal edge between cells 5 and 9.
        assert_eq!(
            index.locate(Coord {
                x: 1.5 * SIZE,
                y: 2.0 * SIZE,
            }),
            Some(CellId(5))
        );
    }

    #[test]
    fn containment_wins_over_a_lower_cell_within_tolerance() {
        let index = CellIndex::new(&grid_4x3(), 1.0);
        // Just inside cell 1, within tolerance of cell 0.
        assert_eq!(
            index.locate(Coord {
                x: SIZE + 0.5,
                y: 20.0,
            }),
            Some(CellId(1))
        );
    }

    #[test]
    fn tolerance_buffer_catches_points_just_outside() {
        let index = CellIndex::new(&grid_4x3(), 1.0);
        assert_eq!(index.locate(Coord { x: -0.5, y: 10.0 }), Some(CellId(0)));
        assert_eq!(index.locate(Coord { x: -2.0, y: 10.0 }), None);
        assert_eq!(
            index.locate(Coord {
                x: 4.0 * SIZE + 0.9,
                y: 3.0 * SIZE + 0.1,
            }),
            Some(CellId(11))
        );
    }

    proptest! {
        #[test]
        fn every_point_in_the_field_maps_to_exactly_one_cell(
            points in proptest::collection::vec((0.0f64..4.0 * SIZE, 0.0f64..3.0 * SIZE), 1..200),
        ) {
            let grid = grid_4x3();
            let index = CellIndex::new(&grid, 1.0);
            let coords: Vec<Coord<f64>> = points.iter().map(|&(x, y)| Coord { x, y }).collect();
            let first = index.locate_all(&coords);
            let second = index.locate_all(&coords);
            prop_assert_eq!(&first, &second);
            for (p, cell) in coords.iter().zip(&first) {
                let cell = cell.and_then(|id| grid.get(id));
                prop_assert!(cell.is_some());
                let cell = cell.unwrap();
                prop_assert!((p.x - cell.centroid.x).abs() <= SIZE / 2.0 + 1e-9);
                prop_assert!((p.y - cell.centroid.y).abs() <= SIZE / 2.0 + 1e-9);
            }
        }
    }
}
