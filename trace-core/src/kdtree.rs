//! 2-D spatial index used throughout the engine for nearest-neighbour and
//! k-NN queries: snapping trace elements to street nodes, deduplicating
//! trace-derived graph nodes, and neighbour lookups for DBSCAN.
//!
//! Built on `rstar::RTree` with `rstar::primitives::GeomWithData` payloads —
//! the same spatial-index crate and payload idiom the teacher crate uses for
//! its own stop/node indices. An R-tree covers every operation the spec asks
//! of a "k-d tree" here (bulk load, incremental insert, ascending k-NN), so
//! this does not reimplement a bespoke k-d tree on top of it.

use geo::Point;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject};

/// A point in the index tagged with an arbitrary payload.
pub type IndexedPoint<T> = GeomWithData<Point<f64>, T>;

/// Generic wrapper around `rstar::RTree`, storing points alongside a payload
/// that lets a caller recover which graph entity a hit refers to.
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    tree: RTree<IndexedPoint<T>>,
}

impl<T> SpatialIndex<T>
where
    IndexedPoint<T>: RTreeObject<Envelope = rstar::AABB<Point<f64>>>,
{
    /// Bulk-loads a spatial index from a set of (point, payload) pairs.
    #[must_use]
    pub fn build(points: Vec<(Point<f64>, T)>) -> Self {
        let objects = points
            .into_iter()
            .map(|(p, payload)| GeomWithData::new(p, payload))
            .collect();
        Self {
            tree: RTree::bulk_load(objects),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { tree: RTree::new() }
    }

    /// Inserts a single point, for incremental building.
    pub fn insert(&mut self, point: Point<f64>, payload: T) {
        self.tree.insert(GeomWithData::new(point, payload));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns the single nearest stored point, if any.
    #[must_use]
    pub fn nearest(&self, query: Point<f64>) -> Option<&IndexedPoint<T>> {
        self.tree.nearest_neighbor(&query)
    }

    /// Returns the `k` nearest stored points in ascending distance order.
    #[must_use]
    pub fn knn(&self, query: Point<f64>, k: usize) -> Vec<&IndexedPoint<T>> {
        self.tree.nearest_neighbor_iter(&query).take(k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_finds_closest_point() {
        let index = SpatialIndex::build(vec![
            (Point::new(0.0, 0.0), "a"),
            (Point::new(1.0, 1.0), "b"),
            (Point::new(5.0, 5.0), "c"),
        ]);

        let hit = index.nearest(Point::new(0.2, 0.2)).unwrap();
        assert_eq!(hit.data, "a");
    }

    #[test]
    fn knn_returns_ascending_by_distance() {
        let index = SpatialIndex::build(vec![
            (Point::new(0.0, 0.0), 0u32),
            (Point::new(1.0, 0.0), 1u32),
            (Point::new(2.0, 0.0), 2u32),
            (Point::new(3.0, 0.0), 3u32),
        ]);

        let hits = index.knn(Point::new(0.0, 0.0), 3);
        let ids: Vec<u32> = hits.iter().map(|h| h.data).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn insert_is_visible_to_subsequent_queries() {
        let mut index: SpatialIndex<u32> = SpatialIndex::empty();
        index.insert(Point::new(10.0, 10.0), 42);
        let hit = index.nearest(Point::new(10.1, 10.1)).unwrap();
        assert_eq!(hit.data, 42);
    }
}
