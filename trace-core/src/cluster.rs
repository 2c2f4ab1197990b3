//! Density-based clustering over a spatial index (§4.G).

use geo::Point;

use crate::kdtree::SpatialIndex;

/// Parameters for a DBSCAN run.
#[derive(Debug, Clone, Copy)]
pub struct DbscanParams {
    /// Minimum neighbour count (including the point itself) for a point to
    /// seed a cluster.
    pub min_density: usize,
    /// Maximum distance (same units as the index's points) for two points
    /// to be considered neighbours.
    pub epsilon: f64,
    /// Candidate pool size fetched from the k-NN query before filtering by
    /// `epsilon`.
    pub k: usize,
}

/// Cluster membership for every indexed point: either a cluster id, or
/// unassigned (noise under the standard DBSCAN definition; emitted as a
/// singleton by callers that need a total partition, §4.G).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Cluster(usize),
    Unassigned,
}

/// Runs DBSCAN over `points`, using a freshly built spatial index for
/// neighbour queries. Points are identified by their position in the input
/// slice; the returned vector has the same length and order.
#[must_use]
pub fn dbscan(points: &[Point<f64>], params: DbscanParams) -> Vec<Membership> {
    let index: SpatialIndex<usize> = SpatialIndex::build(
        points.iter().copied().enumerate().map(|(i, p)| (p, i)).collect(),
    );

    let neighbor_ids = |p: Point<f64>| -> Vec<usize> {
        index
            .knn(p, params.k)
            .into_iter()
            .filter(|hit| {
                let dx = hit.geom().x() - p.x();
                let dy = hit.geom().y() - p.y();
                (dx * dx + dy * dy).sqrt() <= params.epsilon
            })
            .map(|hit| hit.data)
            .collect()
    };

    let mut membership = vec![Membership::Unassigned; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0usize;

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let seed_neighbors = neighbor_ids(points[seed]);
        // neighbor_ids includes the point itself (distance 0 <= epsilon).
        if seed_neighbors.len() < params.min_density {
            continue;
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        membership[seed] = Membership::Cluster(cluster_id);

        let mut queue = seed_neighbors;
        let mut cursor = 0;
        while cursor < queue.len() {
            let current = queue[cursor];
            cursor += 1;

            if matches!(membership[current], Membership::Unassigned) {
                membership[current] = Membership::Cluster(cluster_id);
            }
            if visited[current] {
                continue;
            }
            visited[current] = true;

            let current_neighbors = neighbor_ids(points[current]);
            if current_neighbors.len() >= params.min_density {
                for n in current_neighbors {
                    if !queue.contains(&n) {
                        queue.push(n);
                    }
                }
            }
        }
    }

    membership
}
