//! Traffic graph construction: both the reduced-trace (spatial clustering)
//! and street-graph (map-matching) variants share one output shape
//! (§3, §4.H).

use ahash::AHashMap;
use geo::Point;

use crate::cluster::{dbscan, DbscanParams, Membership};
use crate::geometry::planar_distance_sq;
use crate::kdtree::SpatialIndex;
use crate::streets::StreetGraph;
use crate::trace::Trace;

/// Attribution record for one trace's traversal of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcVisitor {
    pub commuter_id: String,
    pub option_id: usize,
}

/// An ordered array of node points plus a canonicalised undirected
/// adjacency: edge key `(u, v)` always has `u < v`, self-loops excluded.
#[derive(Debug, Clone, Default)]
pub struct TrafficGraph {
    pub nodes: Vec<Point<f64>>,
    pub edges: AHashMap<(u32, u32), Vec<ArcVisitor>>,
}

impl TrafficGraph {
    fn add_edge(&mut self, a: u32, b: u32, visitor: ArcVisitor) {
        if a == b {
            return;
        }
        let key = (a.min(b), a.max(b));
        self.edges.entry(key).or_default().push(visitor);
    }
}

/// Squared-distance threshold for reusing a node id during spatial
/// deduplication in the reduced-trace variant (§4.H).
const DEDUP_EPSILON_SQ: f64 = 1e-4 * 1e-4;

/// One commuter-option's single-mode sub-trace, labelled for attribution.
pub struct LabelledTrace<'a> {
    pub commuter_id: &'a str,
    pub option_id: usize,
    pub trace: &'a Trace,
}

/// Builds the reduced-trace traffic graph: spatially dedups trace points
/// into provisional node ids, clusters those nodes with DBSCAN, and emits
/// one edge per consecutive pair whose remapped ids differ (§4.H).
#[must_use]
pub fn build_reduced(traces: &[LabelledTrace<'_>]) -> TrafficGraph {
    let mut index: SpatialIndex<u32> = SpatialIndex::empty();
    let mut positions: Vec<Point<f64>> = Vec::new();
    let mut raw_sequences: Vec<Vec<u32>> = Vec::with_capacity(traces.len());

    for labelled in traces {
        let mut sequence = Vec::with_capacity(labelled.trace.elements.len());
        for element in &labelled.trace.elements {
            let point = element.point;
            let id = match index.nearest(point) {
                Some(hit) if planar_distance_sq(point, *hit.geom()) <= DEDUP_EPSILON_SQ => hit.data,
                _ => {
                    let id = positions.len() as u32;
                    positions.push(point);
                    index.insert(point, id);
                    id
                }
            };
            sequence.push(id);
        }
        raw_sequences.push(sequence);
    }

    let membership = dbscan(
        &positions,
        DbscanParams {
            min_density: 2,
            epsilon: 1e-5,
            k: 50,
        },
    );

    let mut cluster_final_id: AHashMap<usize, u32> = AHashMap::new();
    let mut cluster_members: AHashMap<usize, Vec<Point<f64>>> = AHashMap::new();
    for (raw_id, m) in membership.iter().enumerate() {
        if let Membership::Cluster(cid) = m {
            cluster_members.entry(*cid).or_default().push(positions[raw_id]);
        }
    }

    let mut graph = TrafficGraph::default();
    let mut raw_to_final: AHashMap<u32, u32> = AHashMap::new();

    for (raw_id, m) in membership.iter().enumerate() {
        match m {
            Membership::Cluster(cid) => {
                let final_id = *cluster_final_id.entry(*cid).or_insert_with(|| {
                    let members = &cluster_members[cid];
                    let n = members.len() as f64;
                    let mean_x = members.iter().map(|p: &Point| p.x()).sum::<f64>() / n;
                    let mean_y = members.iter().map(|p: &Point| p.y()).sum::<f64>() / n;
                    let id = graph.nodes.len() as u32;
                    graph.nodes.push(Point::new(mean_x, mean_y));
                    id
                });
                raw_to_final.insert(raw_id as u32, final_id);
            }
            Membership::Unassigned => {
                let id = graph.nodes.len() as u32;
                graph.nodes.push(positions[raw_id]);
                raw_to_final.insert(raw_id as u32, id);
            }
        }
    }

    for (labelled, sequence) in traces.iter().zip(raw_sequences.iter()) {
        let remapped: Vec<u32> = sequence.iter().map(|id| raw_to_final[id]).collect();
        for pair in remapped.windows(2) {
            let [a, b] = pair else { continue };
            graph.add_edge(
                *a,
                *b,
                ArcVisitor {
                    commuter_id: labelled.commuter_id.to_string(),
                    option_id: labelled.option_id,
                },
            );
        }
    }

    graph
}

/// One commuter-option's map-matched node-id sequence on the street graph.
pub struct MatchedPath<'a> {
    pub commuter_id: &'a str,
    pub option_id: usize,
    pub path: Vec<u32>,
}

/// Builds the street-graph traffic graph: collects the dense set of
/// matched node ids actually visited, renumbers them, and emits one edge
/// per consecutive pair, canonicalised lower-id-first with self-loops
/// excluded (§4.H, §8 invariant 6).
#[must_use]
pub fn build_street_graph(paths: &[MatchedPath<'_>], street_graph: &StreetGraph) -> TrafficGraph {
    let mut occurring: Vec<u32> = paths.iter().flat_map(|p| p.path.iter().copied()).collect();
    occurring.sort_unstable();
    occurring.dedup();

    let mut old_to_new: AHashMap<u32, u32> = AHashMap::new();
    let mut graph = TrafficGraph::default();
    for old_id in occurring {
        let Some(node) = street_graph.node(old_id) else {
            continue;
        };
        let new_id = graph.nodes.len() as u32;
        graph.nodes.push(node.point);
        old_to_new.insert(old_id, new_id);
    }

    for matched in paths {
        let remapped: Vec<u32> = matched
            .path
            .iter()
            .filter_map(|id| old_to_new.get(id).copied())
            .collect();
        for pair in remapped.windows(2) {
            let [a, b] = pair else { continue };
            graph.add_edge(
                *a,
                *b,
                ArcVisitor {
                    commuter_id: matched.commuter_id.to_string(),
                    option_id: matched.option_id,
                },
            );
        }
    }

    graph
}
