//! Flow-equivalent graph decimation: fuse degree-2 vertices whose two
//! incident edges carry the same visitor set, iterating to a fixed point
//! (§4.I).

use ahash::{AHashMap, AHashSet};

use crate::traffic_graph::{ArcVisitor, TrafficGraph};

type EdgeKey = (u32, u32);
type Incidence = AHashMap<u32, Vec<EdgeKey>>;

fn visitor_signature(visitors: &[ArcVisitor]) -> AHashSet<(String, usize)> {
    visitors
        .iter()
        .map(|v| (v.commuter_id.clone(), v.option_id))
        .collect()
}

fn build_incidence(edges: &AHashMap<EdgeKey, Vec<ArcVisitor>>) -> Incidence {
    let mut incidence: Incidence = AHashMap::new();
    for &(u, v) in edges.keys() {
        incidence.entry(u).or_default().push((u, v));
        incidence.entry(v).or_default().push((u, v));
    }
    incidence
}

/// Finds one irrelevant vertex — degree exactly 2, incident edges with
/// equal visitor sets — and returns its two incident edge keys plus the
/// two far endpoints.
fn find_irrelevant(
    incidence: &Incidence,
    edges: &AHashMap<EdgeKey, Vec<ArcVisitor>>,
) -> Option<(EdgeKey, EdgeKey, u32, u32)> {
    for (&vertex, incident) in incidence {
        let [e1, e2] = incident.as_slice() else {
            continue;
        };
        if visitor_signature(&edges[e1]) != visitor_signature(&edges[e2]) {
            continue;
        }
        let other = |edge: &EdgeKey| if edge.0 == vertex { edge.1 } else { edge.0 };
        return Some((*e1, *e2, other(e1), other(e2)));
    }
    None
}

/// Fuses one irrelevant vertex's two edges into `(min(a,b), max(a,b))`,
/// or drops both with no replacement when `a == b`. Visitor records are
/// deduplicated by (commuter id, option id) when merging onto a
/// pre-existing edge at the fused key.
fn apply_fusion(edges: &mut AHashMap<EdgeKey, Vec<ArcVisitor>>, e1: EdgeKey, e2: EdgeKey, a: u32, b: u32) {
    let v1 = edges.remove(&e1).unwrap_or_default();
    let v2 = edges.remove(&e2).unwrap_or_default();

    // Unreachable under this module's single-edge-per-pair representation
    // (parallel edges between the same two vertices are merged at
    // construction time, so a vertex's two incident edges never share a
    // far endpoint) but kept to match the documented fusion rule exactly.
    if a == b {
        return;
    }

    let key = (a.min(b), a.max(b));
    let existing = edges.remove(&key).unwrap_or_default();

    let mut seen: AHashSet<(String, usize)> = AHashSet::new();
    let mut combined = Vec::new();
    for visitor in existing.into_iter().chain(v1).chain(v2) {
        let signature = (visitor.commuter_id.clone(), visitor.option_id);
        if seen.insert(signature) {
            combined.push(visitor);
        }
    }
    edges.insert(key, combined);
}

/// Removes every irrelevant vertex, iterating until no more qualify, since
/// a fusion can create a newly-irrelevant vertex whose two (possibly
/// newly-adjacent) edges now also carry equal visitor sets (§4.I, §9,
/// §8 invariant 8).
#[must_use]
pub fn decimate(graph: &TrafficGraph) -> TrafficGraph {
    let mut edges = graph.edges.clone();

    loop {
        let incidence = build_incidence(&edges);
        let Some((e1, e2, a, b)) = find_irrelevant(&incidence, &edges) else {
            break;
        };
        apply_fusion(&mut edges, e1, e2, a, b);
    }

    TrafficGraph {
        nodes: graph.nodes.clone(),
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn visitors(ids: &[&str]) -> Vec<ArcVisitor> {
        ids.iter()
            .map(|id| ArcVisitor {
                commuter_id: (*id).to_string(),
                option_id: 0,
            })
            .collect()
    }

    fn three_node_graph() -> Vec<Point<f64>> {
        vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(2.0, 0.0)]
    }

    #[test]
    fn fuses_degree_two_vertex_with_matching_visitor_sets() {
        let mut edges = AHashMap::new();
        edges.insert((0, 1), visitors(&["a"]));
        edges.insert((1, 2), visitors(&["a"]));
        let graph = TrafficGraph {
            nodes: three_node_graph(),
            edges,
        };

        let result = decimate(&graph);
        assert!(result.edges.contains_key(&(0, 2)));
        assert!(!result.edges.contains_key(&(0, 1)));
        assert!(!result.edges.contains_key(&(1, 2)));
        assert_eq!(result.edges[&(0, 2)].len(), 1);
    }

    #[test]
    fn keeps_vertex_with_differing_visitor_sets() {
        let mut edges = AHashMap::new();
        edges.insert((0, 1), visitors(&["a"]));
        edges.insert((1, 2), visitors(&["b"]));
        let graph = TrafficGraph {
            nodes: three_node_graph(),
            edges,
        };

        let result = decimate(&graph);
        assert!(result.edges.contains_key(&(0, 1)));
        assert!(result.edges.contains_key(&(1, 2)));
    }

    #[test]
    fn triangle_fusion_merges_onto_the_existing_far_edge() {
        // Decimating the middle vertex of a 3-cycle fuses onto the
        // pre-existing (0,2) edge rather than creating a parallel edge.
        let mut edges = AHashMap::new();
        edges.insert((0, 1), visitors(&["a"]));
        edges.insert((1, 2), visitors(&["a"]));
        edges.insert((0, 2), visitors(&["b"]));
        let graph = TrafficGraph {
            nodes: three_node_graph(),
            edges,
        };

        let result = decimate(&graph);
        assert_eq!(result.edges.len(), 1);
        let visitors = &result.edges[&(0, 2)];
        assert_eq!(visitors.len(), 2);
    }

    #[test]
    fn iterates_to_fixed_point_across_a_chain() {
        let mut edges = AHashMap::new();
        edges.insert((0, 1), visitors(&["a"]));
        edges.insert((1, 2), visitors(&["a"]));
        edges.insert((2, 3), visitors(&["a"]));
        let graph = TrafficGraph {
            nodes: vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(3.0, 0.0),
            ],
            edges,
        };

        let result = decimate(&graph);
        assert_eq!(result.edges.len(), 1);
        assert!(result.edges.contains_key(&(0, 3)));
    }
}
