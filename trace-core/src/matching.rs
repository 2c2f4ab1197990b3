//! Map-matching: snapping a trace onto the street network and stitching
//! the snapped node sequence with shortest paths (§4.F).

use geo::Point;

use crate::geometry::planar_distance_sq;
use crate::streets::{StreetGraph, StreetRef};
use crate::trace::Trace;

/// A matched node id, or `None` for a trace element that could not be
/// snapped to the street network (§4.F).
pub type MatchedNode = Option<u32>;

fn snap_element(graph: &StreetGraph, point: Point<f64>) -> MatchedNode {
    match graph.snap(point)? {
        StreetRef::Node(id) => Some(id),
        StreetRef::EdgeSample { from, to } => {
            let from_point = graph.node(from)?.point;
            let to_point = graph.node(to)?.point;
            if planar_distance_sq(point, from_point) <= planar_distance_sq(point, to_point) {
                Some(from)
            } else {
                Some(to)
            }
        }
    }
}

/// Matches a trace onto the street network: snaps every element to a
/// candidate node, then stitches the non-sentinel snapped ids with
/// shortest paths run on the graph copy owned by `worker_index`. Returns
/// the resulting node-id path (may contain duplicated join nodes omitted
/// per the stitching rule, never duplicated across splices).
///
/// Deterministic given `trace`, `graph`, and `worker_index` (§8 invariant
/// 7): the graph copies are built identically and snapping/shortest-path
/// are both pure functions of their inputs.
#[must_use]
pub fn match_trace(trace: &Trace, graph: &StreetGraph, worker_index: usize) -> Vec<u32> {
    let snapped: Vec<MatchedNode> = trace
        .elements
        .iter()
        .map(|e| snap_element(graph, e.point))
        .collect();

    let mut output: Vec<u32> = Vec::new();
    let mut last: Option<u32> = None;

    for node in snapped.into_iter().flatten() {
        match last {
            None => {
                output.push(node);
            }
            Some(prev) => {
                if prev == node {
                    // nothing to stitch
                } else if let Some(path) = graph.shortest_path(worker_index, prev, node) {
                    let start = usize::from(!output.is_empty());
                    output.extend(path.into_iter().skip(start));
                } else {
                    output.push(node);
                }
            }
        }
        last = Some(node);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::TransportMode;
    use crate::streets::StreetGraph;
    use crate::trace::TraceElement;

    const CHAIN_WITH_EDGES: &str = r#"<?xml version="1.0"?>
<graphml>
  <graph edgedefault="undirected">
    <node id="n0"><data key="d4">0.0</data><data key="d5">0.0</data></node>
    <node id="n1"><data key="d4">0.0</data><data key="d5">0.001</data></node>
    <node id="n2"><data key="d4">0.0</data><data key="d5">0.002</data></node>
    <edge source="n0" target="n1"><data key="d16">111.0</data></edge>
    <edge source="n1" target="n2"><data key="d16">111.0</data></edge>
  </graph>
</graphml>"#;

    fn elem(x: f64, y: f64) -> TraceElement {
        TraceElement {
            point: Point::new(x, y),
            timestamp: 0,
            mode: TransportMode::Car,
            leg_start: true,
        }
    }

    #[test]
    fn matches_endpoints_to_nearest_nodes_and_stitches_path() {
        let graph = StreetGraph::load(CHAIN_WITH_EDGES, 1).unwrap();
        let trace = Trace {
            elements: vec![elem(0.0, 0.0), elem(0.002, 0.0)],
        };
        let path = match_trace(&trace, &graph, 0);
        assert_eq!(path, vec![0, 1, 2]);
    }

    #[test]
    fn repeated_snap_to_same_node_does_not_duplicate() {
        let graph = StreetGraph::load(CHAIN_WITH_EDGES, 1).unwrap();
        let trace = Trace {
            elements: vec![elem(0.0, 0.0), elem(0.0001, 0.0), elem(0.002, 0.0)],
        };
        let path = match_trace(&trace, &graph, 0);
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&2));
    }
}
