//! Node and edge generation.
//!
//! Endpoints of every segment plus every intersection point become raw node
//! candidates. Candidates within the node-merge tolerance collapse into one
//! canonical node; segments are then attached to their nearest compatible
//! node at each end to form directed edges.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::geometry::TrailPoint;
use crate::graph::{EdgeKind, NodeId, NodeType, RoutingEdge, RoutingGraph, RoutingNode};
use crate::intersection::IntersectionPoint;
use crate::spatial::PointIndex;
use crate::trail::{Trail, TrailKind};

struct Candidate {
    point: TrailPoint,
    node_type: NodeType,
    trail_names: BTreeSet<String>,
    trail_ids: BTreeSet<String>,
}

/// Collapse segment endpoints and intersection points into canonical nodes.
///
/// Intersection points are placed first so a merged node sits at the exact
/// crossing. A merged node is an intersection if any of its candidates was.
/// Ids are assigned from 1 in (lng, lat) order.
pub fn build_nodes(
    segments: &[Trail],
    intersections: &[IntersectionPoint],
    merge_tolerance_m: f64,
) -> BTreeMap<NodeId, RoutingNode> {
    let mut merged: Vec<Candidate> = Vec::new();
    let mut index: PointIndex<usize> = PointIndex::new();
    let mut raw_count = 0usize;

    let from_intersections = intersections.iter().map(|ip| Candidate {
        point: ip.point,
        node_type: ip.node_type,
        trail_names: ip.trail_names.clone(),
        trail_ids: ip.trail_ids.clone(),
    });
    let from_endpoints = segments.iter().flat_map(|segment| {
        [segment.start(), segment.end()]
            .into_iter()
            .flatten()
            .map(|point| Candidate {
                point: *point,
                node_type: NodeType::Endpoint,
                trail_names: BTreeSet::from([segment.name.clone()]),
                trail_ids: BTreeSet::from([segment.id.clone()]),
            })
    });

    for candidate in from_intersections.chain(from_endpoints) {
        raw_count += 1;
        match index.nearest_matching(&candidate.point, merge_tolerance_m, |_| true) {
            Some((slot, _, _)) => {
                let node = &mut merged[slot];
                node.trail_names.extend(candidate.trail_names);
                node.trail_ids.extend(candidate.trail_ids);
                if candidate.node_type == NodeType::Intersection {
                    node.node_type = NodeType::Intersection;
                }
            }
            None => {
                index.insert(merged.len(), candidate.point);
                merged.push(candidate);
            }
        }
    }

    merged.sort_by(|a, b| {
        a.point
            .lng
            .total_cmp(&b.point.lng)
            .then(a.point.lat.total_cmp(&b.point.lat))
    });

    let nodes: BTreeMap<NodeId, RoutingNode> = merged
        .into_iter()
        .zip(1..)
        .map(|(candidate, id)| {
            let node = RoutingNode {
                id,
                uuid: Uuid::new_v4().to_string(),
                lat: candidate.point.lat,
                lng: candidate.point.lng,
                elevation: candidate.point.elevation,
                node_type: candidate.node_type,
                trail_names: candidate.trail_names,
                trail_ids: candidate.trail_ids,
            };
            (id, node)
        })
        .collect();

    info!(
        candidates = raw_count,
        nodes = nodes.len(),
        "built canonical nodes"
    );
    nodes
}

/// Attach every segment to a source and target node.
///
/// An end resolves to the nearest node within `tolerance_m` that either lists
/// the segment (or the trail it was split from) among its trail ids or is an
/// endpoint node. Segments with an unresolved end, or whose ends resolve to
/// the same node, produce no edge.
pub fn build_edges(
    segments: &[Trail],
    nodes: &BTreeMap<NodeId, RoutingNode>,
    tolerance_m: f64,
) -> Vec<RoutingEdge> {
    let index = PointIndex::build(nodes.values().map(|node| (node.id, node.point())));
    let mut edges = Vec::with_capacity(segments.len());
    let mut unresolved = 0usize;
    let mut self_loops = 0usize;

    for segment in segments {
        let resolve = |point: &TrailPoint| {
            index
                .nearest_matching(point, tolerance_m, |id| {
                    nodes.get(id).is_some_and(|node| accepts(node, segment))
                })
                .map(|(id, _, _)| id)
        };

        let (Some(start), Some(end)) = (segment.start(), segment.end()) else {
            unresolved += 1;
            continue;
        };
        let (Some(source), Some(target)) = (resolve(start), resolve(end)) else {
            debug!(trail_id = %segment.id, "segment end not resolvable to a node");
            unresolved += 1;
            continue;
        };
        if source == target {
            self_loops += 1;
            continue;
        }

        edges.push(RoutingEdge {
            id: edges.len() as u64 + 1,
            source,
            target,
            kind: match segment.kind {
                TrailKind::Trail => EdgeKind::Trail,
                TrailKind::Connector => EdgeKind::Connector,
            },
            trail_id: segment.id.clone(),
            trail_name: segment.name.clone(),
            length_km: segment.length_km,
            elevation_gain: segment.elevation.gain,
            elevation_loss: segment.elevation.loss,
            geometry: segment.geometry.clone(),
        });
    }

    info!(
        segments = segments.len(),
        edges = edges.len(),
        unresolved,
        self_loops,
        "built routing edges"
    );
    edges
}

fn accepts(node: &RoutingNode, segment: &Trail) -> bool {
    node.node_type == NodeType::Endpoint || node.trail_ids.iter().any(|id| segment.matches_id(id))
}

/// Counts removed by [`cleanup_orphans`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrphanCleanup {
    pub edges_removed: usize,
    pub nodes_removed: usize,
}

impl OrphanCleanup {
    pub fn total(&self) -> usize {
        self.edges_removed + self.nodes_removed
    }
}

/// Drop edges that reference a missing node, then nodes no edge references.
pub fn cleanup_orphans(graph: &mut RoutingGraph) -> OrphanCleanup {
    let edges_before = graph.edges.len();
    let nodes = &graph.nodes;
    graph
        .edges
        .retain(|edge| nodes.contains_key(&edge.source) && nodes.contains_key(&edge.target));

    let referenced: HashSet<NodeId> = graph
        .edges
        .iter()
        .flat_map(|edge| [edge.source, edge.target])
        .collect();
    let nodes_before = graph.nodes.len();
    graph.nodes.retain(|id, _| referenced.contains(id));

    let cleanup = OrphanCleanup {
        edges_removed: edges_before - graph.edges.len(),
        nodes_removed: nodes_before - graph.nodes.len(),
    };
    info!(
        edges_removed = cleanup.edges_removed,
        nodes_removed = cleanup.nodes_removed,
        "removed orphaned graph elements"
    );
    cleanup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::detect_intersections;
    use crate::split::split_trails;

    fn trail(id: &str, coords: &[(f64, f64)]) -> Trail {
        Trail::new(
            id,
            format!("{id} Trail"),
            "boulder",
            coords
                .iter()
                .map(|(lng, lat)| TrailPoint::new(*lng, *lat, 1800.0))
                .collect(),
        )
    }

    fn crossing() -> Vec<Trail> {
        let trails = vec![
            trail("a", &[(-105.271, 40.0), (-105.269, 40.0)]),
            trail("b", &[(-105.27, 39.999), (-105.27, 40.001)]),
        ];
        let points = detect_intersections(&trails, 1.0);
        split_trails(&trails, &points, 1.0).segments
    }

    #[test]
    fn crossing_produces_star_graph() {
        let trails = vec![
            trail("a", &[(-105.271, 40.0), (-105.269, 40.0)]),
            trail("b", &[(-105.27, 39.999), (-105.27, 40.001)]),
        ];
        let points = detect_intersections(&trails, 1.0);
        let segments = split_trails(&trails, &points, 1.0).segments;

        let nodes = build_nodes(&segments, &points, 1.0);
        assert_eq!(nodes.len(), 5);
        let centre: Vec<_> = nodes
            .values()
            .filter(|n| n.node_type == NodeType::Intersection)
            .collect();
        assert_eq!(centre.len(), 1);
        assert_eq!(centre[0].trail_names.len(), 2);

        let edges = build_edges(&segments, &nodes, 2.0);
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.source != e.target));
        assert!(edges
            .iter()
            .all(|e| e.source == centre[0].id || e.target == centre[0].id));
    }

    #[test]
    fn node_ids_follow_position() {
        let segments = crossing();
        let nodes = build_nodes(&segments, &[], 1.0);
        let lngs: Vec<f64> = nodes.values().map(|n| n.lng).collect();
        let mut sorted = lngs.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(lngs, sorted);
        assert_eq!(nodes.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn near_coincident_endpoints_merge() {
        // Second trail starts ~0.3 m from the first one's end.
        let segments = vec![
            trail("a", &[(-105.271, 40.0), (-105.27, 40.0)]),
            trail("b", &[(-105.27, 40.000_003), (-105.27, 40.001)]),
        ];
        let nodes = build_nodes(&segments, &[], 1.0);
        assert_eq!(nodes.len(), 3);
        let edges = build_edges(&segments, &nodes, 2.0);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].target, edges[1].source);
    }

    #[test]
    fn closed_segment_yields_no_edge() {
        let segments = vec![trail(
            "ring",
            &[(-105.27, 40.0), (-105.269, 40.0), (-105.269, 40.001), (-105.27, 40.0)],
        )];
        let nodes = build_nodes(&segments, &[], 1.0);
        assert_eq!(nodes.len(), 1);
        assert!(build_edges(&segments, &nodes, 2.0).is_empty());
    }

    #[test]
    fn unresolvable_end_drops_segment() {
        let segments = vec![trail("a", &[(-105.271, 40.0), (-105.27, 40.0)])];
        let mut nodes = build_nodes(&segments, &[], 1.0);
        nodes.remove(&2);
        assert!(build_edges(&segments, &nodes, 2.0).is_empty());
    }

    #[test]
    fn cleanup_removes_dangling_edges_then_nodes() {
        let segments = crossing();
        let points = detect_intersections(
            &[
                trail("a", &[(-105.271, 40.0), (-105.269, 40.0)]),
                trail("b", &[(-105.27, 39.999), (-105.27, 40.001)]),
            ],
            1.0,
        );
        let nodes = build_nodes(&segments, &points, 1.0);
        let edges = build_edges(&segments, &nodes, 2.0);
        let mut graph = RoutingGraph { nodes, edges };

        let leaf = *graph.nodes.keys().next().expect("node");
        graph.nodes.remove(&leaf);
        let cleanup = cleanup_orphans(&mut graph);
        assert_eq!(cleanup.edges_removed, 1);
        assert_eq!(cleanup.nodes_removed, 0);

        let first = graph.edges[0].id;
        graph.edges.retain(|e| e.id != first);
        let cleanup = cleanup_orphans(&mut graph);
        assert_eq!(cleanup.nodes_removed, 1);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(cleanup_orphans(&mut graph).total(), 0);
    }
}
