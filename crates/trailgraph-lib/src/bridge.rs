//! Gap bridging between endpoints that should touch but do not.
//!
//! Three connector strategies and one destructive alternative:
//!
//! - [`bridge_direct`] joins two dangling graph vertices with a new edge.
//! - [`bridge_midpoint`] adds two short connector trails meeting at the
//!   midpoint of a close endpoint pair, so node generation later sees one
//!   shared vertex.
//! - [`bridge_endpoint_to_edge`] attaches a dangling vertex to the closest
//!   interior point of a nearby edge.
//! - [`weld_endpoints`] moves both endpoints of a close pair onto their
//!   midpoint without adding geometry.
//!
//! Every strategy skips gaps it has already closed, so running it twice with
//! the same tolerance inserts nothing the second time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::geometry::{locate_on_polyline, midpoint, polyline_length_m, TrailPoint};
use crate::graph::{EdgeKind, NodeId, NodeType, RoutingEdge, RoutingGraph, RoutingNode};
use crate::spatial::PointIndex;
use crate::trail::{ElevationSummary, Trail, TrailKind};

/// Connector pieces shorter than this are treated as noise.
pub const MIN_CONNECTOR_LENGTH_M: f64 = 0.1;

/// Name given to direct connectors between differently named trails.
pub const CONNECTOR_NAME: &str = "Connector";

/// Which gap-bridging strategy a pipeline run applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeStrategy {
    None,
    #[default]
    Direct,
    Midpoint,
    EndpointToEdge,
    Weld,
}

impl fmt::Display for BridgeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            BridgeStrategy::None => "none",
            BridgeStrategy::Direct => "direct",
            BridgeStrategy::Midpoint => "midpoint",
            BridgeStrategy::EndpointToEdge => "endpoint-to-edge",
            BridgeStrategy::Weld => "weld",
        };
        f.write_str(value)
    }
}

/// Join pairs of degree-1 vertices lying within `tolerance_m` of each other.
///
/// Each dangling vertex is bridged at most once, to its nearest eligible
/// partner. With `require_same_name` both attached segments must carry the
/// same trail name. A connector runs from the vertex its segment arrives at
/// to the vertex the other segment departs from, so the joined trails can be
/// walked in sequence. Returns the number of connector edges inserted.
pub fn bridge_direct(graph: &mut RoutingGraph, tolerance_m: f64, require_same_name: bool) -> usize {
    let leaves = dangling_nodes(graph);
    let index = PointIndex::build(
        leaves
            .iter()
            .filter_map(|id| graph.nodes.get(id).map(|node| (*id, node.point()))),
    );
    let leaf_names: HashMap<NodeId, &str> = graph
        .edges
        .iter()
        .flat_map(|edge| [(edge.source, edge), (edge.target, edge)])
        .filter(|(id, _)| leaves.contains(id))
        .map(|(id, edge)| (id, edge.trail_name.as_str()))
        .collect();

    let mut used: HashSet<NodeId> = HashSet::new();
    let mut pairs: Vec<(NodeId, NodeId, String)> = Vec::new();

    for &a in &leaves {
        if used.contains(&a) {
            continue;
        }
        let Some(node) = graph.nodes.get(&a) else {
            continue;
        };
        let partner = index.nearest_matching(&node.point(), tolerance_m, |b| {
            *b != a
                && !used.contains(b)
                && !graph.has_edge_between(a, *b)
                && (!require_same_name || leaf_names.get(&a) == leaf_names.get(b))
        });
        let Some((b, _, distance)) = partner else {
            continue;
        };

        let name = match (leaf_names.get(&a), leaf_names.get(&b)) {
            (Some(x), Some(y)) if x == y => x.to_string(),
            _ => CONNECTOR_NAME.to_string(),
        };
        let (source, target) = orient_connector(graph, a, b);
        debug!(source, target, distance_m = distance, "direct connector");
        used.extend([a, b]);
        pairs.push((source, target, name));
    }

    let inserted = pairs.len();
    for (source, target, name) in pairs {
        let (Some(from), Some(to)) = (graph.nodes.get(&source), graph.nodes.get(&target)) else {
            continue;
        };
        let edge = connector_edge(
            graph.next_edge_id(),
            source,
            target,
            vec![from.point(), to.point()],
            Uuid::new_v4().to_string(),
            name,
            EdgeKind::Connector,
        );
        graph.edges.push(edge);
    }

    info!(leaves = leaves.len(), inserted, "bridged gaps with direct connectors");
    inserted
}

/// Add connector trails from each close endpoint pair to its midpoint.
///
/// Only endpoints of non-connector trails are paired, and only across
/// different trails. Each connector carries the name and region of the trail
/// it attaches to. Returns the number of connector trails appended.
pub fn bridge_midpoint(trails: &mut Vec<Trail>, tolerance_m: f64) -> usize {
    let endpoints = trail_endpoints(trails);
    let index = PointIndex::build(endpoints.iter().enumerate().map(|(i, e)| (i, e.point)));

    let mut existing: HashSet<Vec<(u64, u64)>> = trails
        .iter()
        .filter(|trail| trail.kind == TrailKind::Connector)
        .map(|trail| position_key(&trail.geometry))
        .collect();
    let mut connectors: Vec<Trail> = Vec::new();

    for (i, end) in endpoints.iter().enumerate() {
        for (j, _, distance) in index.within_meters(&end.point, tolerance_m) {
            let other = &endpoints[j];
            if j <= i || other.trail == end.trail || distance <= 0.0 {
                continue;
            }
            let shared = midpoint(&end.point, &other.point);
            for side in [end, other] {
                let geometry = vec![side.point, shared];
                if polyline_length_m(&geometry) < MIN_CONNECTOR_LENGTH_M {
                    continue;
                }
                if !existing.insert(position_key(&geometry)) {
                    continue;
                }
                let parent = &trails[side.trail];
                let mut connector = Trail::new(
                    Uuid::new_v4().to_string(),
                    parent.name.clone(),
                    parent.region.clone(),
                    geometry,
                );
                connector.kind = TrailKind::Connector;
                connector.parent_id = Some(parent.root_id().to_string());
                connectors.push(connector);
            }
        }
    }

    let inserted = connectors.len();
    trails.extend(connectors);
    info!(endpoints = endpoints.len(), inserted, "bridged gaps with midpoint connectors");
    inserted
}

/// Attach dangling vertices with no nearby dangling partner to the closest
/// interior point of a nearby edge.
///
/// A new intersection node is placed on the target edge and two edges are
/// added: one from the dangling vertex to the new node, and one from the new
/// node along the target edge to whichever of its ends is nearer. Returns the
/// number of attachments made.
pub fn bridge_endpoint_to_edge(graph: &mut RoutingGraph, tolerance_m: f64) -> usize {
    let leaves = dangling_nodes(graph);
    let leaf_index = PointIndex::build(
        leaves
            .iter()
            .filter_map(|id| graph.nodes.get(id).map(|node| (*id, node.point()))),
    );
    let original_edges = graph.edges.len();
    let mut attached = 0usize;

    for &leaf in &leaves {
        let Some(point) = graph.nodes.get(&leaf).map(RoutingNode::point) else {
            continue;
        };
        if leaf_index
            .nearest_matching(&point, tolerance_m, |other| *other != leaf)
            .is_some()
        {
            continue;
        }

        let Some(hit) = nearest_edge_interior(graph, &graph.edges[..original_edges], leaf, &point, tolerance_m)
        else {
            continue;
        };
        let already = graph.edges.iter().any(|edge| {
            edge.kind == EdgeKind::Connector
                && edge.source == leaf
                && edge.geometry.last().is_some_and(|p| p.same_position(&hit.point))
        });
        if already {
            continue;
        }

        let target = &graph.edges[hit.edge];
        let (trail_id, trail_name) = (target.trail_id.clone(), target.trail_name.clone());
        let leaf_names = graph
            .nodes
            .get(&leaf)
            .map(|node| node.trail_names.clone())
            .unwrap_or_default();

        let new_id = graph.next_node_id();
        graph.nodes.insert(
            new_id,
            RoutingNode {
                id: new_id,
                uuid: Uuid::new_v4().to_string(),
                lat: hit.point.lat,
                lng: hit.point.lng,
                elevation: hit.point.elevation,
                node_type: NodeType::Intersection,
                trail_names: leaf_names
                    .into_iter()
                    .chain([trail_name.clone()])
                    .collect::<BTreeSet<_>>(),
                trail_ids: BTreeSet::from([trail_id.clone()]),
            },
        );

        let connector = connector_edge(
            graph.next_edge_id(),
            leaf,
            new_id,
            vec![point, hit.point],
            Uuid::new_v4().to_string(),
            trail_name.clone(),
            EdgeKind::Connector,
        );
        graph.edges.push(connector);
        let along = connector_edge(
            graph.next_edge_id(),
            new_id,
            hit.nearer_node,
            hit.nearer_part,
            trail_id,
            trail_name,
            EdgeKind::Trail,
        );
        graph.edges.push(along);

        debug!(leaf, node = new_id, distance_m = hit.distance_m, "attached endpoint to edge");
        attached += 1;
    }

    info!(leaves = leaves.len(), attached, "bridged gaps with endpoint-to-edge connectors");
    attached
}

/// Move both endpoints of each close pair onto their shared midpoint.
///
/// Pairs are taken greedily, nearest first; an endpoint is welded at most
/// once. Returns the number of welded pairs.
pub fn weld_endpoints(trails: &mut [Trail], tolerance_m: f64) -> usize {
    let endpoints = trail_endpoints(trails);
    let index = PointIndex::build(endpoints.iter().enumerate().map(|(i, e)| (i, e.point)));

    let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
    for (i, end) in endpoints.iter().enumerate() {
        for (j, _, distance) in index.within_meters(&end.point, tolerance_m) {
            if j > i && endpoints[j].trail != end.trail && distance > 0.0 {
                pairs.push((distance, i, j));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut used: HashSet<usize> = HashSet::new();
    let mut welded = 0usize;
    for (_, i, j) in pairs {
        if used.contains(&i) || used.contains(&j) {
            continue;
        }
        used.extend([i, j]);
        let shared = midpoint(&endpoints[i].point, &endpoints[j].point);
        for end in [&endpoints[i], &endpoints[j]] {
            let trail = &mut trails[end.trail];
            let slot = match end.at {
                End::Start => trail.geometry.first_mut(),
                End::Finish => trail.geometry.last_mut(),
            };
            if let Some(vertex) = slot {
                *vertex = shared;
            }
            trail.recompute();
        }
        welded += 1;
    }

    info!(endpoints = endpoints.len(), welded, "welded close endpoints");
    welded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    Finish,
}

struct Endpoint {
    trail: usize,
    at: End,
    point: TrailPoint,
}

fn trail_endpoints(trails: &[Trail]) -> Vec<Endpoint> {
    trails
        .iter()
        .enumerate()
        .filter(|(_, trail)| trail.kind == TrailKind::Trail)
        .flat_map(|(index, trail)| {
            [
                trail.start().map(|p| Endpoint {
                    trail: index,
                    at: End::Start,
                    point: *p,
                }),
                trail.end().map(|p| Endpoint {
                    trail: index,
                    at: End::Finish,
                    point: *p,
                }),
            ]
        })
        .flatten()
        .collect()
}

/// Direction of a connector between leaves `a` and `b`.
///
/// A leaf whose only edge arrives feeds the leaf whose only edge departs.
/// When both leaves point the same way the lower id is the source.
fn orient_connector(graph: &RoutingGraph, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    let departs = |id: NodeId| graph.edges.iter().any(|edge| edge.source == id);
    match (departs(a), departs(b)) {
        (false, true) => (a, b),
        (true, false) => (b, a),
        _ => (a.min(b), a.max(b)),
    }
}

/// Degree-1 vertices, ascending by id.
fn dangling_nodes(graph: &RoutingGraph) -> BTreeSet<NodeId> {
    graph
        .degrees()
        .into_iter()
        .filter(|(_, degree)| *degree == 1)
        .map(|(id, _)| id)
        .collect()
}

/// Direction-independent key of a connector's 2D geometry.
fn position_key(points: &[TrailPoint]) -> Vec<(u64, u64)> {
    let mut forward: Vec<(u64, u64)> = points
        .iter()
        .map(|p| (p.lng.to_bits(), p.lat.to_bits()))
        .collect();
    let mut backward = forward.clone();
    backward.reverse();
    if backward < forward {
        forward = backward;
    }
    forward
}

struct EdgeHit {
    edge: usize,
    point: TrailPoint,
    distance_m: f64,
    nearer_node: NodeId,
    nearer_part: Vec<TrailPoint>,
}

fn nearest_edge_interior(
    graph: &RoutingGraph,
    edges: &[RoutingEdge],
    leaf: NodeId,
    point: &TrailPoint,
    tolerance_m: f64,
) -> Option<EdgeHit> {
    let mut best: Option<EdgeHit> = None;
    for (index, edge) in edges.iter().enumerate() {
        if edge.source == leaf || edge.target == leaf {
            continue;
        }
        let Some(position) = locate_on_polyline(&edge.geometry, point) else {
            continue;
        };
        let distance_m = point.haversine_m(&position.point);
        if distance_m > tolerance_m || best.as_ref().is_some_and(|b| b.distance_m <= distance_m) {
            continue;
        }

        let mut toward_source: Vec<TrailPoint> = vec![position.point];
        toward_source.extend(edge.geometry[..=position.segment].iter().rev().copied());
        let mut toward_target: Vec<TrailPoint> = vec![position.point];
        toward_target.extend(edge.geometry[position.segment + 1..].iter().copied());
        toward_source.dedup_by(|a, b| a.same_position(b));
        toward_target.dedup_by(|a, b| a.same_position(b));

        let to_source = polyline_length_m(&toward_source);
        let to_target = polyline_length_m(&toward_target);
        if to_source < MIN_CONNECTOR_LENGTH_M || to_target < MIN_CONNECTOR_LENGTH_M {
            continue;
        }
        if !graph.nodes.contains_key(&edge.source) || !graph.nodes.contains_key(&edge.target) {
            continue;
        }

        let (nearer_node, nearer_part) = if to_source <= to_target {
            (edge.source, toward_source)
        } else {
            (edge.target, toward_target)
        };
        best = Some(EdgeHit {
            edge: index,
            point: position.point,
            distance_m,
            nearer_node,
            nearer_part,
        });
    }
    best
}

fn connector_edge(
    id: u64,
    source: NodeId,
    target: NodeId,
    geometry: Vec<TrailPoint>,
    trail_id: String,
    trail_name: String,
    kind: EdgeKind,
) -> RoutingEdge {
    let elevation = ElevationSummary::from_points(&geometry);
    RoutingEdge {
        id,
        source,
        target,
        kind,
        trail_id,
        trail_name,
        length_km: polyline_length_m(&geometry) / 1000.0,
        elevation_gain: elevation.gain,
        elevation_loss: elevation.loss,
        geometry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScoringWeights, StartNodes};
    use crate::network::{build_edges, build_nodes};
    use crate::search::{find_routes, SearchRequest};

    /// Degrees of latitude per metre, close enough for test offsets.
    const DEG_PER_M: f64 = 1.0 / 111_195.0;

    fn trail(id: &str, name: &str, coords: &[(f64, f64)]) -> Trail {
        Trail::new(
            id,
            name,
            "boulder",
            coords
                .iter()
                .map(|(lng, lat)| TrailPoint::new(*lng, *lat, 1800.0))
                .collect(),
        )
    }

    fn graph_of(trails: &[Trail]) -> RoutingGraph {
        let nodes = build_nodes(trails, &[], 0.1);
        let edges = build_edges(trails, &nodes, 0.2);
        RoutingGraph { nodes, edges }
    }

    fn gap_pair(gap_m: f64) -> Vec<Trail> {
        vec![
            trail("a", "Mesa", &[(-105.27, 39.999), (-105.27, 40.0)]),
            trail("b", "Mesa", &[(-105.27, 40.0 + gap_m * DEG_PER_M), (-105.27, 40.001)]),
        ]
    }

    #[test]
    fn direct_connector_closes_half_metre_gap() {
        let mut graph = graph_of(&gap_pair(0.5));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 2);

        assert_eq!(bridge_direct(&mut graph, 2.0, false), 1);
        let connector = graph
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Connector)
            .expect("connector");
        assert!(connector.source < connector.target);
        assert_eq!(connector.trail_name, "Mesa");
        assert!((connector.length_km * 1000.0 - 0.5).abs() < 0.05);

        assert_eq!(bridge_direct(&mut graph, 2.0, false), 0);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn direct_connector_follows_trail_direction() {
        // Westbound pair: the downstream start sits at a lower longitude and
        // therefore gets the lower node id.
        let gap = 0.5 * DEG_PER_M / 40.0_f64.to_radians().cos();
        let trails = vec![
            trail("a", "Ridge", &[(-105.26, 40.0), (-105.27, 40.0)]),
            trail("b", "Ridge", &[(-105.27 - gap, 40.0), (-105.28, 40.0)]),
        ];
        let mut graph = graph_of(&trails);
        assert_eq!(bridge_direct(&mut graph, 2.0, false), 1);

        let node_at = |lng: f64| {
            graph
                .nodes
                .values()
                .find(|node| (node.lng - lng).abs() < 1e-9)
                .map(|node| node.id)
                .expect("node")
        };
        let (a_start, a_end, b_start) = (node_at(-105.26), node_at(-105.27), node_at(-105.27 - gap));
        assert!(b_start < a_end);
        let connector = graph
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Connector)
            .expect("connector");
        assert_eq!((connector.source, connector.target), (a_end, b_start));

        let request = SearchRequest {
            target_distance_km: 1.7,
            target_elevation_gain_m: 0.0,
            tolerance_percent: 5.0,
            max_depth: 8,
            start_nodes: StartNodes::All,
        };
        let routes = find_routes(&graph, &request, &ScoringWeights::default()).expect("search");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].start_node, a_start);
        assert_eq!(routes[0].path.len(), 4);
        assert_eq!(routes[0].trail_names, vec!["Ridge"]);
    }

    #[test]
    fn facing_trail_ends_connect_in_id_order() {
        let gap = 0.5 * DEG_PER_M;
        let trails = vec![
            trail("a", "Mesa", &[(-105.27, 39.999), (-105.27, 40.0)]),
            trail("b", "Mesa", &[(-105.27, 40.001), (-105.27, 40.0 + gap)]),
        ];
        let mut graph = graph_of(&trails);
        assert_eq!(bridge_direct(&mut graph, 2.0, false), 1);
        let connector = graph
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Connector)
            .expect("connector");
        assert!(connector.source < connector.target);
    }

    #[test]
    fn direct_connector_respects_tolerance_and_names() {
        let mut graph = graph_of(&gap_pair(5.0));
        assert_eq!(bridge_direct(&mut graph, 2.0, false), 0);

        let trails = vec![
            trail("a", "Mesa", &[(-105.27, 39.999), (-105.27, 40.0)]),
            trail("b", "Bluebell", &[(-105.27, 40.000_004), (-105.27, 40.001)]),
        ];
        let mut graph = graph_of(&trails);
        assert_eq!(bridge_direct(&mut graph, 2.0, true), 0);
        assert_eq!(bridge_direct(&mut graph, 2.0, false), 1);
        assert!(graph.edges.iter().any(|e| e.trail_name == CONNECTOR_NAME));
    }

    #[test]
    fn midpoint_connectors_meet_at_shared_vertex() {
        let mut trails = gap_pair(4.0);
        assert_eq!(bridge_midpoint(&mut trails, 5.0), 2);
        let connectors: Vec<_> = trails
            .iter()
            .filter(|t| t.kind == TrailKind::Connector)
            .collect();
        assert_eq!(connectors.len(), 2);
        let (x, y) = (connectors[0].end().expect("end"), connectors[1].end().expect("end"));
        assert!(x.same_position(y));
        assert!(connectors.iter().all(|c| (c.length_km * 1000.0 - 2.0).abs() < 0.05));
        assert_eq!(connectors[0].parent_id.as_deref(), Some("a"));

        assert_eq!(bridge_midpoint(&mut trails, 5.0), 0);
        assert_eq!(trails.len(), 4);
    }

    #[test]
    fn midpoint_connectors_below_minimum_are_dropped() {
        let mut trails = gap_pair(0.15);
        assert_eq!(bridge_midpoint(&mut trails, 5.0), 0);
    }

    #[test]
    fn endpoint_attaches_to_nearest_edge_interior() {
        let trails = vec![
            trail("a", "Mesa", &[(-105.271, 40.0), (-105.269, 40.0)]),
            trail("b", "Spur", &[(-105.27, 40.0 + 1.0 * DEG_PER_M), (-105.27, 40.001)]),
        ];
        let mut graph = graph_of(&trails);
        let before_nodes = graph.node_count();

        assert_eq!(bridge_endpoint_to_edge(&mut graph, 5.0), 1);
        assert_eq!(graph.node_count(), before_nodes + 1);
        assert_eq!(graph.edge_count(), 4);

        let junction = graph
            .nodes
            .values()
            .find(|n| n.node_type == NodeType::Intersection)
            .expect("junction");
        assert!((junction.lat - 40.0).abs() < 1e-9);
        assert!(junction.trail_names.contains("Mesa") && junction.trail_names.contains("Spur"));

        let along = graph
            .edges
            .iter()
            .find(|e| e.source == junction.id)
            .expect("edge along target");
        assert_eq!(along.trail_name, "Mesa");
        assert!((along.length_km - 0.0852).abs() < 0.002);

        assert_eq!(bridge_endpoint_to_edge(&mut graph, 5.0), 0);
    }

    #[test]
    fn endpoint_with_dangling_partner_is_left_to_direct() {
        let mut graph = graph_of(&gap_pair(0.5));
        assert_eq!(bridge_endpoint_to_edge(&mut graph, 2.0), 0);
    }

    #[test]
    fn weld_moves_both_endpoints_to_midpoint() {
        let mut trails = gap_pair(3.0);
        let original = trails[0].length_km;
        assert_eq!(weld_endpoints(&mut trails, 5.0), 1);
        let (end, start) = (trails[0].end().expect("end"), trails[1].start().expect("start"));
        assert!(end.same_position(start));
        assert!(trails[0].length_km > original);

        assert_eq!(weld_endpoints(&mut trails, 5.0), 0);
    }
}
