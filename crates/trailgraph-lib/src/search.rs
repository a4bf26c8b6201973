//! Bounded depth-first route search.
//!
//! The search starts independently from every eligible node and follows
//! out-edges without revisiting a node. A branch is pruned as soon as its
//! distance or elevation gain would exceed the upper tolerance bound. A state
//! is emitted once it reaches the maximum depth or has no valid transition
//! left; it becomes a [`CandidateRoute`] when both totals lie inside the
//! tolerance band.
//!
//! The walk is exponential in the depth bound. Callers that need a hard time
//! limit should impose one around [`find_routes`].

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{DiscoveryLimits, RoutePattern, RouteShape, ScoringWeights, StartNodes};
use crate::error::{Error, Result};
use crate::graph::{EdgeId, EdgeKind, NodeId, NodeType, RoutingEdge, RoutingGraph};
use crate::scoring::{classify_shape, similarity};

/// Targets and bounds of one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub target_distance_km: f64,
    pub target_elevation_gain_m: f64,
    pub tolerance_percent: f64,
    pub max_depth: usize,
    pub start_nodes: StartNodes,
}

impl SearchRequest {
    pub fn from_pattern(pattern: &RoutePattern, limits: &DiscoveryLimits) -> Self {
        Self {
            target_distance_km: pattern.target_distance_km,
            target_elevation_gain_m: pattern.target_elevation_gain_m,
            tolerance_percent: pattern.tolerance_percent,
            max_depth: limits.max_depth,
            start_nodes: limits.start_nodes,
        }
    }

    /// Inclusive acceptance band for distance, km.
    pub fn distance_band(&self) -> (f64, f64) {
        band(self.target_distance_km, self.tolerance_percent)
    }

    /// Inclusive acceptance band for elevation gain, m.
    pub fn elevation_band(&self) -> (f64, f64) {
        band(self.target_elevation_gain_m, self.tolerance_percent)
    }
}

fn band(target: f64, tolerance_percent: f64) -> (f64, f64) {
    let spread = tolerance_percent / 100.0;
    (target * (1.0 - spread), target * (1.0 + spread))
}

/// An accepted search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRoute {
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub path: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub distance_km: f64,
    pub elevation_gain: f64,
    pub shape: RouteShape,
    /// Number of distinct trail names traversed. Connector edges do not
    /// count.
    pub trail_count: usize,
    /// Distinct trail names in traversal order, connectors excluded.
    pub trail_names: Vec<String>,
    pub similarity_score: f64,
}

struct Walk<'g> {
    adjacency: HashMap<NodeId, Vec<&'g RoutingEdge>>,
    request: &'g SearchRequest,
    weights: &'g ScoringWeights,
    distance_max: f64,
    elevation_max: f64,
    emitted: usize,
    found: Vec<CandidateRoute>,
}

#[derive(Clone)]
struct State {
    path: Vec<NodeId>,
    edges: Vec<EdgeId>,
    distance_km: f64,
    elevation_gain: f64,
    trail_names: Vec<String>,
}

impl State {
    fn depth(&self) -> usize {
        self.edges.len()
    }

    fn current(&self) -> Option<NodeId> {
        self.path.last().copied()
    }
}

impl Walk<'_> {
    fn explore(&mut self, state: &mut State) {
        let Some(current) = state.current() else {
            return;
        };
        if state.depth() >= self.request.max_depth {
            self.emit(state);
            return;
        }

        let transitions: Vec<&RoutingEdge> = self
            .adjacency
            .get(&current)
            .map(|edges| {
                edges
                    .iter()
                    .copied()
                    .filter(|edge| !state.path.contains(&edge.target))
                    .filter(|edge| {
                        state.distance_km + edge.length_km <= self.distance_max
                            && state.elevation_gain + edge.elevation_gain <= self.elevation_max
                    })
                    .collect()
            })
            .unwrap_or_default();

        if transitions.is_empty() {
            self.emit(state);
            return;
        }

        for edge in transitions {
            let named = edge.kind == EdgeKind::Trail;
            state.path.push(edge.target);
            state.edges.push(edge.id);
            state.distance_km += edge.length_km;
            state.elevation_gain += edge.elevation_gain;
            if named {
                state.trail_names.push(edge.trail_name.clone());
            }

            self.explore(state);

            if named {
                state.trail_names.pop();
            }
            state.elevation_gain -= edge.elevation_gain;
            state.distance_km -= edge.length_km;
            state.edges.pop();
            state.path.pop();
        }
    }

    fn emit(&mut self, state: &State) {
        self.emitted += 1;
        if state.path.len() < 2 {
            return;
        }
        let (d_lo, d_hi) = self.request.distance_band();
        let (e_lo, e_hi) = self.request.elevation_band();
        if state.distance_km < d_lo || state.distance_km > d_hi {
            return;
        }
        if state.elevation_gain < e_lo || state.elevation_gain > e_hi {
            return;
        }

        let mut seen = BTreeSet::new();
        let trail_names: Vec<String> = state
            .trail_names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();
        let (Some(start_node), Some(end_node)) = (state.path.first(), state.path.last()) else {
            return;
        };

        self.found.push(CandidateRoute {
            start_node: *start_node,
            end_node: *end_node,
            path: state.path.clone(),
            edges: state.edges.clone(),
            distance_km: state.distance_km,
            elevation_gain: state.elevation_gain,
            shape: classify_shape(&state.path),
            trail_count: trail_names.len(),
            trail_names,
            similarity_score: similarity(
                state.distance_km,
                state.elevation_gain,
                self.request.target_distance_km,
                self.request.target_elevation_gain_m,
                self.weights,
            ),
        });
    }
}

/// Enumerate every route of `graph` whose totals fall inside the request's
/// tolerance band.
///
/// Every edge must reference existing nodes; run orphan cleanup first on a
/// graph that was edited by hand.
///
/// Results are ordered by start node id, then by exploration order (out-edges
/// in edge-id order).
pub fn find_routes(
    graph: &RoutingGraph,
    request: &SearchRequest,
    weights: &ScoringWeights,
) -> Result<Vec<CandidateRoute>> {
    if graph.nodes.is_empty() || graph.edges.is_empty() {
        return Err(Error::EmptyGraph);
    }
    for edge in &graph.edges {
        graph.node(edge.source)?;
        graph.node(edge.target)?;
    }
    if !(request.tolerance_percent > 0.0 && request.tolerance_percent <= 100.0) {
        return Err(Error::config(format!(
            "tolerance_percent must be in (0, 100], got {}",
            request.tolerance_percent
        )));
    }

    let (_, distance_max) = request.distance_band();
    let (_, elevation_max) = request.elevation_band();
    let mut walk = Walk {
        adjacency: graph.adjacency(),
        request,
        weights,
        distance_max,
        elevation_max,
        emitted: 0,
        found: Vec::new(),
    };

    let starts = graph.nodes.values().filter(|node| match request.start_nodes {
        StartNodes::All => true,
        StartNodes::Intersections => node.node_type == NodeType::Intersection,
    });
    let mut start_count = 0usize;
    for node in starts {
        start_count += 1;
        let mut state = State {
            path: vec![node.id],
            edges: Vec::new(),
            distance_km: 0.0,
            elevation_gain: 0.0,
            trail_names: Vec::new(),
        };
        walk.explore(&mut state);
        debug!(start = node.id, found = walk.found.len(), "explored start node");
    }

    info!(
        starts = start_count,
        emitted = walk.emitted,
        accepted = walk.found.len(),
        target_km = request.target_distance_km,
        target_gain_m = request.target_elevation_gain_m,
        "route search finished"
    );
    Ok(walk.found)
}
