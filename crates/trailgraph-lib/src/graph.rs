use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::TrailPoint;

/// Numeric identifier of a routing node.
pub type NodeId = u64;

/// Numeric identifier of a routing edge.
pub type EdgeId = u64;

/// Classification of a canonical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Endpoint,
    Intersection,
}

/// Classification of an edge in the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Carries one trail segment.
    Trail,
    /// Inserted by a gap-bridging strategy.
    Connector,
}

/// Canonical vertex of the routable graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingNode {
    pub id: NodeId,
    pub uuid: String,
    pub lat: f64,
    pub lng: f64,
    pub elevation: f64,
    pub node_type: NodeType,
    pub trail_names: BTreeSet<String>,
    pub trail_ids: BTreeSet<String>,
}

impl RoutingNode {
    pub fn point(&self) -> TrailPoint {
        TrailPoint::new(self.lng, self.lat, self.elevation)
    }
}

/// Directed association between two nodes carrying one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub trail_id: String,
    pub trail_name: String,
    pub length_km: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub geometry: Vec<TrailPoint>,
}

impl RoutingEdge {
    /// Whether this edge joins `a` and `b` in either direction.
    pub fn joins(&self, a: NodeId, b: NodeId) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// The routable graph: canonical nodes plus directed edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingGraph {
    pub nodes: BTreeMap<NodeId, RoutingNode>,
    pub edges: Vec<RoutingEdge>,
}

impl RoutingGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&RoutingNode> {
        self.nodes.get(&id).ok_or(Error::UnknownNode { node_id: id })
    }

    pub fn edge(&self, id: EdgeId) -> Option<&RoutingEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Next free node identifier.
    pub fn next_node_id(&self) -> NodeId {
        self.nodes.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Next free edge identifier.
    pub fn next_edge_id(&self) -> EdgeId {
        self.edges.iter().map(|edge| edge.id).max().map_or(1, |id| id + 1)
    }

    /// Number of edges touching each node, regardless of direction.
    pub fn degrees(&self) -> HashMap<NodeId, usize> {
        let mut degrees: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        for edge in &self.edges {
            *degrees.entry(edge.source).or_default() += 1;
            *degrees.entry(edge.target).or_default() += 1;
        }
        degrees
    }

    /// Outgoing edges per node, ordered by edge id.
    pub fn adjacency(&self) -> HashMap<NodeId, Vec<&RoutingEdge>> {
        let mut adjacency: HashMap<NodeId, Vec<&RoutingEdge>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(edge.source).or_default().push(edge);
        }
        for edges in adjacency.values_mut() {
            edges.sort_by_key(|edge| edge.id);
        }
        adjacency
    }

    /// Whether any edge already joins `a` and `b`.
    pub fn has_edge_between(&self, a: NodeId, b: NodeId) -> bool {
        self.edges.iter().any(|edge| edge.joins(a, b))
    }
}
