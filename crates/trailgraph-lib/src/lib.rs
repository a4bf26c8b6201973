//! Trailgraph library entry points.
//!
//! This crate turns raw trail line geometries into a routable node/edge graph
//! (repair, intersection detection, splitting, gap bridging, node and edge
//! generation) and searches that graph for routes matching a target distance
//! and elevation gain. Higher-level consumers (the CLI, batch orchestration)
//! should drive the stages exported here instead of reimplementing them.
//!

pub mod bridge;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod intersection;
pub mod network;
pub mod pipeline;
pub mod recommend;
pub mod repair;
pub mod scoring;
pub mod search;
pub mod spatial;
pub mod split;
pub mod trail;

pub use bridge::{
    bridge_direct, bridge_endpoint_to_edge, bridge_midpoint, weld_endpoints, BridgeStrategy,
};
pub use config::{PipelineConfig, RoutePattern, RouteShape, StartNodes};
pub use dataset::{load_trails, parse_trails};
pub use error::{Error, Result};
pub use geometry::TrailPoint;
pub use graph::{EdgeId, NodeId, NodeType, RoutingEdge, RoutingGraph, RoutingNode};
pub use intersection::{detect_intersections, IntersectionPoint};
pub use network::{build_edges, build_nodes, cleanup_orphans};
pub use pipeline::{process_region, process_regions, RegionReport, RegionWorkspace, Stage, StageResult};
pub use recommend::{
    generate_recommendations, MemorySink, RecommendationSink, RouteRecommendation,
};
pub use repair::{repair_trails, RepairReport};
pub use scoring::{compare_cost_modes, CostMode, ModeStats, RouteMetrics};
pub use search::{find_routes, CandidateRoute, SearchRequest};
pub use split::split_trails;
pub use trail::Trail;
