//! Pattern-driven route recommendations.
//!
//! For every configured [`RoutePattern`] the search runs with the pattern's
//! targets, results are filtered by shape and discovery bounds, the best are
//! selected and turned into named [`RouteRecommendation`]s, and the set for
//! that (region, pattern) replaces whatever a sink held before.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{PipelineConfig, RoutePattern, RouteShape};
use crate::error::Result;
use crate::geometry::TrailPoint;
use crate::graph::{EdgeId, NodeId, RoutingGraph};
use crate::scoring::{select_candidates, RouteMetrics};
use crate::search::{find_routes, CandidateRoute, SearchRequest};

/// A persisted, named route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecommendation {
    pub uuid: String,
    pub region: String,
    /// Pattern the route was generated for, including its targets.
    pub criteria: RoutePattern,
    pub recommended_distance_km: f64,
    pub recommended_elevation_gain: f64,
    pub shape: RouteShape,
    pub trail_count: usize,
    /// 0 to 100.
    pub score: u8,
    pub similarity_score: f64,
    /// Ordered `[lng, lat, elevation]` triples.
    pub path: Vec<[f64; 3]>,
    pub node_ids: Vec<NodeId>,
    pub edge_ids: Vec<EdgeId>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub metrics: RouteMetrics,
}

impl RouteRecommendation {
    /// Build a recommendation from a selected candidate.
    pub fn from_candidate(
        graph: &RoutingGraph,
        region: &str,
        pattern: &RoutePattern,
        candidate: &CandidateRoute,
        quality_weight: f64,
    ) -> Self {
        let metrics = RouteMetrics::for_route(graph, candidate);
        let q = quality_weight.clamp(0.0, 1.0);
        let blended = (1.0 - q) * candidate.similarity_score + q * metrics.connectivity;
        Self {
            uuid: Uuid::new_v4().to_string(),
            region: region.to_string(),
            criteria: pattern.clone(),
            recommended_distance_km: candidate.distance_km,
            recommended_elevation_gain: candidate.elevation_gain,
            shape: candidate.shape,
            trail_count: candidate.trail_count,
            score: (blended * 100.0).round().clamp(0.0, 100.0) as u8,
            similarity_score: candidate.similarity_score,
            path: route_path(graph, &candidate.edges),
            node_ids: candidate.path.clone(),
            edge_ids: candidate.edges.clone(),
            name: route_name(&candidate.trail_names, candidate.shape),
            created_at: Utc::now(),
            metrics,
        }
    }

    /// Render the route as a GeoJSON `LineString` feature.
    pub fn to_geojson_feature(&self) -> geojson::Feature {
        let mut properties: serde_json::Map<String, JsonValue> = serde_json::Map::new();
        properties.insert("route_uuid".to_string(), JsonValue::from(self.uuid.clone()));
        properties.insert("route_name".to_string(), JsonValue::from(self.name.clone()));
        properties.insert("route_score".to_string(), JsonValue::from(self.score));
        properties.insert(
            "route_shape".to_string(),
            JsonValue::from(self.shape.to_string()),
        );
        properties.insert(
            "recommended_length_km".to_string(),
            JsonValue::from(self.recommended_distance_km),
        );
        properties.insert(
            "recommended_elevation_gain".to_string(),
            JsonValue::from(self.recommended_elevation_gain),
        );
        properties.insert("trail_count".to_string(), JsonValue::from(self.trail_count));
        properties.insert(
            "created_at".to_string(),
            JsonValue::from(self.created_at.to_rfc3339()),
        );

        let line = self.path.iter().map(|p| p.to_vec()).collect::<Vec<_>>();
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry {
                bbox: None,
                value: geojson::Value::LineString(line),
                foreign_members: None,
            }),
            id: Some(geojson::feature::Id::String(self.uuid.clone())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Compose a route name from distinct trail names in traversal order.
///
/// One name is used as is, two become `"A/B Route"`, more become
/// `"A/...Z Route"`. The shape label is appended unless the name already
/// mentions it.
pub fn route_name(trail_names: &[String], shape: RouteShape) -> String {
    let base = match trail_names {
        [] => "Unnamed Route".to_string(),
        [only] => only.clone(),
        [first, second] => format!("{first}/{second} Route"),
        [first, .., last] => format!("{first}/...{last} Route"),
    };
    let label = shape.label();
    if base.to_lowercase().contains(&label.to_lowercase()) {
        base
    } else {
        format!("{base} {label}")
    }
}

/// Concatenate edge geometries into one coordinate list, dropping repeated
/// joints.
pub fn route_path(graph: &RoutingGraph, edges: &[EdgeId]) -> Vec<[f64; 3]> {
    let mut points: Vec<TrailPoint> = Vec::new();
    for edge in edges.iter().filter_map(|id| graph.edge(*id)) {
        for point in &edge.geometry {
            if points.last().is_some_and(|last| last.same_position(point)) {
                continue;
            }
            points.push(*point);
        }
    }
    points.iter().map(TrailPoint::as_triple).collect()
}

/// Destination for generated recommendations.
///
/// Writes replace the whole set for a (region, pattern) pair so reruns never
/// accumulate stale routes.
pub trait RecommendationSink {
    /// Replace the stored routes of `pattern` in `region`; returns how many
    /// were stored.
    fn replace_pattern(
        &mut self,
        region: &str,
        pattern: &str,
        routes: Vec<RouteRecommendation>,
    ) -> Result<usize>;

    /// Every stored recommendation, grouped by region then pattern.
    fn all(&self) -> Vec<&RouteRecommendation>;
}

/// In-memory [`RecommendationSink`].
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    routes: BTreeMap<(String, String), Vec<RouteRecommendation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pattern(&self, region: &str, pattern: &str) -> &[RouteRecommendation] {
        self.routes
            .get(&(region.to_string(), pattern.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn into_routes(self) -> Vec<RouteRecommendation> {
        self.routes.into_values().flatten().collect()
    }
}

impl RecommendationSink for MemorySink {
    fn replace_pattern(
        &mut self,
        region: &str,
        pattern: &str,
        routes: Vec<RouteRecommendation>,
    ) -> Result<usize> {
        let count = routes.len();
        let key = (region.to_string(), pattern.to_string());
        if routes.is_empty() {
            self.routes.remove(&key);
        } else {
            self.routes.insert(key, routes);
        }
        Ok(count)
    }

    fn all(&self) -> Vec<&RouteRecommendation> {
        self.routes.values().flatten().collect()
    }
}

/// Search, filter, select and name routes for one pattern.
pub fn recommend_for_pattern(
    graph: &RoutingGraph,
    region: &str,
    pattern: &RoutePattern,
    config: &PipelineConfig,
) -> Result<Vec<RouteRecommendation>> {
    let limits = &config.discovery;
    let request = SearchRequest::from_pattern(pattern, limits);
    let candidates: Vec<CandidateRoute> = find_routes(graph, &request, &config.scoring)?
        .into_iter()
        .filter(|c| pattern.shape.accepts(c.shape))
        .filter(|c| c.distance_km >= limits.min_distance_km && c.distance_km <= limits.max_distance_km)
        .filter(|c| c.elevation_gain <= limits.max_elevation_gain_m)
        .collect();
    let found = candidates.len();

    let selected = select_candidates(
        candidates,
        limits.min_route_score,
        limits.max_routes_per_pattern,
    );
    debug!(pattern = %pattern.name, found, selected = selected.len(), "selected candidates");

    Ok(selected
        .iter()
        .map(|candidate| {
            RouteRecommendation::from_candidate(
                graph,
                region,
                pattern,
                candidate,
                config.scoring.quality_weight,
            )
        })
        .collect())
}

/// Generate recommendations for every configured pattern and write them to
/// `sink`, replacing each pattern's previous set. Returns the number stored.
pub fn generate_recommendations(
    graph: &RoutingGraph,
    region: &str,
    config: &PipelineConfig,
    sink: &mut dyn RecommendationSink,
) -> Result<usize> {
    let mut stored = 0usize;
    for pattern in &config.patterns {
        let routes = recommend_for_pattern(graph, region, pattern, config)?;
        stored += sink.replace_pattern(region, &pattern.name, routes)?;
    }
    info!(region, patterns = config.patterns.len(), stored, "generated route recommendations");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::graph::{EdgeKind, NodeType, RoutingEdge, RoutingNode};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn graph() -> RoutingGraph {
        let mut graph = RoutingGraph::default();
        let points = [
            TrailPoint::new(-105.28, 40.0, 1800.0),
            TrailPoint::new(-105.28, 40.02, 1900.0),
            TrailPoint::new(-105.28, 40.04, 2000.0),
        ];
        for (i, point) in points.iter().enumerate() {
            let id = i as u64 + 1;
            graph.nodes.insert(
                id,
                RoutingNode {
                    id,
                    uuid: format!("n{id}"),
                    lat: point.lat,
                    lng: point.lng,
                    elevation: point.elevation,
                    node_type: NodeType::Endpoint,
                    trail_names: BTreeSet::new(),
                    trail_ids: BTreeSet::new(),
                },
            );
        }
        for (i, name) in ["Mesa", "Bear Peak"].iter().enumerate() {
            let id = i as u64 + 1;
            let geometry = vec![points[i], points[i + 1]];
            graph.edges.push(RoutingEdge {
                id,
                source: id,
                target: id + 1,
                kind: EdgeKind::Trail,
                trail_id: format!("t{id}"),
                trail_name: name.to_string(),
                length_km: crate::geometry::polyline_length_m(&geometry) / 1000.0,
                elevation_gain: 100.0,
                elevation_loss: 0.0,
                geometry,
            });
        }
        graph
    }

    fn config(pattern: RoutePattern) -> PipelineConfig {
        PipelineConfig {
            patterns: vec![pattern],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn names_follow_trail_count() {
        assert_eq!(route_name(&names(&["Mesa"]), RouteShape::PointToPoint), "Mesa Point-to-Point");
        assert_eq!(
            route_name(&names(&["Mesa", "Bear Peak"]), RouteShape::OutAndBack),
            "Mesa/Bear Peak Route Out-and-Back"
        );
        assert_eq!(
            route_name(&names(&["Mesa", "Fern", "Bear Peak"]), RouteShape::PointToPoint),
            "Mesa/...Bear Peak Route Point-to-Point"
        );
        assert_eq!(route_name(&names(&["Lake Loop"]), RouteShape::Loop), "Lake Loop");
    }

    #[test]
    fn path_joins_edges_without_repeating_vertices() {
        let graph = graph();
        let path = route_path(&graph, &[1, 2]);
        assert_eq!(path.len(), 3);
        assert_eq!(path[2], [-105.28, 40.04, 2000.0]);
    }

    #[test]
    fn recommends_matching_route() {
        let graph = graph();
        let pattern = RoutePattern::new("p2p", 4.4, 200.0, RouteShape::PointToPoint, 20.0);
        let config = config(pattern.clone());
        let routes = recommend_for_pattern(&graph, "boulder", &pattern, &config).expect("routes");

        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.node_ids, vec![1, 2, 3]);
        assert_eq!(route.name, "Mesa/Bear Peak Route Point-to-Point");
        assert_eq!(route.trail_count, 2);
        assert!(route.score >= 95);
        assert_eq!(route.path.len(), 3);
        assert_eq!(route.metrics.elevation_max, 2000.0);
        assert!(route.metrics.length_3d_km > route.recommended_distance_km);
    }

    #[test]
    fn loop_request_falls_back_to_point_to_point() {
        let graph = graph();
        let pattern = RoutePattern::new("loop", 4.4, 200.0, RouteShape::Loop, 20.0);
        let config = config(pattern.clone());
        let routes = recommend_for_pattern(&graph, "boulder", &pattern, &config).expect("routes");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].shape, RouteShape::PointToPoint);
    }

    #[test]
    fn discovery_bounds_filter_routes() {
        let graph = graph();
        let pattern = RoutePattern::new("p2p", 4.4, 200.0, RouteShape::PointToPoint, 20.0);
        let mut config = config(pattern.clone());
        config.discovery.max_elevation_gain_m = 150.0;
        let routes = recommend_for_pattern(&graph, "boulder", &pattern, &config).expect("routes");
        assert!(routes.is_empty());
    }

    #[test]
    fn sink_replaces_previous_set() {
        let graph = graph();
        let pattern = RoutePattern::new("p2p", 4.4, 200.0, RouteShape::PointToPoint, 20.0);
        let config = config(pattern);
        let mut sink = MemorySink::new();

        assert_eq!(generate_recommendations(&graph, "boulder", &config, &mut sink).expect("run"), 1);
        let first = sink.pattern("boulder", "p2p")[0].uuid.clone();
        assert_eq!(generate_recommendations(&graph, "boulder", &config, &mut sink).expect("run"), 1);
        assert_eq!(sink.len(), 1);
        assert_ne!(sink.all()[0].uuid, first);
    }

    #[test]
    fn quality_weight_blends_connectivity() {
        let graph = graph();
        let pattern = RoutePattern::new("p2p", 4.4, 200.0, RouteShape::PointToPoint, 20.0);
        let candidate = find_routes(
            &graph,
            &SearchRequest::from_pattern(&pattern, &PipelineConfig::default().discovery),
            &PipelineConfig::default().scoring,
        )
        .expect("search")
        .remove(0);

        let pure = RouteRecommendation::from_candidate(&graph, "boulder", &pattern, &candidate, 0.0);
        let blended = RouteRecommendation::from_candidate(&graph, "boulder", &pattern, &candidate, 1.0);
        assert_eq!(blended.score, (pure.metrics.connectivity * 100.0).round() as u8);
    }

    #[test]
    fn geojson_feature_carries_route_properties() {
        let graph = graph();
        let pattern = RoutePattern::new("p2p", 4.4, 200.0, RouteShape::PointToPoint, 20.0);
        let config = config(pattern.clone());
        let route = recommend_for_pattern(&graph, "boulder", &pattern, &config)
            .expect("routes")
            .remove(0);

        let feature = route.to_geojson_feature();
        assert_eq!(
            feature.property("route_name").and_then(JsonValue::as_str),
            Some(route.name.as_str())
        );
        assert_eq!(
            feature.property("route_shape").and_then(JsonValue::as_str),
            Some("point-to-point")
        );
        assert_eq!(
            feature.property("trail_count").and_then(JsonValue::as_u64),
            Some(2)
        );
        let text = geojson::GeoJson::from(feature).to_string();
        assert!(text.contains("LineString"));
    }
}
