//! Discrete pipeline stages for one region, and a runner across regions.
//!
//! Every stage returns a [`StageResult`] instead of an error: failures are
//! logged and reported with a message, and the workspace keeps its previous
//! state. Stages replace their own output on each call, so any of them can be
//! re-run safely.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::bridge::{self, BridgeStrategy};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::graph::{NodeType, RoutingGraph, RoutingNode};
use crate::intersection::{detect_intersections, IntersectionPoint};
use crate::network::{build_edges, build_nodes, cleanup_orphans};
use crate::recommend::{generate_recommendations, MemorySink, RecommendationSink, RouteRecommendation};
use crate::repair::{repair_trails, RepairReport};
use crate::search::{find_routes, CandidateRoute, SearchRequest};
use crate::split::split_trails;
use crate::trail::Trail;

/// Maximum number of region names offered as suggestions.
const MAX_SUGGESTIONS: usize = 3;

/// Minimum Jaro-Winkler similarity for a region name to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Named pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Repair,
    DetectIntersections,
    Split,
    BridgeDirect,
    BridgeMidpoint,
    BridgeEndpointToEdge,
    WeldEndpoints,
    BuildNodes,
    BuildEdges,
    CleanupOrphans,
    RunSearch,
    GenerateRecommendations,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Stage::Repair => "repair",
            Stage::DetectIntersections => "detect_intersections",
            Stage::Split => "split",
            Stage::BridgeDirect => "bridge_direct",
            Stage::BridgeMidpoint => "bridge_midpoint",
            Stage::BridgeEndpointToEdge => "bridge_endpoint_to_edge",
            Stage::WeldEndpoints => "weld_endpoints",
            Stage::BuildNodes => "build_nodes",
            Stage::BuildEdges => "build_edges",
            Stage::CleanupOrphans => "cleanup_orphans",
            Stage::RunSearch => "run_search",
            Stage::GenerateRecommendations => "generate_recommendations",
        };
        f.write_str(value)
    }
}

/// Outcome of one stage: success flag, affected entity count and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub count: usize,
    pub message: String,
}

impl StageResult {
    fn from_outcome(stage: Stage, outcome: Result<(usize, String)>) -> Self {
        match outcome {
            Ok((count, message)) => {
                info!(%stage, count, "{message}");
                Self {
                    stage,
                    success: true,
                    count,
                    message,
                }
            }
            Err(err) => {
                error!(%stage, error = %err, "stage failed");
                Self {
                    stage,
                    success: false,
                    count: 0,
                    message: err.to_string(),
                }
            }
        }
    }
}

/// Isolated working set of one region.
///
/// Each stage reads the committed output of the previous ones, computes its
/// own output on a fresh value and commits it with a single assignment only
/// when it succeeds.
#[derive(Debug, Clone)]
pub struct RegionWorkspace<'a> {
    pub region: String,
    config: &'a PipelineConfig,
    pub trails: Vec<Trail>,
    pub repair_report: RepairReport,
    pub intersections: Vec<IntersectionPoint>,
    pub segments: Vec<Trail>,
    pub graph: RoutingGraph,
    pub candidates: Vec<CandidateRoute>,
    pub results: Vec<StageResult>,
}

impl<'a> RegionWorkspace<'a> {
    pub fn new(region: impl Into<String>, config: &'a PipelineConfig) -> Self {
        Self {
            region: region.into(),
            config,
            trails: Vec::new(),
            repair_report: RepairReport::default(),
            intersections: Vec::new(),
            segments: Vec::new(),
            graph: RoutingGraph::default(),
            candidates: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    fn record(&mut self, stage: Stage, outcome: Result<(usize, String)>) -> StageResult {
        let result = StageResult::from_outcome(stage, outcome);
        self.results.push(result.clone());
        result
    }

    /// Select this region's trails from `input`, then repair and validate
    /// them.
    pub fn repair(&mut self, input: &[Trail]) -> StageResult {
        let outcome = self.try_repair(input);
        self.record(Stage::Repair, outcome)
    }

    fn try_repair(&mut self, input: &[Trail]) -> Result<(usize, String)> {
        self.config.validate()?;
        let selected = select_region(input, &self.region)?;
        let limit = self.config.limits.max_trails_per_batch;
        if selected.len() > limit {
            return Err(Error::config(format!(
                "region {} has {} trails, above max_trails_per_batch {limit}",
                self.region,
                selected.len()
            )));
        }

        let (kept, report) = repair_trails(selected, self.config);
        self.trails = kept;
        self.repair_report = report;
        Ok((
            report.kept,
            format!("kept {} of {} trails", report.kept, report.input),
        ))
    }

    pub fn detect_intersections(&mut self) -> StageResult {
        let points = detect_intersections(&self.trails, self.config.tolerances.intersection_m);
        let count = points.len();
        self.intersections = points;
        self.record(
            Stage::DetectIntersections,
            Ok((count, format!("found {count} intersection points"))),
        )
    }

    pub fn split(&mut self) -> StageResult {
        let outcome = split_trails(
            &self.trails,
            &self.intersections,
            self.config.tolerances.intersection_m,
        );
        let message = format!(
            "split {} trails into {} segments",
            outcome.split_trails,
            outcome.segments.len()
        );
        let count = outcome.segments.len();
        self.segments = outcome.segments;
        self.record(Stage::Split, Ok((count, message)))
    }

    /// Add midpoint connector trails. Run before intersection detection.
    pub fn bridge_midpoint(&mut self) -> StageResult {
        let mut trails = self.trails.clone();
        let inserted = bridge::bridge_midpoint(&mut trails, self.config.tolerances.bridge_m);
        self.trails = trails;
        self.record(
            Stage::BridgeMidpoint,
            Ok((inserted, format!("inserted {inserted} midpoint connectors"))),
        )
    }

    /// Weld close endpoints. Run before intersection detection.
    pub fn weld_endpoints(&mut self) -> StageResult {
        let mut trails = self.trails.clone();
        let welded = bridge::weld_endpoints(&mut trails, self.config.tolerances.bridge_m);
        self.trails = trails;
        self.record(
            Stage::WeldEndpoints,
            Ok((welded, format!("welded {welded} endpoint pairs"))),
        )
    }

    /// Join dangling graph vertices. Run after edges are built.
    pub fn bridge_direct(&mut self) -> StageResult {
        let outcome = self.require_graph().map(|mut graph| {
            let inserted = bridge::bridge_direct(
                &mut graph,
                self.config.tolerances.bridge_m,
                self.config.discovery.bridge_require_same_name,
            );
            (graph, inserted)
        });
        let outcome = outcome.map(|(graph, inserted)| {
            self.graph = graph;
            (inserted, format!("inserted {inserted} direct connectors"))
        });
        self.record(Stage::BridgeDirect, outcome)
    }

    /// Attach dangling graph vertices to nearby edges. Run after edges are
    /// built.
    pub fn bridge_endpoint_to_edge(&mut self) -> StageResult {
        let outcome = self.require_graph().map(|mut graph| {
            let attached = bridge::bridge_endpoint_to_edge(&mut graph, self.config.tolerances.bridge_m);
            (graph, attached)
        });
        let outcome = outcome.map(|(graph, attached)| {
            self.graph = graph;
            (attached, format!("attached {attached} endpoints to edges"))
        });
        self.record(Stage::BridgeEndpointToEdge, outcome)
    }

    /// Replace the graph's nodes with canonical nodes built from the current
    /// segments and intersections. Existing edges are cleared.
    pub fn build_nodes(&mut self) -> StageResult {
        let nodes = build_nodes(
            &self.segments,
            &self.intersections,
            self.config.tolerances.node_merge_m,
        );
        let count = nodes.len();
        self.graph = RoutingGraph {
            nodes,
            edges: Vec::new(),
        };
        self.record(Stage::BuildNodes, Ok((count, format!("built {count} nodes"))))
    }

    pub fn build_edges(&mut self) -> StageResult {
        let outcome = if self.graph.nodes.is_empty() && !self.segments.is_empty() {
            Err(Error::EmptyGraph)
        } else {
            let edges = build_edges(&self.segments, &self.graph.nodes, self.config.tolerances.edge_m);
            let count = edges.len();
            self.graph.edges = edges;
            Ok((count, format!("built {count} edges from {} segments", self.segments.len())))
        };
        self.record(Stage::BuildEdges, outcome)
    }

    pub fn cleanup_orphans(&mut self) -> StageResult {
        let mut graph = self.graph.clone();
        let cleanup = cleanup_orphans(&mut graph);
        self.graph = graph;
        self.record(
            Stage::CleanupOrphans,
            Ok((
                cleanup.total(),
                format!(
                    "removed {} edges and {} nodes",
                    cleanup.edges_removed, cleanup.nodes_removed
                ),
            )),
        )
    }

    /// Run the route search for one configured pattern and keep the
    /// candidates.
    pub fn run_search(&mut self, pattern: &str) -> StageResult {
        let outcome = self.config.pattern(pattern).and_then(|pattern| {
            let request = SearchRequest::from_pattern(pattern, &self.config.discovery);
            find_routes(&self.graph, &request, &self.config.scoring)
        });
        let outcome = outcome.map(|candidates| {
            let count = candidates.len();
            self.candidates = candidates;
            (count, format!("found {count} candidate routes for {pattern}"))
        });
        self.record(Stage::RunSearch, outcome)
    }

    pub fn generate_recommendations(&mut self, sink: &mut dyn RecommendationSink) -> StageResult {
        let outcome = generate_recommendations(&self.graph, &self.region, self.config, sink)
            .map(|stored| (stored, format!("stored {stored} recommendations")));
        self.record(Stage::GenerateRecommendations, outcome)
    }

    /// Run the topology stages in order, applying the configured bridging
    /// strategy where it belongs. Later stages still run after a failure and
    /// work from whatever state was last committed.
    pub fn build_graph(&mut self, input: &[Trail]) -> Vec<StageResult> {
        let first = self.results.len();
        self.repair(input);
        match self.config.bridge_strategy {
            BridgeStrategy::Weld => {
                self.weld_endpoints();
            }
            BridgeStrategy::Midpoint => {
                self.bridge_midpoint();
            }
            _ => {}
        }
        self.detect_intersections();
        self.split();
        self.build_nodes();
        self.build_edges();
        match self.config.bridge_strategy {
            BridgeStrategy::Direct => {
                self.bridge_direct();
            }
            BridgeStrategy::EndpointToEdge => {
                self.bridge_endpoint_to_edge();
            }
            _ => {}
        }
        self.cleanup_orphans();
        self.results[first..].to_vec()
    }

    fn require_graph(&self) -> Result<RoutingGraph> {
        if self.graph.nodes.is_empty() {
            return Err(Error::EmptyGraph);
        }
        Ok(self.graph.clone())
    }

    /// Nodes of the committed graph that sit at trail intersections.
    pub fn junctions(&self) -> impl Iterator<Item = &RoutingNode> {
        self.graph
            .nodes
            .values()
            .filter(|node| node.node_type == NodeType::Intersection)
    }
}

/// Trails of `region` from `input`.
///
/// An empty region name, or one matching no trail, is an invalid filter;
/// close region names are offered as suggestions.
pub fn select_region(input: &[Trail], region: &str) -> Result<Vec<Trail>> {
    let selected: Vec<Trail> = input
        .iter()
        .filter(|trail| !region.is_empty() && trail.region == region)
        .cloned()
        .collect();
    if selected.is_empty() {
        let known: BTreeSet<&str> = input.iter().map(|trail| trail.region.as_str()).collect();
        return Err(Error::InvalidRegionFilter {
            region: region.to_string(),
            suggestions: suggest_regions(region, known),
        });
    }
    Ok(selected)
}

fn suggest_regions<'r>(region: &str, known: impl IntoIterator<Item = &'r str>) -> Vec<String> {
    let needle = region.to_lowercase();
    let mut scored: Vec<(f64, &str)> = known
        .into_iter()
        .filter(|name| !name.is_empty())
        .map(|name| (strsim::jaro_winkler(&needle, &name.to_lowercase()), name))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Everything one region run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub region: String,
    pub stages: Vec<StageResult>,
    pub repair: RepairReport,
    pub node_count: usize,
    pub edge_count: usize,
    pub recommendations: Vec<RouteRecommendation>,
}

impl RegionReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(|stage| stage.success)
    }
}

/// Process one region end to end: build its graph and generate
/// recommendations for every configured pattern.
pub fn process_region(input: &[Trail], region: &str, config: &PipelineConfig) -> (RegionReport, RoutingGraph) {
    let mut workspace = RegionWorkspace::new(region, config);
    let mut sink = MemorySink::new();
    workspace.build_graph(input);
    workspace.generate_recommendations(&mut sink);

    let report = RegionReport {
        region: region.to_string(),
        stages: workspace.results.clone(),
        repair: workspace.repair_report,
        node_count: workspace.graph.node_count(),
        edge_count: workspace.graph.edge_count(),
        recommendations: sink.into_routes(),
    };
    if !report.succeeded() {
        warn!(region, "region finished with failed stages");
    }
    (report, workspace.graph)
}

/// Process independent regions in parallel. Each region owns its working
/// set; reports come back in the order of `regions`.
pub fn process_regions(input: &[Trail], regions: &[String], config: &PipelineConfig) -> Vec<RegionReport> {
    let reports: Vec<RegionReport> = regions
        .par_iter()
        .map(|region| process_region(input, region, config).0)
        .collect();
    info!(
        regions = reports.len(),
        failed = reports.iter().filter(|r| !r.succeeded()).count(),
        "processed regions"
    );
    reports
}

/// Distinct region names present in `input`, sorted.
pub fn regions_of(input: &[Trail]) -> Vec<String> {
    let names: BTreeMap<&str, ()> = input
        .iter()
        .filter(|trail| !trail.region.is_empty())
        .map(|trail| (trail.region.as_str(), ()))
        .collect();
    names.into_keys().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TrailPoint;

    fn trail(id: &str, region: &str, coords: &[(f64, f64, f64)]) -> Trail {
        Trail::new(
            id,
            format!("{id} Trail"),
            region,
            coords
                .iter()
                .map(|(lng, lat, z)| TrailPoint::new(*lng, *lat, *z))
                .collect(),
        )
    }

    fn crossing() -> Vec<Trail> {
        vec![
            trail("a", "boulder", &[(-105.271, 40.0, 1800.0), (-105.269, 40.0, 1810.0)]),
            trail("b", "boulder", &[(-105.27, 39.999, 1790.0), (-105.27, 40.001, 1820.0)]),
            trail("c", "golden", &[(-105.22, 39.75, 1800.0), (-105.22, 39.76, 1900.0)]),
        ]
    }

    #[test]
    fn build_graph_runs_every_topology_stage() {
        let config = PipelineConfig::default();
        let mut workspace = RegionWorkspace::new("boulder", &config);
        let results = workspace.build_graph(&crossing());

        let stages: Vec<Stage> = results.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Repair,
                Stage::DetectIntersections,
                Stage::Split,
                Stage::BuildNodes,
                Stage::BuildEdges,
                Stage::BridgeDirect,
                Stage::CleanupOrphans,
            ]
        );
        assert!(results.iter().all(|r| r.success));
        assert_eq!(workspace.trails.len(), 2);
        assert_eq!(workspace.graph.node_count(), 5);
        assert_eq!(workspace.graph.edge_count(), 4);
        assert_eq!(workspace.junctions().count(), 1);
    }

    #[test]
    fn unknown_region_fails_repair_with_suggestion() {
        let config = PipelineConfig::default();
        let mut workspace = RegionWorkspace::new("bouldr", &config);
        let result = workspace.repair(&crossing());
        assert!(!result.success);
        assert_eq!(result.count, 0);
        assert!(result.message.contains("Did you mean 'boulder'?"), "{}", result.message);
        assert!(workspace.trails.is_empty());
    }

    #[test]
    fn batch_limit_is_enforced() {
        let mut config = PipelineConfig::default();
        config.limits.max_trails_per_batch = 1;
        let mut workspace = RegionWorkspace::new("boulder", &config);
        let result = workspace.repair(&crossing());
        assert!(!result.success);
        assert!(result.message.contains("max_trails_per_batch"));
    }

    #[test]
    fn stages_on_empty_graph_report_failure() {
        let config = PipelineConfig::default();
        let mut workspace = RegionWorkspace::new("boulder", &config);
        assert!(!workspace.bridge_direct().success);
        assert!(!workspace.run_search("short-loop").success);
        let result = workspace.run_search("no-such-pattern");
        assert!(result.message.contains("no-such-pattern"));
        assert_eq!(workspace.results.len(), 3);
    }

    #[test]
    fn rerunning_stages_replaces_output() {
        let config = PipelineConfig::default();
        let mut workspace = RegionWorkspace::new("boulder", &config);
        workspace.build_graph(&crossing());
        let nodes = workspace.graph.node_count();
        workspace.build_nodes();
        workspace.build_edges();
        workspace.cleanup_orphans();
        assert_eq!(workspace.graph.node_count(), nodes);
        assert_eq!(workspace.detect_intersections().count, 1);
        assert_eq!(workspace.detect_intersections().count, 1);
    }

    #[test]
    fn regions_run_independently() {
        let config = PipelineConfig::default();
        let mut regions = regions_of(&crossing());
        assert_eq!(regions, vec!["boulder".to_string(), "golden".to_string()]);
        regions.push("nowhere".to_string());

        let reports = process_regions(&crossing(), &regions, &config);
        assert_eq!(reports.len(), 3);
        assert!(reports[0].succeeded());
        assert_eq!(reports[0].node_count, 5);
        assert_eq!(reports[1].edge_count, 1);
        assert!(!reports[2].succeeded());
        assert_eq!(reports[2].node_count, 0);
    }

    #[test]
    fn suggestions_rank_closest_first() {
        let suggestions = suggest_regions("bolder", ["boulder", "golden", "denver"]);
        assert_eq!(suggestions.first().map(String::as_str), Some("boulder"));
        assert!(suggest_regions("zzz", ["boulder"]).is_empty());
    }
}
