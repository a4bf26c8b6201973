mod common;

use common::{config_with, fixture_trails, summit_pattern};
use trailgraph_lib::config::RoutePattern;
use trailgraph_lib::pipeline::regions_of;
use trailgraph_lib::scoring::Difficulty;
use trailgraph_lib::{
    compare_cost_modes, process_region, process_regions, CostMode, MemorySink, RegionWorkspace,
    RouteShape, Stage,
};

#[test]
fn fixture_regions_are_discovered() {
    assert_eq!(regions_of(&fixture_trails()), vec!["boulder", "golden"]);
}

#[test]
fn summit_pattern_yields_named_recommendations() {
    let config = config_with(vec![summit_pattern()]);
    let (report, graph) = process_region(&fixture_trails(), "boulder", &config);

    assert!(report.succeeded(), "{:?}", report.stages);
    assert_eq!(report.node_count, graph.node_count());
    assert_eq!(report.recommendations.len(), 2);

    let best = &report.recommendations[0];
    assert_eq!(best.region, "boulder");
    assert_eq!(best.criteria.name, "summit-traverse");
    assert_eq!(best.name, "Mesa Trail/...Bear Peak Spur Route Point-to-Point");
    assert!(best.score >= 99);
    assert!(best.score <= 100);
    assert_eq!(best.shape, RouteShape::PointToPoint);
    assert_eq!(best.node_ids.len(), best.edge_ids.len() + 1);

    let first = best.path.first().expect("path has points");
    let last = best.path.last().expect("path has points");
    assert!((first[1] - 39.98).abs() < 1e-6);
    assert!((last[1] - 40.01).abs() < 1e-6);
    assert!((last[2] - 2300.0).abs() < 1e-6);

    assert_eq!(best.metrics.difficulty, Difficulty::Hard);
    assert!((best.metrics.elevation_min - 1750.0).abs() < 1e-6);
    assert!((best.metrics.elevation_max - 2300.0).abs() < 1e-6);
    assert!(best.metrics.length_3d_km > best.recommended_distance_km);

    let second = &report.recommendations[1];
    assert!(second.score <= best.score);
    assert!(second.name.starts_with("Bluebell Road/..."));
}

#[test]
fn regeneration_replaces_previous_routes() {
    let config = config_with(vec![summit_pattern()]);
    let mut workspace = RegionWorkspace::new("boulder", &config);
    workspace.build_graph(&fixture_trails());

    let mut sink = MemorySink::new();
    let first = workspace.generate_recommendations(&mut sink);
    let second = workspace.generate_recommendations(&mut sink);
    assert!(first.success && second.success);
    assert_eq!(first.count, 2);
    assert_eq!(second.count, 2);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.pattern("boulder", "summit-traverse").len(), 2);
}

#[test]
fn unreachable_pattern_stores_nothing() {
    let config = config_with(vec![RoutePattern::new(
        "marathon",
        42.0,
        2000.0,
        RouteShape::PointToPoint,
        10.0,
    )]);
    let (report, _) = process_region(&fixture_trails(), "boulder", &config);
    assert!(report.succeeded());
    assert!(report.recommendations.is_empty());
}

#[test]
fn regions_run_independently() {
    let config = config_with(vec![summit_pattern()]);
    let regions = vec!["golden".to_string(), "nowhere".to_string(), "boulder".to_string()];
    let reports = process_regions(&fixture_trails(), &regions, &config);

    let names: Vec<&str> = reports.iter().map(|r| r.region.as_str()).collect();
    assert_eq!(names, vec!["golden", "nowhere", "boulder"]);

    assert!(reports[0].succeeded());
    assert_eq!(reports[0].node_count, 5);
    assert_eq!(reports[0].edge_count, 4);
    assert!(reports[0].recommendations.is_empty());

    assert!(!reports[1].succeeded());
    let repair = &reports[1].stages[0];
    assert_eq!(repair.stage, Stage::Repair);
    assert!(!repair.success);
    assert!(repair.message.contains("nowhere"));

    assert!(reports[2].succeeded());
    assert_eq!(reports[2].recommendations.len(), 2);
}

#[test]
fn cost_modes_rank_the_same_candidates_differently() {
    let config = config_with(vec![summit_pattern()]);
    let mut workspace = RegionWorkspace::new("boulder", &config);
    workspace.build_graph(&fixture_trails());
    let search = workspace.run_search("summit-traverse");
    assert!(search.success);
    assert_eq!(workspace.candidates.len(), 2);

    let stats = compare_cost_modes(&workspace.candidates, &config.cost);
    assert_eq!(stats.len(), CostMode::ALL.len());
    let standard = &stats[0];
    let most = &stats[1];
    assert_eq!(standard.mode, CostMode::Standard);
    assert_eq!(most.mode, CostMode::MostCost);
    assert_eq!(standard.count, 2);
    assert!((standard.avg_cost - most.avg_cost).abs() < 1e-9);

    let cheapest = standard.top_cost.expect("standard ranks a route");
    let dearest = most.top_cost.expect("mostCost ranks a route");
    assert!(cheapest < dearest);
}

#[test]
fn geojson_features_carry_route_properties() {
    let config = config_with(vec![summit_pattern()]);
    let (report, _) = process_region(&fixture_trails(), "boulder", &config);
    let feature = report.recommendations[0].to_geojson_feature();

    assert_eq!(
        feature.property("route_name").and_then(|v| v.as_str()),
        Some("Mesa Trail/...Bear Peak Spur Route Point-to-Point")
    );
    assert_eq!(
        feature.property("route_shape").and_then(|v| v.as_str()),
        Some("point-to-point")
    );
    let text = serde_json::to_string(&feature).expect("serialize feature");
    assert!(text.contains("\"LineString\""));
}
