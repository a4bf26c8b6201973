//! Common test utilities and fixture helpers.
//!
//! Integration tests share the GeoJSON fixture under `docs/fixtures` and a
//! few synthetic trail builders placed around Boulder, CO.

use std::path::PathBuf;

use trailgraph_lib::{load_trails, PipelineConfig, RoutePattern, RouteShape, Trail, TrailPoint};

/// Path to fixtures directory used by tests.
#[allow(dead_code)]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures")
}

/// Every trail of `docs/fixtures/trails.geojson`.
///
/// The boulder region holds four usable trails (Mesa Trail crossing Bluebell
/// Road, Fern Canyon continuing from Mesa Trail's north end, and Bear Peak
/// Spur starting about 5.5 m past Fern Canyon's east end) plus a reversed
/// duplicate and a single-point trail. The golden region holds one simple
/// crossing.
#[allow(dead_code)]
pub fn fixture_trails() -> Vec<Trail> {
    load_trails(&fixtures_dir().join("trails.geojson")).expect("load fixture trails")
}

/// Pattern matched by the Mesa Trail to Bear Peak Spur traverse.
#[allow(dead_code)]
pub fn summit_pattern() -> RoutePattern {
    RoutePattern::new("summit-traverse", 5.0, 550.0, RouteShape::PointToPoint, 20.0)
}

/// Default configuration whose pattern table is just `patterns`.
#[allow(dead_code)]
pub fn config_with(patterns: Vec<RoutePattern>) -> PipelineConfig {
    PipelineConfig {
        patterns,
        ..PipelineConfig::default()
    }
}

/// Build a trail from `(lng, lat, elevation)` triples.
#[allow(dead_code)]
pub fn trail(id: &str, name: &str, region: &str, coords: &[(f64, f64, f64)]) -> Trail {
    Trail::new(
        id,
        name,
        region,
        coords
            .iter()
            .map(|(lng, lat, z)| TrailPoint::new(*lng, *lat, *z))
            .collect(),
    )
}

/// `rows` east-west trails crossed by `cols` north-south trails, spaced
/// `spacing` degrees apart. Elevation climbs to the north-east.
#[allow(dead_code)]
pub fn grid_trails(region: &str, rows: usize, cols: usize, spacing: f64) -> Vec<Trail> {
    let origin_lng = -105.30;
    let origin_lat = 39.95;
    let width = spacing * (cols + 1) as f64;
    let height = spacing * (rows + 1) as f64;
    let mut trails = Vec::with_capacity(rows + cols);

    for row in 0..rows {
        let lat = origin_lat + spacing * (row + 1) as f64;
        let base = 1700.0 + 40.0 * row as f64;
        trails.push(trail(
            &format!("row-{row}"),
            &format!("Row {row} Trail"),
            region,
            &[(origin_lng, lat, base), (origin_lng + width, lat, base + 80.0)],
        ));
    }
    for col in 0..cols {
        let lng = origin_lng + spacing * (col + 1) as f64;
        let base = 1700.0 + 30.0 * col as f64;
        trails.push(trail(
            &format!("col-{col}"),
            &format!("Col {col} Trail"),
            region,
            &[(lng, origin_lat, base), (lng, origin_lat + height, base + 120.0)],
        ));
    }
    trails
}
