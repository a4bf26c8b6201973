//! Output formatting for command results.
//!
//! Text renderers write to any [`Write`] so they can be tested against a
//! buffer; JSON and GeoJSON go through serde.

use std::io::{self, Write};

use clap::ValueEnum;
use geojson::FeatureCollection;
use trailgraph_lib::{ModeStats, RegionReport, RouteRecommendation, StageResult};

/// Format of what a command prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    /// GeoJSON `FeatureCollection` of recommended routes.
    Geojson,
}

/// Per-region outcome of the `build` command.
#[derive(Debug, serde::Serialize)]
pub struct BuildSummary {
    pub region: String,
    pub stages: Vec<StageResult>,
    pub node_count: usize,
    pub edge_count: usize,
    pub junction_count: usize,
}

/// Per-region outcome of the `compare` command.
#[derive(Debug, serde::Serialize)]
pub struct CompareSummary {
    pub region: String,
    pub pattern: String,
    pub candidates: usize,
    pub modes: Vec<ModeStats>,
}

pub fn write_stages<W: Write>(out: &mut W, stages: &[StageResult]) -> io::Result<()> {
    for stage in stages {
        let mark = if stage.success { "ok" } else { "FAILED" };
        writeln!(
            out,
            "  {:<26} {:>6} {:>6}  {}",
            stage.stage.to_string(),
            mark,
            stage.count,
            stage.message
        )?;
    }
    Ok(())
}

pub fn write_build_text<W: Write>(out: &mut W, summaries: &[BuildSummary]) -> io::Result<()> {
    for summary in summaries {
        writeln!(out, "Region {}:", summary.region)?;
        write_stages(out, &summary.stages)?;
        writeln!(
            out,
            "  graph: {} nodes ({} junctions), {} edges",
            summary.node_count, summary.junction_count, summary.edge_count
        )?;
    }
    Ok(())
}

pub fn write_recommendations_text<W: Write>(
    out: &mut W,
    reports: &[RegionReport],
) -> io::Result<()> {
    for report in reports {
        writeln!(
            out,
            "Region {}: {} recommendations ({} nodes, {} edges)",
            report.region,
            report.recommendations.len(),
            report.node_count,
            report.edge_count
        )?;
        if !report.succeeded() {
            let failed = report.stages.iter().filter(|stage| !stage.success);
            for stage in failed {
                writeln!(out, "  ! {} failed: {}", stage.stage, stage.message)?;
            }
        }
        for route in &report.recommendations {
            write_route_line(out, route)?;
        }
    }
    Ok(())
}

fn write_route_line<W: Write>(out: &mut W, route: &RouteRecommendation) -> io::Result<()> {
    writeln!(
        out,
        "  [{:>3}] {} ({}): {:.2} km, {:.0} m gain, {} trails, ~{:.1} h",
        route.score,
        route.name,
        route.criteria.name,
        route.recommended_distance_km,
        route.recommended_elevation_gain,
        route.trail_count,
        route.metrics.estimated_hours
    )
}

pub fn write_compare_text<W: Write>(out: &mut W, summaries: &[CompareSummary]) -> io::Result<()> {
    for summary in summaries {
        writeln!(
            out,
            "Region {} / {}: {} candidates",
            summary.region, summary.pattern, summary.candidates
        )?;
        writeln!(
            out,
            "  {:<17} {:>9} {:>9} {:>10} {:>9} {:>9}",
            "mode", "avg km", "avg gain", "avg m/km", "avg cost", "top cost"
        )?;
        for stats in &summary.modes {
            let top = stats
                .top_cost
                .map(|cost| format!("{cost:.1}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "  {:<17} {:>9.2} {:>9.0} {:>10.1} {:>9.1} {:>9}",
                stats.mode.to_string(),
                stats.avg_distance_km,
                stats.avg_elevation_gain,
                stats.avg_steepness,
                stats.avg_cost,
                top
            )?;
        }
    }
    Ok(())
}

/// Every recommendation of `reports` as one feature collection.
pub fn feature_collection(reports: &[RegionReport]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: reports
            .iter()
            .flat_map(|report| report.recommendations.iter())
            .map(RouteRecommendation::to_geojson_feature)
            .collect(),
        foreign_members: None,
    }
}

pub fn write_json<W: Write, T: serde::Serialize + ?Sized>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}
