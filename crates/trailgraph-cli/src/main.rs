mod logging;
mod output;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use trailgraph_lib::pipeline::regions_of;
use trailgraph_lib::{
    compare_cost_modes, load_trails, process_regions, PipelineConfig, RegionWorkspace, Trail,
};

use crate::logging::{init_logging, LogFormat};
use crate::output::{BuildSummary, CompareSummary, OutputFormat};

#[derive(Parser, Debug)]
#[command(author, version, about = "Trail graph builder and route recommender")]
struct Cli {
    /// GeoJSON file with trail LineString or MultiLineString features.
    /// Required by every command except `patterns`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// JSON pipeline configuration; omitted sections keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Region to process. Repeat for several; defaults to every region in the
    /// input.
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Output format on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Layout of log lines on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the routing graph of each region and report every stage.
    Build,
    /// Generate route recommendations for the configured patterns.
    Recommend {
        /// Only run this pattern. Repeat for several.
        #[arg(long = "pattern")]
        patterns: Vec<String>,
    },
    /// Rank one pattern's candidates under every cost mode.
    Compare {
        /// Configured pattern whose search results are compared.
        #[arg(long)]
        pattern: String,
    },
    /// List the configured route patterns.
    Patterns,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, "info");

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Patterns => handle_patterns(&config, cli.format),
        Command::Build => {
            let (trails, regions) = load_input(cli.input.as_deref(), &cli.regions)?;
            handle_build(&trails, &regions, &config, cli.format)
        }
        Command::Recommend { patterns } => {
            let (trails, regions) = load_input(cli.input.as_deref(), &cli.regions)?;
            let config = restrict_patterns(config, &patterns)?;
            handle_recommend(&trails, &regions, &config, cli.format)
        }
        Command::Compare { pattern } => {
            let (trails, regions) = load_input(cli.input.as_deref(), &cli.regions)?;
            handle_compare(&trails, &regions, &config, &pattern, cli.format)
        }
    }
}

/// Load the trails and resolve which regions to run.
fn load_input(path: Option<&Path>, requested: &[String]) -> Result<(Vec<Trail>, Vec<String>)> {
    let Some(path) = path else {
        bail!("--input <GEOJSON> is required for this command");
    };
    let trails = load_trails(path)
        .with_context(|| format!("failed to load trails from {}", path.display()))?;
    let regions = if requested.is_empty() {
        regions_of(&trails)
    } else {
        requested.to_vec()
    };
    if regions.is_empty() {
        bail!("no region to process: the input has no region names and none were given");
    }
    info!(trails = trails.len(), regions = regions.len(), "loaded input");
    Ok((trails, regions))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            serde_json::from_reader::<_, PipelineConfig>(BufReader::new(file))
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    config.validate().context("invalid pipeline configuration")?;
    Ok(config)
}

fn restrict_patterns(mut config: PipelineConfig, names: &[String]) -> Result<PipelineConfig> {
    if names.is_empty() {
        return Ok(config);
    }
    for name in names {
        config.pattern(name)?;
    }
    config.patterns.retain(|pattern| names.contains(&pattern.name));
    Ok(config)
}

fn handle_patterns(config: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => output::write_json(&mut stdout, &config.patterns)?,
        OutputFormat::Text => {
            for pattern in &config.patterns {
                writeln!(
                    stdout,
                    "{:<24} {:>6.1} km {:>6.0} m  {:<14} ±{}%",
                    pattern.name,
                    pattern.target_distance_km,
                    pattern.target_elevation_gain_m,
                    pattern.shape.to_string(),
                    pattern.tolerance_percent
                )?;
            }
        }
        OutputFormat::Geojson => bail!("--format geojson is only supported by `recommend`"),
    }
    Ok(())
}

fn handle_build(
    trails: &[Trail],
    regions: &[String],
    config: &PipelineConfig,
    format: OutputFormat,
) -> Result<()> {
    let summaries: Vec<BuildSummary> = regions
        .iter()
        .map(|region| {
            let mut workspace = RegionWorkspace::new(region.as_str(), config);
            let stages = workspace.build_graph(trails);
            BuildSummary {
                region: region.clone(),
                stages,
                node_count: workspace.graph.node_count(),
                edge_count: workspace.graph.edge_count(),
                junction_count: workspace.junctions().count(),
            }
        })
        .collect();

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => output::write_build_text(&mut stdout, &summaries)?,
        OutputFormat::Json => output::write_json(&mut stdout, &summaries)?,
        OutputFormat::Geojson => bail!("--format geojson is only supported by `recommend`"),
    }

    let failed = summaries
        .iter()
        .filter(|summary| summary.stages.iter().any(|stage| !stage.success))
        .count();
    if failed > 0 {
        bail!("{failed} of {} regions had failed stages", summaries.len());
    }
    Ok(())
}

fn handle_recommend(
    trails: &[Trail],
    regions: &[String],
    config: &PipelineConfig,
    format: OutputFormat,
) -> Result<()> {
    let reports = process_regions(trails, regions, config);

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => output::write_recommendations_text(&mut stdout, &reports)?,
        OutputFormat::Json => output::write_json(&mut stdout, &reports)?,
        OutputFormat::Geojson => {
            output::write_json(&mut stdout, &output::feature_collection(&reports))?
        }
    }

    let failed = reports.iter().filter(|report| !report.succeeded()).count();
    if failed > 0 {
        bail!("{failed} of {} regions had failed stages", reports.len());
    }
    Ok(())
}

fn handle_compare(
    trails: &[Trail],
    regions: &[String],
    config: &PipelineConfig,
    pattern: &str,
    format: OutputFormat,
) -> Result<()> {
    config.pattern(pattern)?;

    let mut summaries = Vec::with_capacity(regions.len());
    for region in regions {
        let mut workspace = RegionWorkspace::new(region.as_str(), config);
        workspace.build_graph(trails);
        let search = workspace.run_search(pattern);
        if !search.success {
            bail!("search in region {region} failed: {}", search.message);
        }
        summaries.push(CompareSummary {
            region: region.clone(),
            pattern: pattern.to_string(),
            candidates: workspace.candidates.len(),
            modes: compare_cost_modes(&workspace.candidates, &config.cost),
        });
    }

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => output::write_compare_text(&mut stdout, &summaries)?,
        OutputFormat::Json => output::write_json(&mut stdout, &summaries)?,
        OutputFormat::Geojson => bail!("--format geojson is only supported by `recommend`"),
    }
    Ok(())
}
