//! Immutable pipeline configuration.
//!
//! A single [`PipelineConfig`] value is built once (usually deserialized from a
//! JSON file by the caller) and passed by reference into every stage. Every
//! section carries `#[serde(default)]` so partial files only override what they
//! name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeStrategy;
use crate::error::{Error, Result};

/// Shape of a route, either requested by a pattern or classified from a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteShape {
    Loop,
    OutAndBack,
    PointToPoint,
}

impl RouteShape {
    /// Human label used when composing route names.
    pub fn label(self) -> &'static str {
        match self {
            RouteShape::Loop => "Loop",
            RouteShape::OutAndBack => "Out-and-Back",
            RouteShape::PointToPoint => "Point-to-Point",
        }
    }

    /// Whether a route classified as `actual` satisfies a request for `self`.
    ///
    /// Loop and out-and-back requests fall back to point-to-point results.
    pub fn accepts(self, actual: RouteShape) -> bool {
        match self {
            RouteShape::Loop => matches!(actual, RouteShape::Loop | RouteShape::PointToPoint),
            RouteShape::OutAndBack => {
                matches!(actual, RouteShape::OutAndBack | RouteShape::PointToPoint)
            }
            RouteShape::PointToPoint => actual == RouteShape::PointToPoint,
        }
    }
}

impl fmt::Display for RouteShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RouteShape::Loop => "loop",
            RouteShape::OutAndBack => "out-and-back",
            RouteShape::PointToPoint => "point-to-point",
        };
        f.write_str(value)
    }
}

/// A target bin driving batch recommendation generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePattern {
    pub name: String,
    pub target_distance_km: f64,
    pub target_elevation_gain_m: f64,
    pub shape: RouteShape,
    pub tolerance_percent: f64,
}

impl RoutePattern {
    pub fn new(
        name: impl Into<String>,
        target_distance_km: f64,
        target_elevation_gain_m: f64,
        shape: RouteShape,
        tolerance_percent: f64,
    ) -> Self {
        Self {
            name: name.into(),
            target_distance_km,
            target_elevation_gain_m,
            shape,
            tolerance_percent,
        }
    }
}

/// Spatial tolerances. Distances are metres unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub intersection_m: f64,
    pub edge_m: f64,
    pub simplify_m: f64,
    pub node_merge_m: f64,
    pub bridge_m: f64,
    pub snap_grid_degrees: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            intersection_m: 1.0,
            edge_m: 2.0,
            simplify_m: 0.5,
            node_merge_m: 1.0,
            bridge_m: 20.0,
            snap_grid_degrees: 0.00001,
        }
    }
}

/// Batch and size limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_trails_per_batch: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_trails_per_batch: 10_000,
        }
    }
}

/// Thresholds applied while repairing raw trails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    pub min_trail_length_m: f64,
    pub max_trail_length_m: f64,
    pub min_elevation_m: f64,
    pub max_elevation_m: f64,
    pub min_coordinate_count: usize,
    pub max_coordinate_count: usize,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_trail_length_m: 1.0,
            max_trail_length_m: 100_000.0,
            min_elevation_m: -500.0,
            max_elevation_m: 9_000.0,
            min_coordinate_count: 2,
            max_coordinate_count: 100_000,
        }
    }
}

/// Which nodes seed the recursive search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartNodes {
    #[default]
    All,
    Intersections,
}

/// Limits on route discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryLimits {
    pub max_routes_per_pattern: usize,
    pub min_route_score: f64,
    pub min_distance_km: f64,
    pub max_distance_km: f64,
    pub max_elevation_gain_m: f64,
    pub max_depth: usize,
    pub start_nodes: StartNodes,
    pub bridge_require_same_name: bool,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_routes_per_pattern: 10,
            min_route_score: 0.3,
            min_distance_km: 0.0,
            max_distance_km: 100.0,
            max_elevation_gain_m: 5_000.0,
            max_depth: 8,
            start_nodes: StartNodes::All,
            bridge_require_same_name: false,
        }
    }
}

/// Weights of the similarity score and of the quality blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub distance_weight: f64,
    pub elevation_weight: f64,
    pub quality_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance_weight: 0.6,
            elevation_weight: 0.4,
            quality_weight: 0.0,
        }
    }
}

/// Weights of the steepness/distance cost function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub steepness_weight: f64,
    pub distance_weight: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            steepness_weight: 2.0,
            distance_weight: 0.5,
        }
    }
}

/// Complete configuration threaded through every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tolerances: Tolerances,
    pub limits: BatchLimits,
    pub validation: ValidationThresholds,
    pub discovery: DiscoveryLimits,
    pub scoring: ScoringWeights,
    pub cost: CostWeights,
    /// Gap-bridging strategy applied by the full pipeline run.
    pub bridge_strategy: BridgeStrategy,
    pub patterns: Vec<RoutePattern>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            limits: BatchLimits::default(),
            validation: ValidationThresholds::default(),
            discovery: DiscoveryLimits::default(),
            scoring: ScoringWeights::default(),
            cost: CostWeights::default(),
            bridge_strategy: BridgeStrategy::default(),
            patterns: default_patterns(),
        }
    }
}

impl PipelineConfig {
    /// Look up a configured pattern by name.
    pub fn pattern(&self, name: &str) -> Result<&RoutePattern> {
        self.patterns
            .iter()
            .find(|pattern| pattern.name == name)
            .ok_or_else(|| Error::UnknownPattern {
                name: name.to_string(),
            })
    }

    /// Reject values the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.tolerances;
        for (name, value) in [
            ("intersection_m", t.intersection_m),
            ("edge_m", t.edge_m),
            ("simplify_m", t.simplify_m),
            ("node_merge_m", t.node_merge_m),
            ("bridge_m", t.bridge_m),
            ("snap_grid_degrees", t.snap_grid_degrees),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(format!(
                    "tolerance {name} must be a non-negative number, got {value}"
                )));
            }
        }

        let v = &self.validation;
        if v.min_trail_length_m > v.max_trail_length_m {
            return Err(Error::config("min_trail_length_m exceeds max_trail_length_m"));
        }
        if v.min_elevation_m > v.max_elevation_m {
            return Err(Error::config("min_elevation_m exceeds max_elevation_m"));
        }
        if v.min_coordinate_count > v.max_coordinate_count {
            return Err(Error::config(
                "min_coordinate_count exceeds max_coordinate_count",
            ));
        }

        if self.discovery.max_depth == 0 {
            return Err(Error::config("max_depth must be at least 1"));
        }
        if self.limits.max_trails_per_batch == 0 {
            return Err(Error::config("max_trails_per_batch must be at least 1"));
        }

        let s = &self.scoring;
        let c = &self.cost;
        if [
            s.distance_weight,
            s.elevation_weight,
            s.quality_weight,
            c.steepness_weight,
            c.distance_weight,
        ]
        .iter()
        .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(Error::config("weights must be non-negative numbers"));
        }
        if s.quality_weight > 1.0 {
            return Err(Error::config("quality_weight must not exceed 1.0"));
        }

        for pattern in &self.patterns {
            if !(pattern.tolerance_percent > 0.0 && pattern.tolerance_percent <= 100.0) {
                return Err(Error::config(format!(
                    "pattern {} tolerance_percent must be in (0, 100]",
                    pattern.name
                )));
            }
            if pattern.target_distance_km < 0.0 || pattern.target_elevation_gain_m < 0.0 {
                return Err(Error::config(format!(
                    "pattern {} targets must be non-negative",
                    pattern.name
                )));
            }
        }

        Ok(())
    }
}

/// Pattern table used when the configuration does not list any.
pub fn default_patterns() -> Vec<RoutePattern> {
    vec![
        RoutePattern::new("short-loop", 5.0, 200.0, RouteShape::Loop, 20.0),
        RoutePattern::new("medium-loop", 10.0, 400.0, RouteShape::Loop, 20.0),
        RoutePattern::new("long-loop", 15.0, 600.0, RouteShape::Loop, 25.0),
        RoutePattern::new("short-out-and-back", 4.0, 150.0, RouteShape::OutAndBack, 20.0),
        RoutePattern::new("medium-out-and-back", 8.0, 300.0, RouteShape::OutAndBack, 20.0),
        RoutePattern::new("short-point-to-point", 3.0, 100.0, RouteShape::PointToPoint, 25.0),
        RoutePattern::new("medium-point-to-point", 7.0, 350.0, RouteShape::PointToPoint, 25.0),
    ]
}
