//! Route scoring: similarity to a target, shape classification, candidate
//! selection, cost-mode ranking and per-route derived metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{CostWeights, RouteShape, ScoringWeights};
use crate::error::{Error, Result};
use crate::geometry::polyline_length_3d_m;
use crate::graph::{NodeId, RoutingGraph};
use crate::search::CandidateRoute;
use crate::trail::ElevationSummary;

/// Average hiking speed on easy terrain, km/h.
pub const BASE_SPEED_KMH: f64 = 4.0;

/// Weighted closeness of actual totals to the targets, in `[0, 1]`.
///
/// Each dimension scores `clamp(1 - |actual - target| / target, 0, 1)`; a
/// target of zero forces that dimension to 0.
pub fn similarity(
    distance_km: f64,
    elevation_gain: f64,
    target_distance_km: f64,
    target_elevation_gain: f64,
    weights: &ScoringWeights,
) -> f64 {
    let distance = closeness(distance_km, target_distance_km);
    let elevation = closeness(elevation_gain, target_elevation_gain);
    (weights.distance_weight * distance + weights.elevation_weight * elevation).clamp(0.0, 1.0)
}

fn closeness(actual: f64, target: f64) -> f64 {
    if target <= 0.0 || !target.is_finite() {
        return 0.0;
    }
    (1.0 - (actual - target).abs() / target).clamp(0.0, 1.0)
}

/// Classify a node path.
///
/// `loop` when it starts and ends on the same node, `out-and-back` when it has
/// exactly two nodes, `point-to-point` otherwise. Because the search never
/// revisits a node, a loop can only come from a single-node path.
pub fn classify_shape(path: &[NodeId]) -> RouteShape {
    match (path.first(), path.last()) {
        (Some(first), Some(last)) if first == last => RouteShape::Loop,
        _ if path.len() == 2 => RouteShape::OutAndBack,
        _ => RouteShape::PointToPoint,
    }
}

/// Drop candidates scoring below `min_score`, order the rest by score
/// (descending, shorter first on ties) and keep at most `max_routes`.
pub fn select_candidates(
    mut candidates: Vec<CandidateRoute>,
    min_score: f64,
    max_routes: usize,
) -> Vec<CandidateRoute> {
    candidates.retain(|candidate| candidate.similarity_score >= min_score);
    candidates.sort_by(|a, b| {
        b.similarity_score
            .total_cmp(&a.similarity_score)
            .then(a.distance_km.total_cmp(&b.distance_km))
    });
    candidates.truncate(max_routes);
    candidates
}

/// Named weighting and ordering profile for cost ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CostMode {
    Standard,
    MostCost,
    ElevationFocused,
    DistanceFocused,
    Balanced,
}

impl CostMode {
    pub const ALL: [CostMode; 5] = [
        CostMode::Standard,
        CostMode::MostCost,
        CostMode::ElevationFocused,
        CostMode::DistanceFocused,
        CostMode::Balanced,
    ];

    /// Weights this mode applies. `standard` and `mostCost` use the
    /// configured weights.
    pub fn weights(self, configured: &CostWeights) -> CostWeights {
        match self {
            CostMode::Standard | CostMode::MostCost => *configured,
            CostMode::ElevationFocused => CostWeights {
                steepness_weight: 3.0,
                distance_weight: 0.2,
            },
            CostMode::DistanceFocused => CostWeights {
                steepness_weight: 0.5,
                distance_weight: 2.0,
            },
            CostMode::Balanced => CostWeights {
                steepness_weight: 1.0,
                distance_weight: 1.0,
            },
        }
    }

    /// Whether higher cost ranks first.
    pub fn descending(self) -> bool {
        self == CostMode::MostCost
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CostMode::Standard => "standard",
            CostMode::MostCost => "mostCost",
            CostMode::ElevationFocused => "elevationFocused",
            CostMode::DistanceFocused => "distanceFocused",
            CostMode::Balanced => "balanced",
        }
    }
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        CostMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| Error::config(format!("unknown cost mode '{value}'")))
    }
}

/// Elevation gain per kilometre, or `None` for a route without length.
pub fn gain_rate(elevation_gain: f64, distance_km: f64) -> Option<f64> {
    (distance_km > 0.0).then(|| elevation_gain / distance_km)
}

/// `steepness_weight * gain_rate + distance_weight * distance`.
pub fn route_cost(candidate: &CandidateRoute, weights: &CostWeights) -> f64 {
    let steepness = gain_rate(candidate.elevation_gain, candidate.distance_km).unwrap_or(0.0);
    weights.steepness_weight * steepness + weights.distance_weight * candidate.distance_km
}

/// A candidate together with its cost under some mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRoute {
    pub route: CandidateRoute,
    pub cost: f64,
}

/// Order candidates by cost under `mode`.
pub fn rank_by_cost(
    candidates: &[CandidateRoute],
    mode: CostMode,
    configured: &CostWeights,
) -> Vec<RankedRoute> {
    let weights = mode.weights(configured);
    let mut ranked: Vec<RankedRoute> = candidates
        .iter()
        .map(|route| RankedRoute {
            cost: route_cost(route, &weights),
            route: route.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| {
        let order = a.cost.total_cmp(&b.cost);
        if mode.descending() {
            order.reverse()
        } else {
            order
        }
    });
    ranked
}

/// Aggregate statistics for one cost mode over a candidate set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeStats {
    pub mode: CostMode,
    pub count: usize,
    pub avg_distance_km: f64,
    pub avg_elevation_gain: f64,
    pub avg_steepness: f64,
    pub avg_cost: f64,
    pub avg_score: f64,
    /// Cost of the route this mode ranks first.
    pub top_cost: Option<f64>,
}

/// Run the same candidates through every cost mode.
pub fn compare_cost_modes(candidates: &[CandidateRoute], configured: &CostWeights) -> Vec<ModeStats> {
    CostMode::ALL
        .into_iter()
        .map(|mode| {
            let ranked = rank_by_cost(candidates, mode, configured);
            ModeStats {
                mode,
                count: ranked.len(),
                avg_distance_km: mean(ranked.iter().map(|r| r.route.distance_km)),
                avg_elevation_gain: mean(ranked.iter().map(|r| r.route.elevation_gain)),
                avg_steepness: mean(ranked.iter().map(|r| {
                    gain_rate(r.route.elevation_gain, r.route.distance_km).unwrap_or(0.0)
                })),
                avg_cost: mean(ranked.iter().map(|r| r.cost)),
                avg_score: mean(ranked.iter().map(|r| r.route.similarity_score)),
                top_cost: ranked.first().map(|r| r.cost),
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Difficulty bucket derived from the gain rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
    Expert,
}

impl Difficulty {
    /// Routes without a gain rate count as easy.
    pub fn from_gain_rate(rate: Option<f64>) -> Self {
        match rate {
            Some(r) if r >= 150.0 => Difficulty::Expert,
            Some(r) if r >= 100.0 => Difficulty::Hard,
            Some(r) if r >= 50.0 => Difficulty::Moderate,
            _ => Difficulty::Easy,
        }
    }

    pub fn terrain_factor(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Moderate => 0.8,
            Difficulty::Hard => 0.6,
            Difficulty::Expert => 0.4,
        }
    }
}

/// Hiking time in hours, clamped to `[0.5, 24]`.
pub fn estimated_hours(distance_km: f64, difficulty: Difficulty) -> f64 {
    (distance_km / (BASE_SPEED_KMH * difficulty.terrain_factor())).clamp(0.5, 24.0)
}

/// `min(1, trail_count / distance / 5)`; zero for a route without length.
pub fn connectivity(trail_count: usize, distance_km: f64) -> f64 {
    if distance_km <= 0.0 {
        return 0.0;
    }
    (trail_count as f64 / distance_km / 5.0).min(1.0)
}

/// Metrics derived for an accepted or recommended route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub gain_rate: Option<f64>,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub connectivity: f64,
    pub elevation_min: f64,
    pub elevation_max: f64,
    pub elevation_avg: f64,
    pub length_3d_km: f64,
}

impl RouteMetrics {
    /// Derive metrics for `route` from the edges it traverses.
    pub fn for_route(graph: &RoutingGraph, route: &CandidateRoute) -> Self {
        let summaries: Vec<ElevationSummary> = route
            .edges
            .iter()
            .filter_map(|id| graph.edge(*id))
            .filter(|edge| !edge.geometry.is_empty())
            .map(|edge| ElevationSummary::from_points(&edge.geometry))
            .collect();
        let length_3d_m: f64 = route
            .edges
            .iter()
            .filter_map(|id| graph.edge(*id))
            .map(|edge| polyline_length_3d_m(&edge.geometry))
            .sum();

        let (elevation_min, elevation_max, elevation_avg) = if summaries.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                summaries.iter().map(|s| s.min).fold(f64::INFINITY, f64::min),
                summaries.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max),
                summaries.iter().map(|s| s.avg).sum::<f64>() / summaries.len() as f64,
            )
        };

        let rate = gain_rate(route.elevation_gain, route.distance_km);
        let difficulty = Difficulty::from_gain_rate(rate);
        Self {
            gain_rate: rate,
            difficulty,
            estimated_hours: estimated_hours(route.distance_km, difficulty),
            connectivity: connectivity(route.trail_count, route.distance_km),
            elevation_min,
            elevation_max,
            elevation_avg,
            length_3d_km: length_3d_m / 1000.0,
        }
    }
}
