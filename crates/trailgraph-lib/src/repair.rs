//! Geometry repair and validation of raw trails.
//!
//! Runs before any graph construction. Topology predicates are 2D: elevation
//! is carried on each vertex as an attribute but never takes part in
//! snapping, duplicate detection or length checks.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::geometry::{snap_to_grid, TrailPoint};
use crate::trail::Trail;

/// Counts of what the repair pass kept and why the rest was dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub input: usize,
    pub kept: usize,
    pub invalid: usize,
    pub degenerate: usize,
    pub zero_length: usize,
    pub duplicate: usize,
    pub length_out_of_range: usize,
    pub coordinate_count_out_of_range: usize,
    pub elevation_out_of_range: usize,
}

impl RepairReport {
    pub fn dropped(&self) -> usize {
        self.input - self.kept
    }
}

enum Verdict {
    Keep(Trail),
    Invalid,
    Degenerate,
    ZeroLength,
    LengthOutOfRange,
    CoordinateCountOutOfRange,
    ElevationOutOfRange,
}

/// Clean, snap and validate trails, dropping those that cannot become part of
/// a consistent graph. Of two exact duplicates (in either direction) the
/// first is kept.
pub fn repair_trails(trails: Vec<Trail>, config: &PipelineConfig) -> (Vec<Trail>, RepairReport) {
    let mut report = RepairReport {
        input: trails.len(),
        ..RepairReport::default()
    };
    let mut seen: HashSet<Vec<(u64, u64)>> = HashSet::new();
    let mut kept = Vec::with_capacity(trails.len());

    for trail in trails {
        let trail_id = trail.id.clone();
        match assess(trail, config) {
            Verdict::Keep(trail) => {
                let key = geometry_key(&trail.geometry);
                let mut reversed = key.clone();
                reversed.reverse();
                if seen.contains(&key) || seen.contains(&reversed) {
                    debug!(trail_id = %trail_id, "dropping duplicate geometry");
                    report.duplicate += 1;
                    continue;
                }
                seen.insert(key);
                kept.push(trail);
            }
            Verdict::Invalid => report.invalid += 1,
            Verdict::Degenerate => report.degenerate += 1,
            Verdict::ZeroLength => report.zero_length += 1,
            Verdict::LengthOutOfRange => report.length_out_of_range += 1,
            Verdict::CoordinateCountOutOfRange => report.coordinate_count_out_of_range += 1,
            Verdict::ElevationOutOfRange => report.elevation_out_of_range += 1,
        }
    }

    report.kept = kept.len();
    info!(
        input = report.input,
        kept = report.kept,
        invalid = report.invalid,
        degenerate = report.degenerate,
        zero_length = report.zero_length,
        duplicate = report.duplicate,
        "repaired trail geometries"
    );
    (kept, report)
}

fn assess(mut trail: Trail, config: &PipelineConfig) -> Verdict {
    let grid = config.tolerances.snap_grid_degrees;
    let thresholds = &config.validation;

    if trail.geometry.is_empty() {
        return Verdict::Invalid;
    }

    let snapped: Vec<TrailPoint> = trail
        .geometry
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| TrailPoint::new(snap_to_grid(p.lng, grid), snap_to_grid(p.lat, grid), p.elevation))
        .collect();
    if snapped.is_empty() {
        return Verdict::Invalid;
    }

    let cleaned = thin_vertices(&snapped, config.tolerances.simplify_m);
    if cleaned.len() < 2 {
        return Verdict::Degenerate;
    }

    trail.geometry = cleaned;
    trail.recompute();

    if trail.length_km <= 0.0 {
        return Verdict::ZeroLength;
    }

    let count = trail.geometry.len();
    if count < thresholds.min_coordinate_count || count > thresholds.max_coordinate_count {
        return Verdict::CoordinateCountOutOfRange;
    }

    let length_m = trail.length_km * 1000.0;
    if length_m < thresholds.min_trail_length_m || length_m > thresholds.max_trail_length_m {
        return Verdict::LengthOutOfRange;
    }

    if trail.elevation.min < thresholds.min_elevation_m
        || trail.elevation.max > thresholds.max_elevation_m
    {
        return Verdict::ElevationOutOfRange;
    }

    Verdict::Keep(trail)
}

/// Drop repeated positions and interior vertices closer than `min_spacing_m`
/// to the previously kept vertex. The last vertex is always retained.
fn thin_vertices(points: &[TrailPoint], min_spacing_m: f64) -> Vec<TrailPoint> {
    let mut out: Vec<TrailPoint> = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        let Some(previous) = out.last() else {
            out.push(*point);
            continue;
        };
        if previous.same_position(point) {
            continue;
        }
        let is_last = index + 1 == points.len();
        if !is_last && previous.haversine_m(point) < min_spacing_m {
            continue;
        }
        out.push(*point);
    }
    out
}

fn geometry_key(points: &[TrailPoint]) -> Vec<(u64, u64)> {
    points
        .iter()
        .map(|p| (p.lng.to_bits(), p.lat.to_bits()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trail(id: &str, coords: &[(f64, f64)]) -> Trail {
        Trail::new(
            id,
            id,
            "boulder",
            coords
                .iter()
                .map(|(lng, lat)| TrailPoint::new(*lng, *lat, 1800.0))
                .collect(),
        )
    }

    #[test]
    fn keeps_valid_trail_and_snaps_coordinates() {
        let config = PipelineConfig::default();
        let input = vec![trail("a", &[(-105.270_001_2, 40.0), (-105.27, 40.01)])];
        let (kept, report) = repair_trails(input, &config);
        assert_eq!(report.kept, 1);
        assert_eq!(report.dropped(), 0);
        assert!((kept[0].geometry[0].lng - (-105.27)).abs() < 1e-12);
    }

    #[test]
    fn drops_degenerate_and_zero_length() {
        let config = PipelineConfig::default();
        let input = vec![
            trail("single", &[(-105.27, 40.0)]),
            trail("collapsed", &[(-105.27, 40.0), (-105.270_000_1, 40.000_000_1)]),
            trail("empty", &[]),
        ];
        let (kept, report) = repair_trails(input, &config);
        assert!(kept.is_empty());
        assert_eq!(report.degenerate, 2);
        assert_eq!(report.invalid, 1);
    }

    #[test]
    fn drops_non_finite_vertices_but_keeps_trail() {
        let config = PipelineConfig::default();
        let input = vec![trail("a", &[(-105.27, 40.0), (f64::NAN, 40.005), (-105.27, 40.01)])];
        let (kept, report) = repair_trails(input, &config);
        assert_eq!(report.kept, 1);
        assert_eq!(kept[0].geometry.len(), 2);
    }

    #[test]
    fn drops_exact_and_reversed_duplicates() {
        let config = PipelineConfig::default();
        let coords = [(-105.27, 40.0), (-105.27, 40.01)];
        let reversed = [(-105.27, 40.01), (-105.27, 40.0)];
        let input = vec![trail("a", &coords), trail("b", &coords), trail("c", &reversed)];
        let (kept, report) = repair_trails(input, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
        assert_eq!(report.duplicate, 2);
    }

    #[test]
    fn applies_validation_thresholds() {
        let mut config = PipelineConfig::default();
        config.validation.max_trail_length_m = 500.0;
        config.validation.max_elevation_m = 1000.0;
        let long = trail("long", &[(-105.27, 40.0), (-105.27, 40.01)]);
        let mut high = trail("high", &[(-105.28, 40.0), (-105.28, 40.001)]);
        high.geometry[1].elevation = 4000.0;
        let (kept, report) = repair_trails(vec![long, high], &config);
        assert!(kept.is_empty());
        assert_eq!(report.length_out_of_range, 1);
        assert_eq!(report.elevation_out_of_range, 1);
    }
}
