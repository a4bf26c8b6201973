//! Detection of true point intersections between trails.
//!
//! Each trail is first noded (cut at its own self-crossings) so that every
//! component is a simple line; components of distinct trails are then tested
//! pairwise. Pairwise testing is quadratic in trail count and is prefiltered
//! with bounding boxes.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::geometry::{
    closest_on_segment, locate_on_polyline, polyline_distance, search_radius_degrees,
    segment_intersection, split_polyline, LinearPosition, TrailPoint, METERS_PER_DEGREE,
};
use crate::graph::NodeType;
use crate::spatial::PointIndex;
use crate::trail::Trail;

/// A point where two or more trails meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionPoint {
    pub point: TrailPoint,
    pub trail_ids: BTreeSet<String>,
    pub trail_names: BTreeSet<String>,
    pub node_type: NodeType,
    /// Distance tolerance (metres) the point was detected with.
    pub tolerance_m: f64,
}

impl IntersectionPoint {
    pub fn touches(&self, trail: &Trail) -> bool {
        self.trail_ids.contains(&trail.id)
    }
}

/// Split a trail into its non-self-intersecting components.
///
/// A simple trail yields a single component equal to its geometry.
pub fn node_trail(trail: &Trail) -> Vec<Vec<TrailPoint>> {
    let points = &trail.geometry;
    let mut cuts: Vec<LinearPosition> = Vec::new();

    for i in 0..points.len().saturating_sub(1) {
        for j in (i + 2)..points.len().saturating_sub(1) {
            let Some(hit) =
                segment_intersection(&points[i], &points[i + 1], &points[j], &points[j + 1])
            else {
                continue;
            };
            let hit = TrailPoint::new(hit.x, hit.y, 0.0);
            for segment in [i, j] {
                let (point, fraction) =
                    closest_on_segment(&hit, &points[segment], &points[segment + 1]);
                cuts.push(LinearPosition {
                    segment,
                    fraction,
                    point,
                    offset: 0.0,
                });
            }
        }
    }

    if cuts.is_empty() {
        return vec![points.clone()];
    }
    debug!(trail_id = %trail.id, cuts = cuts.len(), "noded self-intersecting trail");
    split_polyline(points, &cuts, 0.0)
}

/// Find every point where two distinct trails cross or touch.
///
/// Points closer than `tolerance_m` to each other are merged, so three trails
/// meeting at one spot produce one point listing all three.
pub fn detect_intersections(trails: &[Trail], tolerance_m: f64) -> Vec<IntersectionPoint> {
    let components: Vec<Vec<Vec<TrailPoint>>> = trails.iter().map(node_trail).collect();
    let mut merged: Vec<IntersectionPoint> = Vec::new();
    let mut index: PointIndex<usize> = PointIndex::new();
    let mut pairs_tested = 0usize;

    for a in 0..trails.len() {
        for b in (a + 1)..trails.len() {
            let (ta, tb) = (&trails[a], &trails[b]);
            let (Some(box_a), Some(box_b)) = (ta.bbox, tb.bbox) else {
                continue;
            };
            let margin = search_radius_degrees(tolerance_m, box_a.max_lat);
            if !box_a.intersects(&box_b, margin) {
                continue;
            }
            pairs_tested += 1;

            let hits = pair_intersections(&components[a], &components[b]);
            if hits.is_empty() {
                continue;
            }

            let distance_m = polyline_distance(&ta.geometry, &tb.geometry) * METERS_PER_DEGREE;
            if distance_m > tolerance_m {
                continue;
            }

            for hit in hits {
                let point = with_elevation(hit, ta);
                let interior = is_interior(&point, ta, tolerance_m) || is_interior(&point, tb, tolerance_m);

                if let Some((slot, _, _)) = index.nearest_matching(&point, tolerance_m, |_| true) {
                    let existing = &mut merged[slot];
                    existing.trail_ids.extend([ta.id.clone(), tb.id.clone()]);
                    existing.trail_names.extend([ta.name.clone(), tb.name.clone()]);
                    if interior {
                        existing.node_type = NodeType::Intersection;
                    }
                    continue;
                }

                index.insert(merged.len(), point);
                merged.push(IntersectionPoint {
                    point,
                    trail_ids: BTreeSet::from([ta.id.clone(), tb.id.clone()]),
                    trail_names: BTreeSet::from([ta.name.clone(), tb.name.clone()]),
                    node_type: if interior {
                        NodeType::Intersection
                    } else {
                        NodeType::Endpoint
                    },
                    tolerance_m,
                });
            }
        }
    }

    merged.sort_by(|x, y| {
        x.point
            .lng
            .total_cmp(&y.point.lng)
            .then(x.point.lat.total_cmp(&y.point.lat))
    });
    info!(
        trails = trails.len(),
        pairs_tested,
        intersections = merged.len(),
        "detected trail intersections"
    );
    merged
}

fn pair_intersections(a: &[Vec<TrailPoint>], b: &[Vec<TrailPoint>]) -> Vec<TrailPoint> {
    let mut hits: Vec<TrailPoint> = Vec::new();
    for ca in a {
        for cb in b {
            for sa in ca.windows(2) {
                for sb in cb.windows(2) {
                    if let Some(hit) = segment_intersection(&sa[0], &sa[1], &sb[0], &sb[1]) {
                        let hit = TrailPoint::new(hit.x, hit.y, 0.0);
                        if !hits.iter().any(|h| h.same_position(&hit)) {
                            hits.push(hit);
                        }
                    }
                }
            }
        }
    }
    hits
}

fn with_elevation(point: TrailPoint, trail: &Trail) -> TrailPoint {
    locate_on_polyline(&trail.geometry, &point)
        .map(|position| TrailPoint::new(point.lng, point.lat, position.point.elevation))
        .unwrap_or(point)
}

fn is_interior(point: &TrailPoint, trail: &Trail, tolerance_m: f64) -> bool {
    match (trail.start(), trail.end()) {
        (Some(start), Some(end)) => {
            point.haversine_m(start) > tolerance_m && point.haversine_m(end) > tolerance_m
        }
        _ => false,
    }
}
