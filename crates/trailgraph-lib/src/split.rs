//! Cutting trails into atomic segments at intersection points.

use tracing::{debug, info};

use crate::geometry::{locate_on_polyline, split_polyline, LinearPosition, METERS_PER_DEGREE};
use crate::intersection::IntersectionPoint;
use crate::trail::Trail;

/// Cuts closer than this to a trail end or to each other are ignored.
pub const MIN_SPLIT_GAP_M: f64 = 0.1;

/// Result of the splitting pass.
#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    /// Split children followed by untouched trails, in input order.
    pub segments: Vec<Trail>,
    /// Number of input trails that were cut.
    pub split_trails: usize,
}

/// Cut every trail touched by an intersection into ordered child segments.
///
/// Children keep the parent's attributes, get a fresh identifier and have
/// their length, bounding box and elevation summary recomputed. Trails with no
/// usable cut pass through unchanged.
pub fn split_trails(
    trails: &[Trail],
    intersections: &[IntersectionPoint],
    tolerance_m: f64,
) -> SplitOutcome {
    let mut outcome = SplitOutcome::default();

    for trail in trails {
        let cuts: Vec<LinearPosition> = intersections
            .iter()
            .filter(|ip| ip.touches(trail))
            .filter_map(|ip| {
                let position = locate_on_polyline(&trail.geometry, &ip.point)?;
                if position.offset * METERS_PER_DEGREE > tolerance_m {
                    return None;
                }
                let mut point = ip.point;
                point.elevation = position.point.elevation;
                Some(LinearPosition { point, ..position })
            })
            .collect();

        if cuts.is_empty() {
            outcome.segments.push(trail.clone());
            continue;
        }

        let pieces = split_polyline(&trail.geometry, &cuts, MIN_SPLIT_GAP_M);
        if pieces.len() <= 1 {
            outcome.segments.push(trail.clone());
            continue;
        }

        debug!(trail_id = %trail.id, pieces = pieces.len(), "split trail");
        outcome.split_trails += 1;
        outcome.segments.extend(
            pieces
                .into_iter()
                .map(|piece| trail.child(piece))
                .filter(|child| child.length_km > 0.0),
        );
    }

    info!(
        input = trails.len(),
        split = outcome.split_trails,
        segments = outcome.segments.len(),
        "split trails at intersections"
    );
    outcome
}
