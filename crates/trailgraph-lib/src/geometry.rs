//! Coordinate primitives and the handful of geometric predicates the
//! topology stages need.
//!
//! Coordinates are longitude/latitude degrees (the working unit). Metric
//! distances use the haversine great-circle distance from `geo`; predicates
//! such as segment intersection and projection are planar in degree space,
//! which is accurate enough at trail scale.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Closest, ClosestPoint, Coord, Distance, Haversine, Line, Point};
use serde::{Deserialize, Serialize};

/// Approximate length of one degree of latitude in metres.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A single vertex of a trail: longitude, latitude and elevation in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub lng: f64,
    pub lat: f64,
    pub elevation: f64,
}

impl TrailPoint {
    pub fn new(lng: f64, lat: f64, elevation: f64) -> Self {
        Self {
            lng,
            lat,
            elevation,
        }
    }

    /// Planar coordinate used by `geo` predicates.
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lng,
            y: self.lat,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite() && self.elevation.is_finite()
    }

    /// Euclidean distance in degrees, ignoring elevation.
    pub fn planar_distance(&self, other: &Self) -> f64 {
        (self.lng - other.lng).hypot(self.lat - other.lat)
    }

    /// Great-circle distance in metres, ignoring elevation.
    pub fn haversine_m(&self, other: &Self) -> f64 {
        Haversine.distance(
            Point::new(self.lng, self.lat),
            Point::new(other.lng, other.lat),
        )
    }

    /// Horizontal great-circle distance combined with the elevation delta.
    pub fn distance_3d_m(&self, other: &Self) -> f64 {
        let horizontal = self.haversine_m(other);
        let vertical = (other.elevation - self.elevation).abs();
        horizontal.hypot(vertical)
    }

    /// True when both points share the same 2D position.
    pub fn same_position(&self, other: &Self) -> bool {
        self.lng == other.lng && self.lat == other.lat
    }

    pub fn as_triple(&self) -> [f64; 3] {
        [self.lng, self.lat, self.elevation]
    }
}

/// Convert a metric distance into degrees of latitude.
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Planar search radius (degrees) that covers `meters` in every direction at
/// the given latitude. Longitude degrees shrink with latitude, so the radius
/// is widened accordingly; callers confirm candidates with a metric check.
pub fn search_radius_degrees(meters: f64, lat: f64) -> f64 {
    let shrink = lat.to_radians().cos().abs().max(0.01);
    meters_to_degrees(meters) / shrink
}

/// Round a coordinate onto a grid of the given cell size (degrees).
pub fn snap_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

pub fn midpoint(a: &TrailPoint, b: &TrailPoint) -> TrailPoint {
    TrailPoint::new(
        (a.lng + b.lng) / 2.0,
        (a.lat + b.lat) / 2.0,
        (a.elevation + b.elevation) / 2.0,
    )
}

/// Linear interpolation between two vertices, elevation included.
pub fn interpolate(a: &TrailPoint, b: &TrailPoint, fraction: f64) -> TrailPoint {
    let t = fraction.clamp(0.0, 1.0);
    TrailPoint::new(
        a.lng + (b.lng - a.lng) * t,
        a.lat + (b.lat - a.lat) * t,
        a.elevation + (b.elevation - a.elevation) * t,
    )
}

/// Length of a polyline in metres.
pub fn polyline_length_m(points: &[TrailPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].haversine_m(&pair[1]))
        .sum()
}

/// 3D length of a polyline in metres.
pub fn polyline_length_3d_m(points: &[TrailPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_3d_m(&pair[1]))
        .sum()
}

/// A proper or touching single-point crossing of two segments.
///
/// Collinear overlaps are not point intersections and yield `None`.
pub fn segment_intersection(
    a_start: &TrailPoint,
    a_end: &TrailPoint,
    b_start: &TrailPoint,
    b_end: &TrailPoint,
) -> Option<Coord<f64>> {
    let a = Line::new(a_start.coord(), a_end.coord());
    let b = Line::new(b_start.coord(), b_end.coord());
    match line_intersection(a, b)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
        LineIntersection::Collinear { .. } => None,
    }
}

/// Closest point on segment `a`-`b` to `point`, with its fraction along the
/// segment. Elevation is interpolated from the segment ends.
pub fn closest_on_segment(
    point: &TrailPoint,
    a: &TrailPoint,
    b: &TrailPoint,
) -> (TrailPoint, f64) {
    let line = Line::new(a.coord(), b.coord());
    let target = Point::from(point.coord());
    let projected = match line.closest_point(&target) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        Closest::Indeterminate => return (*a, 0.0),
    };
    let span = a.planar_distance(b);
    let fraction = if span > 0.0 {
        let reached = TrailPoint::new(projected.x(), projected.y(), 0.0);
        (a.planar_distance(&reached) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (interpolate(a, b, fraction), fraction)
}

/// Position of a point projected onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPosition {
    /// Index of the segment (`points[segment]`..`points[segment + 1]`).
    pub segment: usize,
    /// Fraction along that segment.
    pub fraction: f64,
    /// Projected point on the polyline.
    pub point: TrailPoint,
    /// Planar distance (degrees) between the query and the projection.
    pub offset: f64,
}

impl LinearPosition {
    /// Monotonic measure along the polyline, usable for ordering cuts.
    pub fn measure(&self) -> f64 {
        self.segment as f64 + self.fraction
    }
}

/// Project `point` onto the nearest segment of `points`.
pub fn locate_on_polyline(points: &[TrailPoint], point: &TrailPoint) -> Option<LinearPosition> {
    let mut best: Option<LinearPosition> = None;
    for (segment, pair) in points.windows(2).enumerate() {
        let (projected, fraction) = closest_on_segment(point, &pair[0], &pair[1]);
        let offset = projected.planar_distance(point);
        if best.map(|b| offset < b.offset).unwrap_or(true) {
            best = Some(LinearPosition {
                segment,
                fraction,
                point: projected,
                offset,
            });
        }
    }
    best
}

/// Cut a polyline at the given positions, returning the ordered pieces.
///
/// Cuts within `min_gap_m` (measured along the line) of either end of the
/// polyline, or of the previous accepted cut, are ignored. Pieces with fewer
/// than two distinct vertices are dropped.
pub fn split_polyline(
    points: &[TrailPoint],
    cuts: &[LinearPosition],
    min_gap_m: f64,
) -> Vec<Vec<TrailPoint>> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].haversine_m(&pair[1]);
        cumulative.push(total);
    }
    let along = |cut: &LinearPosition| {
        cumulative[cut.segment.min(cumulative.len() - 1)]
            + points[cut.segment.min(points.len() - 1)].haversine_m(&cut.point)
    };

    let mut ordered: Vec<LinearPosition> = cuts.to_vec();
    ordered.sort_by(|a, b| a.measure().total_cmp(&b.measure()));

    fn push_distinct(piece: &mut Vec<TrailPoint>, point: TrailPoint) {
        if piece.last().map_or(true, |last| !last.same_position(&point)) {
            piece.push(point);
        }
    }

    let mut pieces = Vec::new();
    let mut piece = vec![*first];
    let mut next_vertex = 1;
    let mut last_cut_at = 0.0;

    for cut in ordered {
        let at = along(&cut);
        if at - last_cut_at <= min_gap_m || total - at <= min_gap_m {
            continue;
        }
        last_cut_at = at;
        while next_vertex <= cut.segment && next_vertex < points.len() {
            push_distinct(&mut piece, points[next_vertex]);
            next_vertex += 1;
        }
        push_distinct(&mut piece, cut.point);
        pieces.push(std::mem::replace(&mut piece, vec![cut.point]));
    }
    while next_vertex < points.len() {
        push_distinct(&mut piece, points[next_vertex]);
        next_vertex += 1;
    }
    pieces.push(piece);

    pieces.retain(|piece| piece.len() >= 2);
    pieces
}

/// Minimum planar distance (degrees) between two polylines.
pub fn polyline_distance(a: &[TrailPoint], b: &[TrailPoint]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            if segment_intersection(&sa[0], &sa[1], &sb[0], &sb[1]).is_some() {
                return 0.0;
            }
        }
    }
    let to_other = |from: &[TrailPoint], to: &[TrailPoint]| {
        from.iter()
            .filter_map(|p| {
                if to.len() == 1 {
                    Some(p.planar_distance(&to[0]))
                } else {
                    locate_on_polyline(to, p).map(|pos| pos.offset)
                }
            })
            .fold(f64::INFINITY, f64::min)
    };
    to_other(a, b).min(to_other(b, a))
}
