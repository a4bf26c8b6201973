use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{polyline_length_m, TrailPoint};

/// What a trail record represents in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailKind {
    /// Imported trail or a split child of one.
    #[default]
    Trail,
    /// Short segment inserted by the midpoint gap bridger.
    Connector,
}

/// Axis-aligned bounds of a trail geometry, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[TrailPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_lng: first.lng,
            min_lat: first.lat,
            max_lng: first.lng,
            max_lat: first.lat,
        };
        for p in &points[1..] {
            bbox.min_lng = bbox.min_lng.min(p.lng);
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lng = bbox.max_lng.max(p.lng);
            bbox.max_lat = bbox.max_lat.max(p.lat);
        }
        Some(bbox)
    }

    /// Whether two boxes overlap after growing both by `margin` degrees.
    pub fn intersects(&self, other: &Self, margin: f64) -> bool {
        self.min_lng - margin <= other.max_lng + margin
            && other.min_lng - margin <= self.max_lng + margin
            && self.min_lat - margin <= other.max_lat + margin
            && other.min_lat - margin <= self.max_lat + margin
    }
}

/// Elevation statistics of a geometry, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElevationSummary {
    pub gain: f64,
    pub loss: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl ElevationSummary {
    pub fn from_points(points: &[TrailPoint]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut summary = Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Self::default()
        };
        let mut total = 0.0;
        for p in points {
            summary.min = summary.min.min(p.elevation);
            summary.max = summary.max.max(p.elevation);
            total += p.elevation;
        }
        for pair in points.windows(2) {
            let delta = pair[1].elevation - pair[0].elevation;
            if delta > 0.0 {
                summary.gain += delta;
            } else {
                summary.loss -= delta;
            }
        }
        summary.avg = total / points.len() as f64;
        summary
    }
}

/// A named linear trail feature.
///
/// Derived fields (`length_km`, `elevation`, `bbox`) are kept in sync with the
/// geometry through [`Trail::recompute`]; every stage that edits geometry
/// calls it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    /// Stable external identifier.
    pub id: String,
    /// Identifier of the trail this one was split or derived from.
    pub parent_id: Option<String>,
    pub name: String,
    pub region: String,
    pub kind: TrailKind,
    pub trail_type: Option<String>,
    pub surface: Option<String>,
    pub difficulty: Option<String>,
    pub geometry: Vec<TrailPoint>,
    pub length_km: f64,
    pub elevation: ElevationSummary,
    pub bbox: Option<BoundingBox>,
}

impl Trail {
    /// Build a trail and compute its derived metrics.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        region: impl Into<String>,
        geometry: Vec<TrailPoint>,
    ) -> Self {
        let mut trail = Self {
            id: id.into(),
            parent_id: None,
            name: name.into(),
            region: region.into(),
            kind: TrailKind::Trail,
            trail_type: None,
            surface: None,
            difficulty: None,
            geometry,
            length_km: 0.0,
            elevation: ElevationSummary::default(),
            bbox: None,
        };
        trail.recompute();
        trail
    }

    /// Derive a child record carrying the same attributes with new geometry
    /// and a fresh identifier.
    pub fn child(&self, geometry: Vec<TrailPoint>) -> Self {
        let mut child = Self {
            id: Uuid::new_v4().to_string(),
            parent_id: Some(self.root_id().to_string()),
            geometry,
            ..self.clone()
        };
        child.recompute();
        child
    }

    /// Identifier of the original imported trail.
    pub fn root_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(&self.id)
    }

    pub fn recompute(&mut self) {
        self.length_km = polyline_length_m(&self.geometry) / 1000.0;
        self.elevation = ElevationSummary::from_points(&self.geometry);
        self.bbox = BoundingBox::from_points(&self.geometry);
    }

    pub fn start(&self) -> Option<&TrailPoint> {
        self.geometry.first()
    }

    pub fn end(&self) -> Option<&TrailPoint> {
        self.geometry.last()
    }

    /// Whether `id` names this trail or the trail it was derived from.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id == id || self.parent_id.as_deref() == Some(id)
    }
}
