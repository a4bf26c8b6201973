//! Trail loading from GeoJSON.
//!
//! Accepts a `FeatureCollection` (or a single `Feature`) whose geometries are
//! `LineString` or `MultiLineString`, with 2D or 3D positions. Each line part
//! becomes one [`Trail`]. Recognised properties: `id`/`app_uuid`, `name`,
//! `region`, `trail_type`, `surface`, `difficulty`.

use std::fs;
use std::path::Path;

use geojson::{Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::TrailPoint;
use crate::trail::Trail;

/// Load trails from a GeoJSON file on disk.
pub fn load_trails(path: &Path) -> Result<Vec<Trail>> {
    let text = fs::read_to_string(path)?;
    let trails = parse_trails(&text)?;
    info!(path = %path.display(), trails = trails.len(), "loaded trails");
    Ok(trails)
}

/// Parse trails from GeoJSON text.
pub fn parse_trails(text: &str) -> Result<Vec<Trail>> {
    let geojson: GeoJson = text.parse()?;
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => {
            return Err(Error::UnsupportedGeometry {
                index: 0,
                kind: format!("bare {}", value_kind(&geometry.value)),
            })
        }
    };

    let mut trails = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        trails.extend(feature_to_trails(index, feature)?);
    }
    Ok(trails)
}

fn feature_to_trails(index: usize, feature: &Feature) -> Result<Vec<Trail>> {
    let Some(geometry) = feature.geometry.as_ref() else {
        debug!(index, "skipping feature without geometry");
        return Ok(Vec::new());
    };

    let parts: Vec<&Vec<Vec<f64>>> = match &geometry.value {
        Value::LineString(line) => vec![line],
        Value::MultiLineString(lines) => lines.iter().collect(),
        other => {
            return Err(Error::UnsupportedGeometry {
                index,
                kind: value_kind(other).to_string(),
            })
        }
    };

    let base_id = string_property(feature, "app_uuid")
        .or_else(|| string_property(feature, "id"))
        .or_else(|| feature.id.as_ref().map(feature_id_string));
    let name = string_property(feature, "name").unwrap_or_else(|| "Unnamed Trail".to_string());
    let region = string_property(feature, "region").unwrap_or_default();

    let many = parts.len() > 1;
    let mut trails = Vec::with_capacity(parts.len());
    for (part, positions) in parts.into_iter().enumerate() {
        let id = match (&base_id, many) {
            (Some(id), false) => id.clone(),
            (Some(id), true) => format!("{id}-{part}"),
            (None, _) => Uuid::new_v4().to_string(),
        };
        let geometry = positions_to_points(&id, positions)?;
        let mut trail = Trail::new(id, name.clone(), region.clone(), geometry);
        trail.trail_type = string_property(feature, "trail_type");
        trail.surface = string_property(feature, "surface");
        trail.difficulty = string_property(feature, "difficulty");
        trails.push(trail);
    }
    Ok(trails)
}

/// A position needs at least longitude and latitude; elevation defaults to 0.
fn positions_to_points(trail_id: &str, positions: &[Vec<f64>]) -> Result<Vec<TrailPoint>> {
    positions
        .iter()
        .enumerate()
        .map(|(vertex, position)| match position.as_slice() {
            [lng, lat] => Ok(TrailPoint::new(*lng, *lat, 0.0)),
            [lng, lat, elevation, ..] => Ok(TrailPoint::new(*lng, *lat, *elevation)),
            _ => Err(Error::InvalidGeometry {
                trail_id: trail_id.to_string(),
                reason: format!("position {vertex} has {} coordinates", position.len()),
            }),
        })
        .collect()
}

fn string_property(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        JsonValue::String(value) if !value.is_empty() => Some(value.clone()),
        JsonValue::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn feature_id_string(id: &geojson::feature::Id) -> String {
    match id {
        geojson::feature::Id::String(value) => value.clone(),
        geojson::feature::Id::Number(value) => value.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}
