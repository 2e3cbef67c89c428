//! Service payload decoding.
//!
//! Accepts both Esri JSON (`rings` / `paths` / `x,y`) and GeoJSON feature
//! collections, and yields features in the canonical CRS. A feature whose
//! geometry cannot be decoded or projected is dropped; the rest survive.
use crate::crs;
use crate::geometry::{self, Feature};
use anyhow::{anyhow, Result};
use geo::{Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde_json::{Map, Value};
use tracing::debug;

/// GeoJSON without a declared CRS is WGS84 by definition.
const DEFAULT_SOURCE_EPSG: u32 = 4326;

/// Decode a layer query payload into canonical-CRS features.
pub fn features_from_payload(payload: &Value) -> Result<Vec<Feature>> {
    let object = payload
        .as_object()
        .ok_or_else(|| anyhow!("layer payload is not a JSON object"))?;
    if let Some(error) = object.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(anyhow!("service reported error: {message}"));
    }
    let Some(raw_features) = object.get("features").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let layer_epsg = payload_epsg(object).unwrap_or(DEFAULT_SOURCE_EPSG);

    let mut features = Vec::with_capacity(raw_features.len());
    let mut dropped = 0usize;
    for raw in raw_features {
        match decode_feature(raw, layer_epsg) {
            Ok(Some(feature)) => features.push(feature),
            Ok(None) => dropped += 1,
            Err(err) => {
                debug!(error = %err, "dropping undecodable feature");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        debug!(dropped, kept = features.len(), "features dropped during decode");
    }
    Ok(features)
}

fn decode_feature(raw: &Value, layer_epsg: u32) -> Result<Option<Feature>> {
    let Some(raw_geometry) = raw.get("geometry").filter(|g| !g.is_null()) else {
        return Ok(None);
    };
    let attributes = raw
        .get("attributes")
        .or_else(|| raw.get("properties"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let source_epsg = raw_geometry
        .get("spatialReference")
        .and_then(spatial_reference_epsg)
        .unwrap_or(layer_epsg);
    let native = decode_geometry(raw_geometry)?;
    let projected = crs::to_canonical(&native, source_epsg)?;
    Ok(Some(Feature::new(projected).with_attributes(attributes)))
}

/// Decode one geometry object in either Esri or GeoJSON form.
pub fn decode_geometry(raw: &Value) -> Result<Geometry<f64>> {
    if let Some(rings) = raw.get("rings").and_then(Value::as_array) {
        return esri_rings(rings);
    }
    if let Some(paths) = raw.get("paths").and_then(Value::as_array) {
        let lines = paths
            .iter()
            .map(geometry::parse_line)
            .collect::<Result<Vec<LineString<f64>>>>()?;
        if lines.is_empty() {
            return Err(anyhow!("polyline has no paths"));
        }
        return Ok(Geometry::MultiLineString(MultiLineString::new(lines)));
    }
    if let (Some(x), Some(y)) = (
        raw.get("x").and_then(Value::as_f64),
        raw.get("y").and_then(Value::as_f64),
    ) {
        return Ok(Geometry::Point(Point::new(x, y)));
    }
    if raw.get("type").is_some() {
        return geometry::parse_geojson_geometry(raw);
    }
    Err(anyhow!("unrecognized geometry shape"))
}

/// Esri polygons list exterior rings clockwise and holes counter-clockwise.
fn esri_rings(rings: &[Value]) -> Result<Geometry<f64>> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for raw in rings {
        let ring = geometry::parse_line(raw)?;
        if ring.0.len() < 3 {
            continue;
        }
        let is_hole = signed_ring_area(&ring) > 0.0;
        match polygons.last_mut() {
            Some((_, holes)) if is_hole => holes.push(ring),
            _ => polygons.push((ring, Vec::new())),
        }
    }
    if polygons.is_empty() {
        return Err(anyhow!("polygon has no usable rings"));
    }
    let mut polygons: Vec<Polygon<f64>> = polygons
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect();
    Ok(if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    })
}

/// Shoelace sum; positive for counter-clockwise rings.
fn signed_ring_area(ring: &LineString<f64>) -> f64 {
    ring.0
        .windows(2)
        .map(|pair| pair[0].x * pair[1].y - pair[1].x * pair[0].y)
        .sum::<f64>()
        / 2.0
}

fn payload_epsg(object: &Map<String, Value>) -> Option<u32> {
    if let Some(code) = object.get("crs_epsg").and_then(Value::as_u64) {
        return u32::try_from(code).ok();
    }
    if let Some(reference) = object.get("spatialReference") {
        return spatial_reference_epsg(reference);
    }
    let name = object
        .get("crs")
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)?;
    parse_crs_name(name)
}

fn spatial_reference_epsg(reference: &Value) -> Option<u32> {
    reference
        .get("latestWkid")
        .or_else(|| reference.get("wkid"))
        .and_then(Value::as_u64)
        .and_then(|code| u32::try_from(code).ok())
}

/// `EPSG:2285`, `urn:ogc:def:crs:EPSG::2285`, and `CRS84` forms.
fn parse_crs_name(name: &str) -> Option<u32> {
    if name.ends_with("CRS84") {
        return Some(DEFAULT_SOURCE_EPSG);
    }
    name.rsplit(':').next()?.trim().parse().ok()
}
