//! Planar geometry helpers shared by the phases.
//!
//! All inputs are assumed to be in the canonical foot-based CRS
//! (see [`crate::crs`]); nothing here reprojects.
use crate::crs::CANONICAL_EPSG;
use anyhow::{anyhow, Context, Result};
use geo::{
    Area, BooleanOps, Buffer, ClosestPoint, ConvexHull, Coord, CoordsIter, Distance, Euclidean,
    Geometry, Intersects, Length, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon,
};
use serde_json::{json, Map, Value};

/// A geometry plus the attribute record it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// First non-null, non-blank attribute among `names`, rendered as text.
    pub fn text(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| {
            let rendered = match self.attributes.get(*name)? {
                Value::Null => return None,
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            (!rendered.is_empty()).then_some(rendered)
        })
    }

    pub fn number(&self, names: &[&str]) -> Option<f64> {
        names.iter().find_map(|name| match self.attributes.get(*name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// All non-null attribute values joined into one string, for keyword scans.
    pub fn attribute_text(&self) -> String {
        self.attributes
            .values()
            .filter(|value| !value.is_null())
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn empty_multipolygon() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

/// Polygonal part of a geometry; lines and points contribute nothing.
pub fn polygonal(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
        Geometry::MultiPolygon(multi) => multi.clone(),
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
        Geometry::GeometryCollection(collection) => MultiPolygon::new(
            collection
                .iter()
                .flat_map(|geometry| polygonal(geometry).0)
                .collect(),
        ),
        _ => empty_multipolygon(),
    }
}

pub fn is_empty(geometry: &MultiPolygon<f64>) -> bool {
    geometry.0.is_empty() || geometry.unsigned_area() <= f64::EPSILON
}

/// Buffer any geometry outward by `distance` feet.
///
/// A non-positive distance keeps polygonal input as-is and drops lines/points,
/// which have no area to exclude.
pub fn buffer(geometry: &Geometry<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance <= 0.0 {
        return polygonal(geometry);
    }
    geometry.buffer(distance)
}

/// Inset a polygonal area by `distance` feet. Returns empty when it collapses.
pub fn inset(area: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance <= 0.0 {
        return area.clone();
    }
    let shrunk = area.buffer(-distance);
    if is_empty(&shrunk) {
        empty_multipolygon()
    } else {
        shrunk
    }
}

/// Union of every polygon in `parts`, or `None` when there is nothing to union.
pub fn safe_union<'a, I>(parts: I) -> Option<MultiPolygon<f64>>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let mut acc: Option<MultiPolygon<f64>> = None;
    for part in parts {
        if part.0.is_empty() {
            continue;
        }
        acc = Some(match acc {
            Some(current) => current.union(part),
            None => part.clone(),
        });
    }
    acc
}

/// Fraction of the parcel covered by `targets`, summed per target.
pub fn overlap_pct<'a, I>(parcel: &MultiPolygon<f64>, targets: I) -> f64
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let parcel_area = parcel.unsigned_area();
    let total = if parcel_area > 0.0 { parcel_area } else { 1.0 };
    let covered: f64 = targets
        .into_iter()
        .map(|target| parcel.intersection(target).unsigned_area())
        .sum();
    covered / total
}

/// Esri query shape for a parcel: its exterior ring, or the convex hull for
/// multi-part parcels.
pub fn parcel_query_geom(parcel: &MultiPolygon<f64>) -> Value {
    let ring = if parcel.0.len() == 1 {
        parcel.0[0].exterior().clone()
    } else {
        parcel.convex_hull().exterior().clone()
    };
    let coords: Vec<Value> = ring.coords().map(|c| json!([c.x, c.y])).collect();
    json!({
        "rings": [coords],
        "spatialReference": { "wkid": CANONICAL_EPSG },
    })
}

pub fn perimeter(area: &MultiPolygon<f64>) -> f64 {
    multiline_length(&boundary(area))
}

pub fn multiline_length(lines: &MultiLineString<f64>) -> f64 {
    Euclidean.length(lines)
}

/// Boundary rings of a polygonal area as linework.
pub fn boundary(area: &MultiPolygon<f64>) -> MultiLineString<f64> {
    MultiLineString::new(
        area.0
            .iter()
            .flat_map(|polygon| {
                std::iter::once(polygon.exterior().clone()).chain(polygon.interiors().to_vec())
            })
            .collect(),
    )
}

/// Nearest point of `target` to `from`, with its distance.
pub fn nearest_point(target: &Geometry<f64>, from: Point<f64>) -> Option<(Point<f64>, f64)> {
    match target.closest_point(&from) {
        geo::Closest::Intersection(p) => Some((p, 0.0)),
        geo::Closest::SinglePoint(p) => Some((p, Euclidean.distance(p, from))),
        geo::Closest::Indeterminate => None,
    }
}

/// Minimum planar distance between two geometries.
///
/// For non-intersecting linework and polygons the minimum is attained at a
/// vertex of one of the two, so checking vertices both ways is exact.
pub fn geometry_distance(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<f64> {
    if a.intersects(b) {
        return Some(0.0);
    }
    let from_a = a
        .coords_iter()
        .filter_map(|c| nearest_point(b, Point::from(c)).map(|(_, d)| d));
    let from_b = b
        .coords_iter()
        .filter_map(|c| nearest_point(a, Point::from(c)).map(|(_, d)| d));
    from_a.chain(from_b).reduce(f64::min)
}

/// Encode a geometry as a GeoJSON geometry object.
pub fn geojson_geometry(geometry: &Geometry<f64>) -> Value {
    fn coord(c: &Coord<f64>) -> Value {
        json!([c.x, c.y])
    }
    fn line(ls: &LineString<f64>) -> Value {
        Value::Array(ls.0.iter().map(coord).collect())
    }
    fn polygon(p: &Polygon<f64>) -> Value {
        Value::Array(
            std::iter::once(p.exterior())
                .chain(p.interiors())
                .map(line)
                .collect(),
        )
    }
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": coord(&p.0)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| coord(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::Line(l) => json!({
            "type": "LineString",
            "coordinates": [coord(&l.start), coord(&l.end)],
        }),
        Geometry::LineString(ls) => json!({"type": "LineString", "coordinates": line(ls)}),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon(p)}),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => geojson_geometry(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => geojson_geometry(&Geometry::Polygon(t.to_polygon())),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.iter().map(geojson_geometry).collect::<Vec<_>>(),
        }),
    }
}

/// Decode a GeoJSON geometry object.
pub fn parse_geojson_geometry(value: &Value) -> Result<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("geometry missing type"))?;
    if kind == "GeometryCollection" {
        let members = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("GeometryCollection missing geometries"))?;
        let parsed = members
            .iter()
            .map(parse_geojson_geometry)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Geometry::GeometryCollection(parsed.into_iter().collect()));
    }
    let coords = value
        .get("coordinates")
        .ok_or_else(|| anyhow!("{kind} missing coordinates"))?;
    Ok(match kind {
        "Point" => Geometry::Point(Point::from(parse_coord(coords)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            parse_array(coords)?
                .iter()
                .map(|c| parse_coord(c).map(Point::from))
                .collect::<Result<Vec<_>>>()?,
        )),
        "LineString" => Geometry::LineString(parse_line(coords)?),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            parse_array(coords)?
                .iter()
                .map(parse_line)
                .collect::<Result<Vec<_>>>()?,
        )),
        "Polygon" => Geometry::Polygon(parse_polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            parse_array(coords)?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?,
        )),
        other => return Err(anyhow!("unsupported geometry type {other}")),
    })
}

fn parse_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("expected coordinate array"))
}

pub(crate) fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    let pair = parse_array(value)?;
    let x = pair.first().and_then(Value::as_f64);
    let y = pair.get(1).and_then(Value::as_f64);
    match (x, y) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(anyhow!("invalid coordinate {value}")),
    }
}

pub(crate) fn parse_line(value: &Value) -> Result<LineString<f64>> {
    let coords = parse_array(value)?
        .iter()
        .map(parse_coord)
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

pub(crate) fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = parse_array(value)?
        .iter()
        .map(parse_line)
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let exterior = rings.next().context("polygon without exterior ring")?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Encode features as a GeoJSON FeatureCollection.
pub fn to_feature_collection(features: &[Feature]) -> Value {
    let features: Vec<Value> = features
        .iter()
        .map(|feature| {
            json!({
                "type": "Feature",
                "geometry": geojson_geometry(&feature.geometry),
                "properties": Value::Object(feature.attributes.clone()),
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Decode a GeoJSON FeatureCollection, skipping features that fail to parse.
pub fn from_feature_collection(value: &Value) -> Vec<Feature> {
    value
        .get("features")
        .and_then(Value::as_array)
        .map(|features| {
            features
                .iter()
                .filter_map(|feature| {
                    let geometry = parse_geojson_geometry(feature.get("geometry")?).ok()?;
                    let attributes = feature
                        .get("properties")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    Some(Feature {
                        geometry,
                        attributes,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{coord, Rect};

    pub(crate) fn square(x0: f64, y0: f64, side: f64) -> MultiPolygon<f64> {
        rect(x0, y0, x0 + side, y0 + side)
    }

    pub(crate) fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }).to_polygon()
        ])
    }

    #[test]
    fn overlap_pct_is_fraction_of_parcel() {
        let parcel = square(0.0, 0.0, 100.0);
        let half = rect(0.0, 0.0, 50.0, 100.0);
        let outside = square(500.0, 500.0, 10.0);
        let pct = overlap_pct(&parcel, [&half, &outside]);
        assert!((pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn safe_union_merges_and_handles_empty_input() {
        assert!(safe_union(std::iter::empty()).is_none());
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 0.0, 15.0, 10.0);
        let merged = safe_union([&a, &b]).unwrap();
        assert!((merged.unsigned_area() - 150.0).abs() < 1e-6);
    }

    #[test]
    fn inset_collapses_small_areas() {
        let lot = square(0.0, 0.0, 40.0);
        assert!(inset(&lot, 25.0).0.is_empty());
        let shrunk = inset(&lot, 5.0);
        assert!((shrunk.unsigned_area() - 900.0).abs() < 1.0);
    }

    #[test]
    fn buffering_a_line_produces_area_but_zero_distance_does_not() {
        let stream = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (100.0, 0.0)]));
        assert!(buffer(&stream, 0.0).0.is_empty());
        let corridor = buffer(&stream, 10.0);
        assert!(corridor.unsigned_area() > 2000.0);
    }

    #[test]
    fn query_geom_uses_exterior_ring_in_canonical_crs() {
        let query = parcel_query_geom(&square(0.0, 0.0, 10.0));
        assert_eq!(query["spatialReference"]["wkid"], 2285);
        assert_eq!(query["rings"][0].as_array().unwrap().len(), 5);
    }

    #[test]
    fn perimeter_counts_holes_and_nearest_point_reports_distance() {
        let outer = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 50.0 }).to_polygon();
        let hole = Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 20.0, y: 20.0 }).to_polygon();
        let holed = MultiPolygon::new(vec![Polygon::new(
            outer.exterior().clone(),
            vec![hole.exterior().clone()],
        )]);
        assert!((perimeter(&holed) - 340.0).abs() < 1e-9);

        let road = Geometry::LineString(LineString::from(vec![(0.0, -30.0), (100.0, -30.0)]));
        let (at, distance) = nearest_point(&road, Point::new(40.0, 10.0)).expect("closest");
        assert_eq!(at, Point::new(40.0, -30.0));
        assert!((distance - 40.0).abs() < 1e-9);
    }

    #[test]
    fn geometry_distance_checks_vertices_both_ways() {
        let parcel = Geometry::MultiPolygon(square(0.0, 0.0, 100.0));
        let shore = Geometry::LineString(LineString::from(vec![(150.0, -50.0), (150.0, 150.0)]));
        let d = geometry_distance(&parcel, &shore).unwrap();
        assert!((d - 50.0).abs() < 1e-9);
    }

    #[test]
    fn feature_collection_survives_geojson_encoding() {
        let feature = Feature::new(Geometry::MultiPolygon(square(0.0, 0.0, 10.0)))
            .with_attribute("ZONE", "R-5");
        let encoded = to_feature_collection(std::slice::from_ref(&feature));
        let decoded = from_feature_collection(&encoded);
        assert_eq!(decoded, vec![feature]);
    }

    #[test]
    fn feature_text_skips_null_and_blank_fields() {
        let feature = Feature::new(Geometry::Point(Point::new(0.0, 0.0)))
            .with_attribute("ZONE", Value::Null)
            .with_attribute("ZONE_CODE", " ")
            .with_attribute("ZONING", "R-7200");
        assert_eq!(
            feature.text(&["ZONE", "ZONE_CODE", "ZONING"]).as_deref(),
            Some("R-7200")
        );
        assert_eq!(feature.number(&["ZONING"]), None);
    }
}
