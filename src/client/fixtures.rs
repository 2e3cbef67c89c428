//! Offline fixture selection.
//!
//! Layout of a fixture directory:
//!
//! - `parcel_feature.json`: parcel lookup payload
//! - `zoning_lookup.json`: zoning layer payload
//! - `constraints.json`: `{"layers": {"streams": {...}, ..., "default": {...}}}`
//! - `soils.json`: soil-survey tabular response (`{"Table": [...]}`)
//! - `slope_raster.json`: `{"width": w, "height": h, "values": [...]}`
//!
//! Missing files are not errors: they read as "no data" so a fixture set only
//! needs to describe what a scenario cares about.
use super::raster::RasterGrid;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;

const PARCEL_FILE: &str = "parcel_feature.json";
const ZONING_FILE: &str = "zoning_lookup.json";
const CONSTRAINTS_FILE: &str = "constraints.json";
const SOILS_FILE: &str = "soils.json";
const SLOPE_FILE: &str = "slope_raster.json";

/// Which fixture answers a given layer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKey {
    Parcel,
    Zoning,
    Layer(&'static str),
}

/// Match a service URL and layer id to its fixture.
///
/// Septic is checked before parcels since its service name contains
/// `Parcels`.
pub fn fixture_key(url: &str, layer: u32) -> FixtureKey {
    let url = url.to_ascii_lowercase();
    let has = |needle: &str| url.contains(needle);
    if has("zoning") {
        return FixtureKey::Zoning;
    }
    if has("septic") {
        return FixtureKey::Layer("septic");
    }
    if has("parcel") || has("house_number") {
        return FixtureKey::Parcel;
    }
    let name = if has("watercourse") || has("/nhd/") {
        "streams"
    } else if has("wetlands") {
        "wetlands"
    } else if has("nfhl") {
        "flood"
    } else if has("landslide") {
        "geology_landslide"
    } else if has("ground_response") {
        "geology_ground"
    } else if has("volcanic") {
        "geology_volcanic"
    } else if has("utility_districts") {
        if layer == 0 {
            "utilities_water"
        } else {
            "utilities_sewer"
        }
    } else if has("transportation") {
        "roads"
    } else if has("future_land_use") {
        "flu"
    } else if has("shoreline") {
        "shoreline"
    } else {
        "default"
    };
    FixtureKey::Layer(name)
}

#[derive(Debug, Clone)]
pub struct FixtureSet {
    dir: PathBuf,
}

impl FixtureSet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Payload for a layer query.
    pub fn layer_payload(&self, url: &str, layer: u32) -> Result<Value> {
        match fixture_key(url, layer) {
            FixtureKey::Parcel => self.read_or_empty(PARCEL_FILE),
            FixtureKey::Zoning => self.read_or_empty(ZONING_FILE),
            FixtureKey::Layer(name) => {
                let constraints = self.read_or_empty(CONSTRAINTS_FILE)?;
                let Some(layers) = constraints.get("layers") else {
                    return Ok(constraints);
                };
                Ok(layers
                    .get(name)
                    .or_else(|| layers.get("default"))
                    .cloned()
                    .unwrap_or_else(empty_collection))
            }
        }
    }

    pub fn soils_payload(&self) -> Result<Value> {
        self.read_or(SOILS_FILE, json!({ "Table": [] }))
    }

    pub fn slope_raster(&self) -> Result<RasterGrid> {
        let value = self.read_or(SLOPE_FILE, Value::Null)?;
        if value.is_null() {
            return Ok(RasterGrid::empty());
        }
        RasterGrid::from_json(&value).with_context(|| format!("decode {SLOPE_FILE}"))
    }

    fn read_or_empty(&self, name: &str) -> Result<Value> {
        self.read_or(name, empty_collection())
    }

    fn read_or(&self, name: &str, fallback: Value) -> Result<Value> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Ok(fallback);
        }
        let bytes = fs::read(&path).with_context(|| format!("read fixture {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse fixture {}", path.display()))
    }
}

fn empty_collection() -> Value {
    json!({ "type": "FeatureCollection", "features": [] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceEndpoints;

    #[test]
    fn default_endpoints_map_to_distinct_fixtures() {
        let services = ServiceEndpoints::default();
        assert_eq!(
            fixture_key(&services.parcel_sources[0].url, 0),
            FixtureKey::Parcel
        );
        assert_eq!(
            fixture_key(&services.parcel_sources[2].url, 0),
            FixtureKey::Parcel
        );
        assert_eq!(fixture_key(&services.zoning.url, 0), FixtureKey::Zoning);
        assert_eq!(
            fixture_key(&services.septic.url, services.septic.layer),
            FixtureKey::Layer("septic")
        );
        assert_eq!(
            fixture_key(&services.streams_fallback.url, 6),
            FixtureKey::Layer("streams")
        );
        assert_eq!(
            fixture_key(&services.water_districts.url, 0),
            FixtureKey::Layer("utilities_water")
        );
        assert_eq!(
            fixture_key(&services.sewer_districts.url, 1),
            FixtureKey::Layer("utilities_sewer")
        );
        assert_eq!(
            fixture_key(&services.future_land_use.url, 0),
            FixtureKey::Layer("flu")
        );
        assert_eq!(
            fixture_key(&services.ground_response.url, 0),
            FixtureKey::Layer("geology_ground")
        );
        assert_eq!(
            fixture_key("https://example.test/unknown/MapServer", 0),
            FixtureKey::Layer("default")
        );
    }

    #[test]
    fn missing_files_read_as_no_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixtures = FixtureSet::new(dir.path());
        let payload = fixtures
            .layer_payload("https://x/Watercourse/MapServer", 0)
            .expect("empty payload");
        assert_eq!(payload["features"], json!([]));
        assert!(fixtures.slope_raster().expect("no raster").is_empty());
        assert_eq!(fixtures.soils_payload().expect("no soils")["Table"], json!([]));
    }

    #[test]
    fn constraint_layers_fall_back_to_default_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let constraints = json!({
            "layers": {
                "roads": {"features": [{"geometry": {"x": 1.0, "y": 2.0}, "attributes": {}}]},
                "default": {"features": []}
            }
        });
        fs::write(dir.path().join(CONSTRAINTS_FILE), constraints.to_string())
            .expect("write constraints");
        let fixtures = FixtureSet::new(dir.path());
        let roads = fixtures
            .layer_payload("https://x/mp_Transportation/MapServer", 0)
            .expect("roads");
        assert_eq!(roads["features"].as_array().map(Vec::len), Some(1));
        let flood = fixtures
            .layer_payload("https://x/NFHL/MapServer", 28)
            .expect("flood");
        assert_eq!(flood["features"], json!([]));
    }
}
