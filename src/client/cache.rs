//! Content-addressed on-disk cache of layer query results.
//!
//! Entries are GeoJSON feature collections tagged with the CRS they were
//! written in. Keys hash the endpoint plus sorted request parameters, so two
//! runs issuing the same query share one file. Reads and writes are
//! best-effort: a broken or unwritable cache never fails a query.
use crate::crs::{self, CANONICAL_EPSG};
use crate::geometry::{self, Feature};
use crate::staging;
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Entries without a recorded CRS are assumed geographic.
const LEGACY_ENTRY_EPSG: u32 = 4326;

#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Hash of the normalized request.
    pub fn key(endpoint: &str, params: &BTreeMap<String, String>) -> String {
        let normalized = json!({ "endpoint": endpoint, "params": params });
        sha256_hex(normalized.to_string().as_bytes())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.geojson"))
    }

    /// Cached features for `key`, reprojected into the canonical CRS.
    pub fn load(&self, key: &str) -> Option<Vec<Feature>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return None;
        }
        match read_entry(&path) {
            Ok(features) => {
                debug!(cache_key = key, count = features.len(), "feature cache hit");
                Some(features)
            }
            Err(err) => {
                warn!(cache_key = key, error = %format!("{err:#}"), "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Persist a non-empty result; failures are logged and swallowed.
    pub fn store(&self, key: &str, features: &[Feature]) {
        if features.is_empty() {
            return;
        }
        let mut collection = geometry::to_feature_collection(features);
        if let Some(object) = collection.as_object_mut() {
            object.insert("crs_epsg".to_string(), json!(CANONICAL_EPSG));
        }
        let path = self.entry_path(key);
        match staging::write_atomic_json(&path, &collection) {
            Ok(()) => debug!(cache_key = key, count = features.len(), "feature cache stored"),
            Err(err) => warn!(cache_key = key, error = %format!("{err:#}"), "feature cache write failed"),
        }
    }
}

fn read_entry(path: &Path) -> Result<Vec<Feature>> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes).context("parse cache entry")?;
    let epsg = value
        .get("crs_epsg")
        .and_then(Value::as_u64)
        .and_then(|code| u32::try_from(code).ok())
        .unwrap_or(LEGACY_ENTRY_EPSG);
    geometry::from_feature_collection(&value)
        .into_iter()
        .map(|feature| {
            let projected = crs::to_canonical(&feature.geometry, epsg)?;
            Ok(Feature {
                geometry: projected,
                attributes: feature.attributes,
            })
        })
        .collect()
}
