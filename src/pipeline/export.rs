//! Export artifacts: per-layer and per-layout GeoJSON, the combined package,
//! and the static map.
//!
//! Runs whether or not the pipeline stopped early, so partial results always
//! leave something on disk.
use super::{map, PipelineEnv};
use crate::context::{AnalysisContext, ContextDelta, LotLayout};
use crate::geometry::{self, Feature};
use crate::staging::{write_atomic_bytes, write_atomic_json};
use crate::util::sanitize_file_component;
use anyhow::{Context, Result};
use geo::{Area, Geometry};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PACKAGE_FILE: &str = "feasibility_package.json";
pub const MAP_FILE: &str = "feasibility_map.png";

struct Writer<'a> {
    dir: &'a Path,
    written: Vec<(String, PathBuf)>,
}

impl Writer<'_> {
    fn collection(&mut self, key: String, features: &[Feature]) -> Result<()> {
        let file = format!("{}.geojson", sanitize_file_component(&key));
        let path = self.dir.join(file);
        write_atomic_json(&path, &geometry::to_feature_collection(features))?;
        self.written.push((key, path));
        Ok(())
    }
}

fn indexed(index: usize, geometry: Geometry<f64>) -> Feature {
    Feature::new(geometry).with_attribute("lot_index", index)
}

fn lot_features(layout: &LotLayout) -> Vec<Feature> {
    layout
        .lots
        .iter()
        .enumerate()
        .map(|(index, lot)| {
            indexed(index, Geometry::MultiPolygon(lot.clone()))
                .with_attribute("area_sqft", lot.unsigned_area())
        })
        .collect()
}

fn driveway_features(layout: &LotLayout) -> Vec<Feature> {
    layout
        .driveways
        .iter()
        .map(|d| {
            indexed(d.lot_index, Geometry::LineString(d.path.clone()))
                .with_attribute("length_ft", d.length_ft)
        })
        .collect()
}

fn envelope_features(layout: &LotLayout) -> Vec<Feature> {
    layout
        .envelopes
        .iter()
        .map(|e| {
            indexed(e.lot_index, Geometry::MultiPolygon(e.footprint.clone()))
                .with_attribute("area_sqft", e.area_sqft)
        })
        .collect()
}

fn layout_json(layout: &LotLayout) -> Value {
    json!({
        "id": layout.id,
        "strategy": layout.strategy,
        "lot_count": layout.lot_count(),
        "score": layout.score,
        "tags": layout.tags,
        "cost_estimate": layout.cost,
        "driveway_length_ft": layout.driveway_length_ft(),
        "total_lot_area_sqft": layout.total_lot_area(),
        "buildable_after_stormwater_sqft": layout.buildable_after_stormwater_sqft,
        "lots": geometry::to_feature_collection(&lot_features(layout)),
    })
}

fn package_json(ctx: &AnalysisContext, files: &[(String, PathBuf)]) -> Value {
    let files: Map<String, Value> = files
        .iter()
        .map(|(key, path)| (key.clone(), Value::String(path.display().to_string())))
        .collect();
    json!({
        "parcel_id": ctx.parcel_id,
        "parcel": ctx.parcel.as_ref().map(|p| &p.attributes),
        "zoning_code": ctx.zoning_code,
        "zoning_rule": ctx.zoning_rule,
        "stopped": ctx.stop,
        "tags": ctx.tags,
        "warnings": ctx.warnings,
        "metrics": ctx.metrics,
        "buildable_sqft": ctx.buildable_area(),
        "best_layout": ctx.best_layout().map(|l| l.id.clone()),
        "layouts": ctx.layouts.iter().map(layout_json).collect::<Vec<_>>(),
        "files": files,
    })
}

/// Render and write the map; a failed render leaves an empty file.
fn write_map(ctx: &AnalysisContext, path: &Path) -> Result<()> {
    let bytes = match map::encode_png(&map::render_map(ctx)) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "map render failed");
            Vec::new()
        }
    };
    write_atomic_bytes(path, &bytes)
}

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let dir = env.output_dir;
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let mut writer = Writer {
        dir,
        written: Vec::new(),
    };

    if let Some(parcel) = &ctx.parcel {
        writer.collection("parcel".to_string(), std::slice::from_ref(&parcel.source))?;
    }
    let buildable = ctx
        .buildable
        .iter()
        .map(|area| Feature::new(Geometry::MultiPolygon(area.clone())))
        .collect::<Vec<_>>();
    writer.collection("buildable".to_string(), &buildable)?;
    for (kind, layer) in &ctx.constraint_layers {
        writer.collection(format!("constraint_{}", kind.name()), &layer.features)?;
    }
    for layout in &ctx.layouts {
        writer.collection(format!("{}_lots", layout.id), &lot_features(layout))?;
        writer.collection(format!("{}_driveways", layout.id), &driveway_features(layout))?;
        writer.collection(format!("{}_envelopes", layout.id), &envelope_features(layout))?;
    }

    let png = dir.join(MAP_FILE);
    write_map(ctx, &png)?;
    let package = dir.join(PACKAGE_FILE);
    write_atomic_json(&package, &package_json(ctx, &writer.written))?;
    info!(dir = %dir.display(), files = writer.written.len() + 2, "exports written");

    let mut delta = ContextDelta::new();
    delta.export_paths = writer.written;
    delta.export_paths.push(("output_dir".to_string(), dir.to_path_buf()));
    delta.export_paths.push(("png".to_string(), png));
    delta.export_paths.push(("package".to_string(), package));
    Ok(delta)
}
