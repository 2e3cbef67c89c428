//! Shoreline Management Act jurisdiction.
use super::{buffered, parcel_geometry, query_near};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::geometry;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use geo::Geometry;
use tracing::info;

/// Shoreline jurisdiction reaches this far landward.
pub const JURISDICTION_FT: f64 = 200.0;

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let shorelines = query_near(env, &env.config.services.shoreline, parcel, JURISDICTION_FT)?;
    let parcel_geom = Geometry::MultiPolygon(parcel.clone());
    let nearest = shorelines
        .iter()
        .filter_map(|shore| geometry::geometry_distance(&parcel_geom, &shore.geometry))
        .reduce(f64::min);
    info!(shorelines = shorelines.len(), nearest_ft = ?nearest, "shoreline overlay");

    let mut delta = ContextDelta::new();
    if nearest.is_some_and(|d| d <= JURISDICTION_FT) {
        delta.push_tag(tags::RISK_SHORELINE_JURISDICTION);
    }
    let distance = env.config.buffers.shoreline_ft;
    let footprints = shorelines
        .iter()
        .map(|shore| buffered(shore, distance))
        .filter(|shore| !geometry::polygonal(&shore.geometry).0.is_empty())
        .collect();
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Shoreline, footprints)))
}
