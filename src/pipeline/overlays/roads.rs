//! Road frontage. Roads are a reference layer and stay unbuffered.
use super::{parcel_geometry, query_near};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::geometry::{self, Feature};
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use geo::{BooleanOps, MultiPolygon};
use tracing::info;

/// Boundary within this distance of a road counts as frontage.
pub const FRONTAGE_DISTANCE_FT: f64 = 50.0;
const MIN_FRONTAGE_FT: f64 = 40.0;
const FLAG_LOT_FRONTAGE_FT: f64 = 100.0;

/// Length of the parcel boundary lying within [`FRONTAGE_DISTANCE_FT`] of any road.
pub fn frontage_ft(parcel: &MultiPolygon<f64>, roads: &[Feature]) -> f64 {
    let corridors: Vec<_> = roads
        .iter()
        .map(|road| geometry::buffer(&road.geometry, FRONTAGE_DISTANCE_FT))
        .collect();
    let Some(corridor) = geometry::safe_union(&corridors) else {
        return 0.0;
    };
    geometry::multiline_length(&corridor.clip(&geometry::boundary(parcel), false))
}

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let roads = query_near(env, &env.config.services.roads, parcel, FRONTAGE_DISTANCE_FT)?;
    if roads.is_empty() {
        info!(roads = 0, "road overlay");
        return Ok(ContextDelta::new()
            .tag(tags::RISK_INSUFFICIENT_FRONTAGE)
            .layer(ConstraintLayer::new(LayerKind::Roads, roads)));
    }

    // Clip lengths can come back as -0.0.
    let frontage = frontage_ft(parcel, &roads).max(0.0) + 0.0;
    info!(roads = roads.len(), frontage_ft = frontage, "road overlay");

    let mut delta = ContextDelta::new()
        .metric("road_frontage_ft", frontage)
        .tag(tags::with_value(
            tags::INFO_ROAD_FRONTAGE_FT,
            frontage.trunc() as i64,
        ));
    if frontage < MIN_FRONTAGE_FT {
        delta.push_tag(tags::RISK_INSUFFICIENT_FRONTAGE);
    } else if frontage < FLAG_LOT_FRONTAGE_FT {
        delta.push_tag(tags::INFO_FLAG_LOT_CANDIDATE);
    }
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Roads, roads)))
}
