//! Constraint overlay phases.
//!
//! Each overlay queries its layers around the parcel, buffers hazards by a
//! type-specific distance, stores the result as a [`ConstraintLayer`], and
//! tags the parcel when overlap crosses a threshold. Overlays are independent
//! of each other and may run in any order.
pub mod flood;
pub mod flu;
pub mod geology;
pub mod roads;
pub mod shoreline;
pub mod slope;
pub mod soils;
pub mod streams;
pub mod utilities;
pub mod wetlands;

use super::PipelineEnv;
use crate::client::LayerQuery;
use crate::config::LayerRef;
use crate::context::AnalysisContext;
use crate::geometry::{self, Feature};
use anyhow::{anyhow, Result};
use geo::{Geometry, MultiPolygon};

/// Overlap fraction above which a buffer counts as impacting the parcel.
pub const BUFFER_IMPACT_PCT: f64 = 0.20;

pub(crate) fn parcel_geometry(ctx: &AnalysisContext) -> Result<&MultiPolygon<f64>> {
    ctx.parcel_geometry()
        .ok_or_else(|| anyhow!("no parcel geometry"))
}

/// Features of `layer` intersecting the parcel.
pub(crate) fn query_parcel(
    env: &PipelineEnv<'_>,
    layer: &LayerRef,
    parcel: &MultiPolygon<f64>,
) -> Result<Vec<Feature>> {
    env.client.query_feature_layer(
        layer,
        &LayerQuery::intersecting(geometry::parcel_query_geom(parcel)),
    )
}

/// Features of `layer` within `distance` feet of the parcel.
pub(crate) fn query_near(
    env: &PipelineEnv<'_>,
    layer: &LayerRef,
    parcel: &MultiPolygon<f64>,
    distance: f64,
) -> Result<Vec<Feature>> {
    let search = geometry::buffer(&Geometry::MultiPolygon(parcel.clone()), distance);
    query_parcel(env, layer, &search)
}

/// Replace a feature's geometry with its buffered footprint.
pub(crate) fn buffered(feature: &Feature, distance: f64) -> Feature {
    Feature {
        geometry: Geometry::MultiPolygon(geometry::buffer(&feature.geometry, distance)),
        attributes: feature.attributes.clone(),
    }
}

pub(crate) fn footprints(features: &[Feature]) -> Vec<MultiPolygon<f64>> {
    features
        .iter()
        .map(|feature| geometry::polygonal(&feature.geometry))
        .collect()
}
