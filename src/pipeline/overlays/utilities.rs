//! Public water and sewer availability.
use super::{parcel_geometry, query_parcel};
use crate::config::LayerRef;
use crate::context::{AnalysisContext, ContextDelta};
use crate::geometry;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::{anyhow, Result};
use geo::{Centroid, Contains};
use tracing::info;

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let centroid = parcel
        .centroid()
        .ok_or_else(|| anyhow!("parcel has no centroid"))?;
    let services = &env.config.services;
    let served = |layer: &LayerRef| -> Result<bool> {
        Ok(query_parcel(env, layer, parcel)?
            .iter()
            .any(|district| geometry::polygonal(&district.geometry).contains(&centroid)))
    };
    let water = served(&services.water_districts)?;
    let sewer = served(&services.sewer_districts)?;
    info!(water, sewer, "utility overlay");

    Ok(ContextDelta::new()
        .tag(if water {
            tags::INFO_PUBLIC_WATER_AVAILABLE
        } else {
            tags::RISK_WELL_REQUIRED
        })
        .tag(if sewer {
            tags::INFO_PUBLIC_SEWER_AVAILABLE
        } else {
            tags::RISK_SEPTIC_REQUIRED
        }))
}
