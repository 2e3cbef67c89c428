//! Geologic hazards: landslide, liquefaction, lahar.
use super::{buffered, parcel_geometry, query_parcel};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use tracing::info;

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let services = &env.config.services;
    let landslide = query_parcel(env, &services.landslide, parcel)?;
    let liquefaction: Vec<_> = query_parcel(env, &services.ground_response, parcel)?
        .into_iter()
        .filter(|feature| feature.attribute_text().to_ascii_lowercase().contains("liquef"))
        .collect();
    let volcanic = query_parcel(env, &services.volcanic, parcel)?;
    info!(
        landslide = landslide.len(),
        liquefaction = liquefaction.len(),
        volcanic = volcanic.len(),
        "geology overlay"
    );

    let mut delta = ContextDelta::new();
    for (features, tag) in [
        (&landslide, tags::RISK_LANDSLIDE_HAZARD),
        (&liquefaction, tags::RISK_LIQUEFACTION),
        (&volcanic, tags::RISK_LAHAR_ZONE),
    ] {
        if !features.is_empty() {
            delta.push_tag(tag);
            delta.push_tag(tags::RISK_GEOLOGIC_HAZARD);
        }
    }

    let distance = env.config.buffers.geology_ft;
    let hazards = landslide
        .iter()
        .chain(&liquefaction)
        .chain(&volcanic)
        .map(|feature| buffered(feature, distance))
        .collect();
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Geology, hazards)))
}
