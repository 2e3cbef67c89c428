//! FEMA flood hazard zones.
use super::{buffered, footprints, parcel_geometry, query_parcel};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::geometry;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use tracing::info;

const ZONE_FIELDS: &[&str] = &["FLD_ZONE", "ZONE_SUBTY"];
const HIGH_RISK_ZONES: &[&str] = &["A", "AE", "AO", "AH"];
const ENTIRE_PARCEL_PCT: f64 = 0.90;

/// Only high-risk zones become excluded area; 500-year zones are informational.
pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let zones = query_parcel(env, &env.config.services.flood, parcel)?;

    let mut delta = ContextDelta::new();
    let mut high_risk = Vec::new();
    for zone in &zones {
        let code = zone.text(ZONE_FIELDS).unwrap_or_default().to_ascii_uppercase();
        if HIGH_RISK_ZONES.contains(&code.as_str()) {
            high_risk.push(buffered(zone, env.config.buffers.flood_ft));
        } else if code.contains('X') {
            delta.push_tag(tags::INFO_FEMA_500YR_FLOOD);
        }
    }

    let overlap = geometry::overlap_pct(parcel, &footprints(&high_risk));
    info!(zones = zones.len(), high_risk = high_risk.len(), overlap, "flood overlay");
    if !high_risk.is_empty() {
        delta.push_tag(tags::RISK_FEMA_100YR_FLOOD);
    }
    if overlap > ENTIRE_PARCEL_PCT {
        delta.push_tag(tags::RISK_ENTIRE_PARCEL_FLOODPLAIN);
    }
    Ok(delta
        .metric("flood_overlap_pct", overlap)
        .layer(ConstraintLayer::new(LayerKind::Flood, high_risk)))
}
