//! Wetland presence and category-specific buffers.
use super::{buffered, footprints, parcel_geometry, query_parcel, BUFFER_IMPACT_PCT};
use crate::config::WetlandBuffers;
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::geometry;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use tracing::info;

const CLASS_FIELDS: &[&str] = &["ATTRIBUTE", "WETLAND_TY"];

/// Hazard category derived from the classification code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WetlandCategory {
    I,
    II,
    III,
    IV,
}

impl WetlandCategory {
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        if code.starts_with("PFO") {
            WetlandCategory::I
        } else if code.starts_with("PEM") || code.starts_with("PSS") {
            WetlandCategory::II
        } else if code.starts_with('R') {
            WetlandCategory::III
        } else {
            WetlandCategory::IV
        }
    }

    pub fn buffer_ft(self, rules: &WetlandBuffers) -> f64 {
        match self {
            WetlandCategory::I => rules.category_i_ft,
            WetlandCategory::II => rules.category_ii_ft,
            WetlandCategory::III => rules.category_iii_ft,
            WetlandCategory::IV => rules.category_iv_ft,
        }
    }
}

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let wetlands = query_parcel(env, &env.config.services.wetlands, parcel)?;
    let rules = &env.config.buffers.wetlands;
    let buffers: Vec<_> = wetlands
        .iter()
        .map(|wetland| {
            let category = WetlandCategory::from_code(&wetland.text(CLASS_FIELDS).unwrap_or_default());
            buffered(wetland, category.buffer_ft(rules))
        })
        .collect();
    let overlap = geometry::overlap_pct(parcel, &footprints(&buffers));
    info!(wetlands = wetlands.len(), overlap, "wetland overlay");

    let mut delta = ContextDelta::new().metric("wetland_buffer_overlap_pct", overlap);
    if !wetlands.is_empty() {
        delta.push_tag(tags::RISK_WETLAND_PRESENT);
    }
    if overlap > BUFFER_IMPACT_PCT {
        delta.push_tag(tags::RISK_WETLAND_BUFFER_IMPACT);
    }
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Wetlands, buffers)))
}
