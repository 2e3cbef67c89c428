//! Comprehensive-plan future land use. Reference layer only.
use super::{parcel_geometry, query_parcel};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use tracing::info;

const DESIGNATION_FIELDS: &[&str] = &["DESIGNATION", "FLU_DESC", "LABEL"];

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let designations = query_parcel(env, &env.config.services.future_land_use, parcel)?;

    let mut delta = ContextDelta::new();
    for feature in &designations {
        if let Some(designation) = feature.text(DESIGNATION_FIELDS) {
            delta.push_tag(tags::with_value(tags::INFO_FLU_DESIGNATION, designation));
        }
    }
    if let Some(zone) = ctx
        .zoning_code
        .as_deref()
        .filter(|_| !designations.is_empty())
    {
        let zone = zone.to_ascii_uppercase();
        let mentioned = designations
            .iter()
            .any(|feature| feature.attribute_text().to_ascii_uppercase().contains(&zone));
        if !mentioned {
            delta.push_tag(tags::INFO_FLU_ZONING_MISMATCH);
        }
    }
    info!(designations = designations.len(), "future land use overlay");
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Flu, designations)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::square;
    use crate::geometry::Feature;
    use crate::pipeline::overlays::tests::{collection, context_with_parcel, OverlayHarness};
    use geo::Geometry;
    use serde_json::json;

    fn flu(designation: &str, zones: &str) -> Feature {
        Feature::new(Geometry::MultiPolygon(square(0.0, 0.0, 300.0)))
            .with_attribute("DESIGNATION", designation)
            .with_attribute("IMPLEMENTING_ZONES", zones)
    }

    #[test]
    fn designation_matching_zone_is_not_a_mismatch() {
        let harness = OverlayHarness::new(json!({
            "flu": collection(vec![flu("ULDR", "R-7200, R-8400, R-9600")])
        }));
        let mut ctx = context_with_parcel(square(0.0, 0.0, 200.0));
        ctx.zoning_code = Some("r-9600".to_string());

        let delta = harness.run(run, &ctx);
        assert_eq!(delta.tags, vec!["INFO_FLU_DESIGNATION:ULDR".to_string()]);
    }

    #[test]
    fn zone_absent_from_designation_is_flagged() {
        let harness = OverlayHarness::new(json!({
            "flu": collection(vec![flu("Rural Residential", "R-5")])
        }));
        let mut ctx = context_with_parcel(square(0.0, 0.0, 200.0));
        ctx.zoning_code = Some("R-7200".to_string());

        let delta = harness.run(run, &ctx);
        assert!(delta.has_tag(tags::INFO_FLU_ZONING_MISMATCH));
    }
}
