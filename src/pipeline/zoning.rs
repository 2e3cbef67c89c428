//! Zoning resolution and the 2x minimum-lot gate.
use super::PipelineEnv;
use crate::client::LayerQuery;
use crate::context::{AnalysisContext, ContextDelta};
use crate::geometry::{self, Feature};
use crate::tags;
use anyhow::{anyhow, Result};
use geo::{Centroid, Contains, Point};
use tracing::{debug, info};

const ZONE_FIELDS: &[&str] = &["ZONE", "ZONE_CODE", "ZONING", "ZONECLASS"];

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = ctx
        .parcel
        .as_ref()
        .ok_or_else(|| anyhow!("no parcel geometry"))?;
    let centroid = parcel
        .geometry
        .centroid()
        .ok_or_else(|| anyhow!("parcel has no centroid"))?;
    let layer = &env.config.services.zoning;

    let mut zones = env.client.query_feature_layer(
        layer,
        &LayerQuery::intersecting(geometry::parcel_query_geom(&parcel.geometry)),
    )?;
    if zones.is_empty() {
        debug!("no intersecting zoning; falling back to centroid containment");
        zones = env
            .client
            .query_feature_layer(layer, &LayerQuery::all())?
            .into_iter()
            .filter(|zone| contains_point(zone, centroid))
            .collect();
    }

    let mut delta = ContextDelta::new();
    let zone = zones
        .iter()
        .find(|zone| contains_point(zone, centroid))
        .or_else(|| zones.first());
    let code = zone.and_then(|zone| zone.text(ZONE_FIELDS));
    let rule = match &code {
        Some(code) => env.config.zoning_rule(code).unwrap_or_default(),
        None => {
            delta.push_tag(tags::RISK_DATA_INCOMPLETE);
            delta.warnings.push("zoning: no zone found for parcel".to_string());
            Default::default()
        }
    };

    let area = parcel.area_sqft();
    let ratio = area / rule.min_lot_sqft;
    info!(
        zone = code.as_deref().unwrap_or("none"),
        min_lot_sqft = rule.min_lot_sqft,
        area_sqft = area,
        ratio,
        "zoning resolved"
    );
    if ratio < 2.0 {
        delta.push_tag(tags::RISK_NOT_SUBDIVIDABLE);
        delta.stop = true;
    }
    delta.zoning_code = code;
    delta.zoning_rule = Some(rule);
    Ok(delta.metric("parcel_area_sqft", area))
}

fn contains_point(feature: &Feature, point: Point<f64>) -> bool {
    geometry::polygonal(&feature.geometry).contains(&point)
}
