//! Parcel resolution over the ordered source chain.
use super::PipelineEnv;
use crate::context::{AnalysisContext, ContextDelta, ParcelAttributes, ParcelRecord};
use crate::error::ParcelError;
use crate::geometry::{self, Feature};
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use tracing::{info, warn};

const JURISDICTION_FIELDS: &[&str] = &["CITY", "MUNICIPALITY", "JURISDICTION"];

/// First source with a polygonal match wins.
///
/// Returns [`ParcelError`] (inside `anyhow`) when every source answered and
/// none matched, or when the match sits inside a city. A source that fails
/// outright is skipped; if no later source matches, the run continues without
/// a parcel rather than claiming the parcel does not exist.
pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel_id = ctx.parcel_id.as_str();
    let mut source_errors = Vec::new();

    for source in &env.config.services.parcel_sources {
        let features = match env.client.query_by_parcel_id(source, parcel_id) {
            Ok(features) => features,
            Err(err) => {
                warn!(url = %source.url, error = %format!("{err:#}"), "parcel source failed");
                source_errors.push(format!("{err:#}"));
                continue;
            }
        };
        let Some(feature) = features
            .into_iter()
            .find(|feature| !geometry::polygonal(&feature.geometry).0.is_empty())
        else {
            continue;
        };

        if let Some(jurisdiction) = incorporated_jurisdiction(&feature) {
            return Err(ParcelError::Incorporated {
                parcel_id: parcel_id.to_string(),
                jurisdiction,
            }
            .into());
        }

        let record = parcel_record(parcel_id, feature);
        info!(
            parcel_id,
            url = %source.url,
            area_sqft = record.area_sqft(),
            "parcel resolved"
        );
        let mut delta = ContextDelta::new();
        delta.parcel = Some(record);
        return Ok(delta);
    }

    if source_errors.is_empty() {
        return Err(ParcelError::NotFound {
            parcel_id: parcel_id.to_string(),
        }
        .into());
    }
    Err(anyhow!(
        "no parcel source answered for {parcel_id}: {}",
        source_errors.join("; ")
    ))
}

/// Jurisdiction named on the record, unless every value is "unincorporated".
fn incorporated_jurisdiction(feature: &Feature) -> Option<String> {
    let values: BTreeSet<String> = JURISDICTION_FIELDS
        .iter()
        .filter_map(|field| feature.text(&[field]))
        .collect();
    if values.is_empty()
        || values
            .iter()
            .all(|value| value.eq_ignore_ascii_case("unincorporated"))
    {
        return None;
    }
    values
        .into_iter()
        .find(|value| !value.eq_ignore_ascii_case("unincorporated"))
}

fn parcel_record(parcel_id: &str, feature: Feature) -> ParcelRecord {
    let attributes = ParcelAttributes {
        parcel_id: feature
            .text(&["Parcel_ID", "PARCEL_ID"])
            .unwrap_or_else(|| parcel_id.to_string()),
        gis_acres: feature.number(&["GIS_ACRES"]),
        gis_sq_ft: feature.number(&["GIS_SQ_FT"]),
        address: feature.text(&["SITUS_ADDRESS", "address", "FULL_ADDRESS"]),
        owner: feature.text(&["OWNER_NAME", "owner", "OWNER"]),
    };
    ParcelRecord {
        geometry: geometry::polygonal(&feature.geometry),
        attributes,
        source: feature,
    }
}
