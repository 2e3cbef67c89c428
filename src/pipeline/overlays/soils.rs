//! Soil survey drainage and septic-limited parcels.
use super::{parcel_geometry, query_parcel};
use crate::context::{AnalysisContext, ContextDelta};
use crate::crs;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::{anyhow, Result};
use geo::Centroid;
use serde_json::Value;
use tracing::{info, warn};

/// Major components of the map units under a WGS84 point.
fn soil_sql(lon: f64, lat: f64) -> String {
    format!(
        "SELECT TOP 5 mu.mukey, mu.muname, c.drainagecl \
         FROM mapunit mu INNER JOIN component c ON c.mukey = mu.mukey \
         WHERE mu.mukey IN (SELECT * FROM SDA_Get_Mukey_from_intersection_with_WktWgs84('POINT ({lon:.6} {lat:.6})')) \
         AND c.majcompflag = 'Yes'"
    )
}

fn row_text(row: &Value) -> String {
    match row {
        Value::Array(cells) => cells
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .values()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// The tabular lookup degrades to `RISK_DATA_INCOMPLETE`; the septic layer
/// query is a normal phase failure.
pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let centroid = parcel
        .centroid()
        .ok_or_else(|| anyhow!("parcel has no centroid"))?;
    let lonlat = crs::canonical_to_lonlat(centroid.0);
    let mut delta = ContextDelta::new();

    match env
        .client
        .tabular_query(&env.config.services.soils_tabular, &soil_sql(lonlat.x, lonlat.y))
    {
        Ok(rows) if !rows.is_empty() => {
            delta.push_tag(tags::INFO_SOIL_TYPE);
            let poorly_drained = rows
                .iter()
                .any(|row| row_text(row).to_ascii_lowercase().contains("poor"));
            if poorly_drained {
                delta.push_tag(tags::RISK_POOR_SOIL_DRAINAGE);
            }
            info!(rows = rows.len(), poorly_drained, "soil survey");
        }
        Ok(_) => {
            delta.push_tag(tags::RISK_DATA_INCOMPLETE);
            delta.warnings.push("soils: no survey rows for parcel".to_string());
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "soil survey query failed");
            delta.push_tag(tags::RISK_DATA_INCOMPLETE);
            delta.warnings.push(format!("soils: {err:#}"));
        }
    }

    let septic = query_parcel(env, &env.config.services.septic, parcel)?;
    if !septic.is_empty() {
        delta.push_tag(tags::RISK_SEPTIC_LIMITATION);
    }
    Ok(delta)
}
