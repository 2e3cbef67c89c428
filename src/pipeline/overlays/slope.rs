//! Slope bands from a coarse elevation-service raster.
//!
//! The image service renders slope in degrees; cells are converted to percent
//! grade before banding. No constraint layer is stored: the raster is a proxy,
//! not a footprint.
use super::parcel_geometry;
use crate::client::raster::RasterGrid;
use crate::client::RasterRequest;
use crate::context::{AnalysisContext, ContextDelta};
use crate::crs::CANONICAL_EPSG;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::{anyhow, Result};
use geo::BoundingRect;
use serde_json::json;
use tracing::info;

const RASTER_SIZE: (u32, u32) = (300, 300);
const STEEP_PCT: f64 = 33.0;
const EROSION_PCT: f64 = 15.0;
const BAND_RISK_FRACTION: f64 = 0.20;

/// Fractions of valid cells in each grade band, plus the mean grade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeStats {
    pub steep_fraction: f64,
    pub erosion_fraction: f64,
    pub mean_pct: f64,
}

impl SlopeStats {
    /// `None` when the grid has no valid cells.
    pub fn from_degrees(grid: &RasterGrid) -> Option<Self> {
        let grades: Vec<f64> = grid
            .valid_values()
            .map(|degrees| f64::from(degrees).to_radians().tan().abs() * 100.0)
            .collect();
        if grades.is_empty() {
            return None;
        }
        let total = grades.len() as f64;
        let steep = grades.iter().filter(|g| **g >= STEEP_PCT).count() as f64;
        let erosion = grades
            .iter()
            .filter(|g| (EROSION_PCT..STEEP_PCT).contains(*g))
            .count() as f64;
        Some(Self {
            steep_fraction: steep / total,
            erosion_fraction: erosion / total,
            mean_pct: grades.iter().sum::<f64>() / total,
        })
    }
}

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let bbox = parcel
        .bounding_rect()
        .ok_or_else(|| anyhow!("parcel has no extent"))?;
    let request = RasterRequest {
        bbox,
        bbox_sr: CANONICAL_EPSG,
        size: RASTER_SIZE,
        rendering_rule: Some(json!({ "rasterFunction": "Slope Degrees" })),
    };
    let grid = env
        .client
        .export_image_raster(&env.config.services.slope_image, &request)?;

    let Some(stats) = SlopeStats::from_degrees(&grid) else {
        return Ok(ContextDelta::new()
            .tag(tags::RISK_DATA_INCOMPLETE)
            .warning("slope: no raster cells returned"));
    };
    info!(
        steep = stats.steep_fraction,
        erosion = stats.erosion_fraction,
        mean_pct = stats.mean_pct,
        "slope overlay"
    );

    let mut delta = ContextDelta::new()
        .metric("slope_pct_33", stats.steep_fraction)
        .metric("slope_pct_15_33", stats.erosion_fraction)
        .metric("slope_mean_pct", stats.mean_pct);
    if stats.steep_fraction > BAND_RISK_FRACTION {
        delta.push_tag(tags::RISK_STEEP_SLOPE_33PCT);
    }
    if stats.erosion_fraction > BAND_RISK_FRACTION {
        delta.push_tag(tags::RISK_EROSION_HAZARD_15PCT);
    }
    if stats.steep_fraction > 0.0 || stats.erosion_fraction > 0.0 {
        delta.push_tag(tags::INFO_SLOPE_CONSTRAINT);
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::square;
    use crate::pipeline::overlays::tests::{context_with_parcel, OverlayHarness};

    #[test]
    fn bands_use_percent_grade() {
        // 45 degrees is 100 %, 10 degrees is ~17.6 %, 5 degrees is ~8.7 %.
        let grid = RasterGrid::new(2, 2, vec![45.0, 10.0, 5.0, f32::NAN]).unwrap();
        let stats = SlopeStats::from_degrees(&grid).unwrap();
        assert!((stats.steep_fraction - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.erosion_fraction - 1.0 / 3.0).abs() < 1e-9);
        assert!(SlopeStats::from_degrees(&RasterGrid::empty()).is_none());
    }

    #[test]
    fn steep_raster_raises_both_tags() {
        let harness = OverlayHarness::new(json!({}));
        harness.write(
            "slope_raster.json",
            &json!({"width": 5, "height": 1, "values": [40.0, 40.0, 12.0, 12.0, 1.0]}),
        );
        let ctx = context_with_parcel(square(0.0, 0.0, 100.0));

        let delta = harness.run(run, &ctx);
        assert!(delta.has_tag(tags::RISK_STEEP_SLOPE_33PCT));
        assert!(delta.has_tag(tags::RISK_EROSION_HAZARD_15PCT));
        assert!(delta.has_tag(tags::INFO_SLOPE_CONSTRAINT));
    }

    #[test]
    fn missing_raster_is_incomplete_data() {
        let harness = OverlayHarness::new(json!({}));
        let ctx = context_with_parcel(square(0.0, 0.0, 100.0));

        let delta = harness.run(run, &ctx);
        assert_eq!(delta.tags, vec![tags::RISK_DATA_INCOMPLETE.to_string()]);
        assert!(delta.metrics.is_empty());
    }
}
