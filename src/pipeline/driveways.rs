//! Straight-line driveways from each lot to the nearest road.
use super::PipelineEnv;
use crate::context::{AnalysisContext, ContextDelta, Driveway, LayerKind};
use crate::geometry::{self, Feature};
use crate::tags;
use anyhow::Result;
use geo::{Centroid, LineString, Point};
use tracing::info;

pub const MAX_DRIVEWAY_FT: f64 = 200.0;
/// Mean grade, in percent, above which driveways are flagged steep.
pub const STEEP_GRADE_PCT: f64 = 12.0;

/// Nearest point on any road to `from`.
pub fn nearest_road_point(roads: &[Feature], from: Point<f64>) -> Option<(Point<f64>, f64)> {
    roads
        .iter()
        .filter_map(|road| geometry::nearest_point(&road.geometry, from))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

pub fn run(ctx: &AnalysisContext, _env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let roads: &[Feature] = ctx
        .layer(LayerKind::Roads)
        .map(|layer| layer.features.as_slice())
        .unwrap_or_default();
    // Terrain proxy until driveway-profile elevation sampling exists.
    let grade = ctx.metrics.get("slope_mean_pct").copied();

    let mut delta = ContextDelta::new();
    let mut layouts = ctx.layouts.clone();
    for layout in &mut layouts {
        if roads.is_empty() {
            layout.tags.insert(tags::RISK_DRIVEWAY_INFEASIBLE);
            delta.push_tag(tags::RISK_DRIVEWAY_INFEASIBLE);
            continue;
        }
        let mut driveways = Vec::with_capacity(layout.lot_count());
        for (lot_index, lot) in layout.lots.iter().enumerate() {
            let Some(centroid) = lot.centroid() else {
                continue;
            };
            let Some((access, length_ft)) = nearest_road_point(roads, centroid) else {
                continue;
            };
            driveways.push(Driveway {
                lot_index,
                path: LineString::from(vec![centroid.0, access.0]),
                length_ft,
            });
        }
        if driveways.len() < layout.lot_count()
            || driveways.iter().any(|d| d.length_ft > MAX_DRIVEWAY_FT)
        {
            layout.tags.insert(tags::RISK_DRIVEWAY_INFEASIBLE);
            delta.push_tag(tags::RISK_DRIVEWAY_INFEASIBLE);
        }
        if grade.is_some_and(|g| g > STEEP_GRADE_PCT) {
            layout.tags.insert(tags::RISK_DRIVEWAY_STEEP);
            delta.push_tag(tags::RISK_DRIVEWAY_STEEP);
        }
        let total: f64 = driveways.iter().map(|d| d.length_ft).sum();
        layout
            .tags
            .insert(tags::with_value(tags::INFO_DRIVEWAY_LENGTH, total.trunc() as i64));
        layout.driveways = driveways;
    }
    info!(roads = roads.len(), layouts = layouts.len(), "driveways routed");
    Ok(delta.layouts(layouts))
}
