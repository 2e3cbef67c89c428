//! Building envelopes inside each lot.
use super::PipelineEnv;
use crate::config::ZoningRule;
use crate::context::{AnalysisContext, ContextDelta, Envelope};
use crate::geometry;
use crate::tags;
use anyhow::Result;
use geo::{Area, BooleanOps, MinimumRotatedRect, MultiPolygon};
use tracing::{debug, info};

pub const MIN_ENVELOPE_SQFT: f64 = 1500.0;
const MAX_SHRINK_STEPS: usize = 20;
const AREA_TOLERANCE_SQFT: f64 = 1.0;

/// Setback inset clipped to its minimum rotated rectangle, then shrunk until
/// it respects the coverage limit.
pub fn building_envelope(lot: &MultiPolygon<f64>, rule: &ZoningRule) -> MultiPolygon<f64> {
    let inset = geometry::inset(lot, rule.max_setback());
    if geometry::is_empty(&inset) {
        return geometry::empty_multipolygon();
    }
    let mut envelope = match inset.minimum_rotated_rect() {
        Some(rect) => inset.intersection(&MultiPolygon::new(vec![rect])),
        None => inset,
    };

    let max_area = lot.unsigned_area() * rule.max_lot_coverage_pct;
    for step in 0..MAX_SHRINK_STEPS {
        let area = envelope.unsigned_area();
        if area <= max_area + AREA_TOLERANCE_SQFT {
            break;
        }
        let perimeter = geometry::perimeter(&envelope);
        if perimeter <= 0.0 {
            break;
        }
        let shrink = (area - max_area) / perimeter;
        debug!(step, area, max_area, shrink, "shrinking envelope");
        envelope = geometry::inset(&envelope, shrink);
        if envelope.0.is_empty() {
            break;
        }
    }
    envelope
}

pub fn run(ctx: &AnalysisContext, _env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let rule = &ctx.zoning_rule;
    let mut delta = ContextDelta::new();
    let mut layouts = ctx.layouts.clone();
    for layout in &mut layouts {
        // Lots whose envelope collapses get none.
        layout.envelopes = layout
            .lots
            .iter()
            .enumerate()
            .filter_map(|(lot_index, lot)| {
                let footprint = building_envelope(lot, rule);
                if geometry::is_empty(&footprint) {
                    debug!(layout = %layout.id, lot_index, "no building envelope");
                    return None;
                }
                Some(Envelope {
                    lot_index,
                    area_sqft: footprint.unsigned_area(),
                    footprint,
                })
            })
            .collect();
        if layout
            .envelopes
            .iter()
            .any(|envelope| envelope.area_sqft < MIN_ENVELOPE_SQFT)
        {
            layout.tags.insert(tags::RISK_TIGHT_BUILDING_ENVELOPE);
            delta.push_tag(tags::RISK_TIGHT_BUILDING_ENVELOPE);
        }
    }
    info!(layouts = layouts.len(), "building envelopes");
    Ok(delta.layouts(layouts))
}
