//! Candidate lot layouts.
//!
//! Every strategy partitions the same buildable area into `n` equal-width
//! vertical strips; strategies differ only in the `n` they aim for. Pieces
//! failing the zone's minimum area or width are dropped, and a strategy with
//! fewer than two surviving lots produces no layout.
use super::PipelineEnv;
use crate::config::ZoningRule;
use crate::context::{AnalysisContext, ContextDelta, LotLayout, Strategy};
use crate::tags;
use anyhow::{anyhow, Result};
use geo::{coord, Area, BooleanOps, BoundingRect, MultiPolygon, Rect};
use tracing::{debug, info};

pub const SHORT_PLAT_MAX_LOTS: usize = 4;

/// Largest lot count the buildable area could carry at the zone minimum.
pub fn max_lot_count(buildable_sqft: f64, rule: &ZoningRule) -> usize {
    if rule.min_lot_sqft <= 0.0 || !buildable_sqft.is_finite() {
        return 0;
    }
    (buildable_sqft / rule.min_lot_sqft).floor() as usize
}

/// Split `area` into `n` equal-width vertical strips.
pub fn vertical_strips(area: &MultiPolygon<f64>, n: usize) -> Vec<MultiPolygon<f64>> {
    let Some(bounds) = area.bounding_rect() else {
        return Vec::new();
    };
    if n == 0 {
        return Vec::new();
    }
    let step = bounds.width() / n as f64;
    (0..n)
        .map(|i| {
            let x0 = bounds.min().x + step * i as f64;
            let x1 = if i + 1 == n { bounds.max().x } else { x0 + step };
            let strip = Rect::new(
                coord! { x: x0, y: bounds.min().y },
                coord! { x: x1, y: bounds.max().y },
            );
            area.intersection(&MultiPolygon::new(vec![strip.to_polygon()]))
        })
        .collect()
}

/// Whether a piece meets the zone's minimum area and width.
pub fn is_valid_lot(lot: &MultiPolygon<f64>, rule: &ZoningRule) -> bool {
    let Some(bounds) = lot.bounding_rect() else {
        return false;
    };
    lot.unsigned_area() >= rule.min_lot_sqft
        && bounds.width().min(bounds.height()) >= rule.min_lot_width_ft
}

pub fn generate_layouts(buildable: &MultiPolygon<f64>, rule: &ZoningRule) -> Vec<LotLayout> {
    let max_lots = max_lot_count(buildable.unsigned_area(), rule);
    let mut layouts = Vec::new();
    for strategy in Strategy::ALL {
        let target = strategy.target_lots(max_lots);
        let lots: Vec<_> = vertical_strips(buildable, target)
            .into_iter()
            .filter(|lot| is_valid_lot(lot, rule))
            .collect();
        if lots.len() < 2 {
            debug!(strategy = strategy.as_str(), target, valid = lots.len(), "strategy discarded");
            continue;
        }
        let id = format!("{}_{}", strategy.as_str(), layouts.len() + 1);
        let mut layout = LotLayout::new(id, strategy, lots);
        layout.tags.insert(if layout.lot_count() <= SHORT_PLAT_MAX_LOTS {
            tags::INFO_SHORT_PLAT
        } else {
            tags::INFO_FORMAL_SUBDIVISION
        });
        layouts.push(layout);
    }
    layouts
}

pub fn run(ctx: &AnalysisContext, _env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let buildable = ctx
        .buildable
        .as_ref()
        .ok_or_else(|| anyhow!("buildable area not computed"))?;
    let layouts = generate_layouts(buildable, &ctx.zoning_rule);
    info!(
        layouts = layouts.len(),
        max_lots = max_lot_count(buildable.unsigned_area(), &ctx.zoning_rule),
        "layouts generated"
    );

    let mut delta = ContextDelta::new();
    if layouts.is_empty() {
        delta.push_tag(tags::RISK_NOT_SUBDIVIDABLE);
    }
    for layout in &layouts {
        for tag in layout.tags.iter() {
            delta.push_tag(tag);
        }
    }
    Ok(delta.layouts(layouts))
}
