//! Stormwater detention reserve.
use super::PipelineEnv;
use crate::context::{AnalysisContext, ContextDelta};
use crate::tags;
use anyhow::Result;
use tracing::info;

/// Share of buildable area set aside for detention.
pub const RESERVE_FRACTION: f64 = 0.075;

pub fn run(ctx: &AnalysisContext, _env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let buildable = ctx.buildable_area();
    let reserve = buildable * RESERVE_FRACTION;
    let remaining = buildable - reserve;
    let min_lot = ctx.zoning_rule.min_lot_sqft;

    let mut delta = ContextDelta::new().metric("stormwater_reserve_sqft", reserve);
    let mut layouts = ctx.layouts.clone();
    for layout in &mut layouts {
        layout.buildable_after_stormwater_sqft = Some(remaining);
        if remaining < layout.lot_count() as f64 * min_lot {
            layout.tags.insert(tags::RISK_STORMWATER_CONSTRAINED);
            delta.push_tag(tags::RISK_STORMWATER_CONSTRAINED);
        }
    }
    info!(reserve_sqft = reserve, remaining_sqft = remaining, "stormwater reserve");
    Ok(delta.layouts(layouts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoningRule;
    use crate::context::{LotLayout, Strategy};
    use crate::geometry::tests::{rect, square};
    use crate::pipeline::tests::with_env;

    #[test]
    fn layouts_that_need_the_reserve_are_constrained() {
        let mut ctx = AnalysisContext::new("P1");
        ctx.zoning_rule = ZoningRule {
            min_lot_sqft: 7200.0,
            ..ZoningRule::default()
        };
        // 22,000 sq ft buildable leaves 20,350 after the reserve.
        ctx.buildable = Some(rect(0.0, 0.0, 220.0, 100.0));
        ctx.layouts = vec![
            LotLayout::new(
                "max_lots_1".into(),
                Strategy::MaxLots,
                vec![square(0.0, 0.0, 85.0); 3],
            ),
            LotLayout::new(
                "constraint_adaptive_2".into(),
                Strategy::ConstraintAdaptive,
                vec![square(0.0, 0.0, 85.0); 2],
            ),
        ];

        let delta = with_env(|env| run(&ctx, env)).expect("stormwater");
        let layouts = delta.layouts.clone().expect("layouts");
        assert!(layouts[0].tags.contains(tags::RISK_STORMWATER_CONSTRAINED));
        assert!(!layouts[1].tags.contains(tags::RISK_STORMWATER_CONSTRAINED));
        assert!(delta.has_tag(tags::RISK_STORMWATER_CONSTRAINED));
        let (name, reserve) = &delta.metrics[0];
        assert_eq!(name, "stormwater_reserve_sqft");
        assert!((reserve - 1650.0).abs() < 1e-6);
    }
}
