//! Per-layout development cost estimates.
use super::PipelineEnv;
use crate::config::CostRates;
use crate::context::{AnalysisContext, ContextDelta, CostEstimate, LotLayout};
use crate::util::round_to;
use anyhow::Result;
use tracing::info;

pub const SQFT_PER_ACRE: f64 = 43_560.0;

pub fn estimate(layout: &LotLayout, buildable_sqft: f64, rates: &CostRates) -> CostEstimate {
    let cents = |value: f64| round_to(value, 2);
    let mut estimate = CostEstimate {
        survey_engineering: cents(rates.survey_engineering),
        plat_application: cents(rates.plat_application),
        road: cents(layout.driveway_length_ft() * rates.road_per_ft),
        utilities: cents(layout.lot_count() as f64 * rates.utility_per_lot),
        stormwater: cents(rates.stormwater_base),
        clearing: cents(buildable_sqft / SQFT_PER_ACRE * rates.clearing_per_acre),
        total: 0.0,
    };
    estimate.total = cents(
        estimate.survey_engineering
            + estimate.plat_application
            + estimate.road
            + estimate.utilities
            + estimate.stormwater
            + estimate.clearing,
    );
    estimate
}

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let buildable = ctx.buildable_area();
    let mut layouts = ctx.layouts.clone();
    for layout in &mut layouts {
        let cost = estimate(layout, buildable, &env.config.costs);
        info!(layout = %layout.id, total = cost.total, "cost estimate");
        layout.cost = Some(cost);
    }
    Ok(ContextDelta::new().layouts(layouts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Driveway, Strategy};
    use crate::geometry::tests::square;
    use geo::LineString;

    #[test]
    fn total_is_sum_of_components() {
        let mut layout = LotLayout::new(
            "equal_split_1".into(),
            Strategy::EqualSplit,
            vec![square(0.0, 0.0, 90.0); 3],
        );
        layout.driveways = (0..3)
            .map(|lot_index| Driveway {
                lot_index,
                path: LineString::from(vec![(0.0, 0.0), (0.0, 80.5)]),
                length_ft: 80.5,
            })
            .collect();
        let cost = estimate(&layout, 21_780.0, &CostRates::default());

        assert_eq!(cost.road, 53_130.0);
        assert_eq!(cost.utilities, 54_000.0);
        assert_eq!(cost.clearing, 11_000.0);
        let parts = cost.survey_engineering
            + cost.plat_application
            + cost.road
            + cost.utilities
            + cost.stormwater
            + cost.clearing;
        assert!((cost.total - parts).abs() < 1e-6);
        assert_eq!(cost.total, 221_130.0);
    }
}
