//! Layout scoring and ranking.
use super::PipelineEnv;
use crate::config::ScoringWeights;
use crate::context::{AnalysisContext, ContextDelta, LotLayout};
use crate::tags;
use crate::util::round_to;
use anyhow::Result;
use tracing::info;

const BASE_SCORE: f64 = 50.0;
const LOT_COUNT_CAP: usize = 8;

/// Score in `[0, 100]`, rounded to cents.
pub fn score_layout(layout: &LotLayout, weights: &ScoringWeights) -> f64 {
    let lots = layout.lot_count().min(LOT_COUNT_CAP) as f64;
    let mut score = BASE_SCORE + lots / LOT_COUNT_CAP as f64 * weights.lot_count;
    if layout.tags.any_with_prefix("RISK_STORMWATER") {
        score += weights.constraint_penalty;
    }
    if layout.tags.any_with_prefix("RISK_DRIVEWAY") {
        score += weights.driveway_penalty;
    }
    if layout.tags.contains(tags::RISK_TIGHT_BUILDING_ENVELOPE) {
        score += weights.envelope_penalty;
    }
    if layout.tags.contains(tags::INFO_SHORT_PLAT) {
        score += weights.short_plat_bonus;
    }
    round_to(score.clamp(0.0, 100.0), 2)
}

/// Scores every layout and sorts them best first; ties keep creation order.
pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let mut layouts = ctx.layouts.clone();
    for layout in &mut layouts {
        layout.score = Some(score_layout(layout, &env.config.scoring));
    }
    layouts.sort_by(|a, b| {
        b.score
            .unwrap_or_default()
            .total_cmp(&a.score.unwrap_or_default())
    });

    let mut delta = ContextDelta::new();
    if let Some((best, score)) = layouts
        .first()
        .and_then(|layout| layout.score.map(|score| (layout, score)))
    {
        info!(best = %best.id, score, layouts = layouts.len(), "layouts ranked");
        delta.push_tag(tags::with_value(
            tags::SCORE_SUBDIVISION_FEASIBILITY,
            score.trunc() as i64,
        ));
        delta.push_tag(tags::with_value(tags::SCORE_BEST_LAYOUT, &best.id));
    }
    Ok(delta.layouts(layouts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use crate::context::Strategy;
    use crate::geometry::tests::square;
    use crate::pipeline::tests::with_env;

    fn layout(id: &str, lots: usize, tags: &[&str]) -> LotLayout {
        let mut layout = LotLayout::new(
            id.to_string(),
            Strategy::MaxLots,
            vec![square(0.0, 0.0, 90.0); lots],
        );
        for tag in tags {
            layout.tags.insert(*tag);
        }
        layout
    }

    #[test]
    fn score_combines_lot_count_penalties_and_bonus() {
        let weights = ScoringWeights::default();
        let clean = layout("a", 3, &[tags::INFO_SHORT_PLAT]);
        assert_eq!(score_layout(&clean, &weights), 71.25);

        let troubled = layout(
            "b",
            3,
            &[
                tags::RISK_STORMWATER_CONSTRAINED,
                tags::RISK_DRIVEWAY_INFEASIBLE,
                tags::RISK_TIGHT_BUILDING_ENVELOPE,
            ],
        );
        assert_eq!(score_layout(&troubled, &weights), 0.0);
    }

    #[test]
    fn score_is_clamped_high() {
        let weights = ScoringWeights {
            lot_count: 500.0,
            ..ScoringWeights::default()
        };
        assert_eq!(score_layout(&layout("a", 20, &[]), &weights), 100.0);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let mut ctx = AnalysisContext::new("P1");
        ctx.layouts = vec![
            layout("two_1", 2, &[tags::INFO_SHORT_PLAT]),
            layout("three_2", 3, &[tags::INFO_SHORT_PLAT]),
            layout("three_3", 3, &[tags::INFO_SHORT_PLAT]),
        ];
        let delta = with_env(|env| run(&ctx, env)).expect("scoring");
        let ids: Vec<String> = delta
            .layouts
            .clone()
            .expect("layouts")
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec!["three_2", "three_3", "two_1"]);
        assert!(delta.has_tag("SCORE_BEST_LAYOUT:three_2"));
        assert!(delta.has_tag("SCORE_SUBDIVISION_FEASIBILITY:71"));
    }

    #[test]
    fn summary_score_tag_truncates_the_fraction() {
        let mut ctx = AnalysisContext::new("P1");
        ctx.layouts = vec![layout("five_1", 5, &[])];
        let delta = with_env(|env| run(&ctx, env)).expect("scoring");
        let best = delta.layouts.as_ref().and_then(|l| l.first()).expect("best");
        assert_eq!(best.score, Some(68.75));
        assert!(delta.has_tag("SCORE_SUBDIVISION_FEASIBILITY:68"));
    }
}
