//! Buildable area: setback inset minus excluded constraint footprints.
use super::PipelineEnv;
use crate::context::{AnalysisContext, ContextDelta};
use crate::geometry;
use crate::tags;
use anyhow::{anyhow, Result};
use geo::{Area, BooleanOps, MultiPolygon};
use tracing::info;

/// Inset `parcel` by `setback`, then remove `excluded`.
pub fn buildable_area(
    parcel: &MultiPolygon<f64>,
    setback: f64,
    excluded: &[MultiPolygon<f64>],
) -> MultiPolygon<f64> {
    let inset = geometry::inset(parcel, setback);
    if geometry::is_empty(&inset) {
        return geometry::empty_multipolygon();
    }
    match geometry::safe_union(excluded) {
        Some(constraints) => {
            let remaining = inset.difference(&constraints);
            if geometry::is_empty(&remaining) {
                geometry::empty_multipolygon()
            } else {
                remaining
            }
        }
        None => inset,
    }
}

pub fn run(ctx: &AnalysisContext, _env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = ctx
        .parcel_geometry()
        .ok_or_else(|| anyhow!("no parcel geometry"))?;
    let rule = &ctx.zoning_rule;
    let buildable = buildable_area(parcel, rule.max_setback(), &ctx.excluded_footprints());
    let area = buildable.unsigned_area();
    info!(
        setback_ft = rule.max_setback(),
        buildable_sqft = area,
        parcel_sqft = parcel.unsigned_area(),
        "buildable area"
    );

    let mut delta = ContextDelta::new().metric("buildable_sqft", area);
    if geometry::is_empty(&buildable) || area < 2.0 * rule.min_lot_sqft {
        delta.push_tag(tags::RISK_NOT_SUBDIVIDABLE);
        delta.stop = true;
    }
    delta.buildable = Some(buildable);
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::{rect, square};

    #[test]
    fn setbacks_shrink_and_constraints_subtract() {
        let parcel = square(0.0, 0.0, 200.0);
        let clear = buildable_area(&parcel, 25.0, &[]);
        assert!((clear.unsigned_area() - 150.0 * 150.0).abs() < 50.0);

        let wetland = rect(0.0, 0.0, 200.0, 75.0);
        let constrained = buildable_area(&parcel, 25.0, &[wetland]);
        assert!(constrained.unsigned_area() < clear.unsigned_area());
        assert!((constrained.unsigned_area() - 150.0 * 100.0).abs() < 50.0);
    }

    #[test]
    fn buildable_never_exceeds_parcel() {
        let parcel = rect(0.0, 0.0, 300.0, 120.0);
        let buildable = buildable_area(&parcel, 10.0, &[square(1000.0, 1000.0, 10.0)]);
        assert!(buildable.unsigned_area() <= parcel.unsigned_area());
        assert!(geometry::is_empty(&buildable.difference(&parcel)));
    }

    #[test]
    fn collapsed_inset_is_empty() {
        let tiny = square(0.0, 0.0, 30.0);
        assert!(buildable_area(&tiny, 25.0, &[]).0.is_empty());
        let covered = buildable_area(&square(0.0, 0.0, 200.0), 10.0, &[square(-1.0, -1.0, 202.0)]);
        assert!(covered.0.is_empty());
    }
}
