//! Per-run analysis state.
//!
//! One [`AnalysisContext`] exists per parcel run. Phases never mutate it
//! directly: each reads the context and returns a [`ContextDelta`], which the
//! orchestrator applies only when the phase succeeds. A failed phase therefore
//! leaves no partial writes behind.
use crate::config::ZoningRule;
use crate::geometry::{self, Feature};
use crate::tags::{self, TagSet};
use geo::{Area, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotFound,
    IncorporatedCity,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::NotFound => "not_found",
            RejectReason::IncorporatedCity => "incorporated_city",
        }
    }
}

/// Orchestrator progress. `Rejected` and `Infeasible` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    ParcelResolved,
    ZoningResolved,
    ConstraintsOverlaid,
    BuildableComputed,
    LayoutsGenerated,
    Refined,
    Scored,
    Costed,
    Exported,
    Rejected(RejectReason),
    Infeasible,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Exported | PipelineState::Rejected(_) | PipelineState::Infeasible
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::ParcelResolved => "parcel_resolved",
            PipelineState::ZoningResolved => "zoning_resolved",
            PipelineState::ConstraintsOverlaid => "constraints_overlaid",
            PipelineState::BuildableComputed => "buildable_computed",
            PipelineState::LayoutsGenerated => "layouts_generated",
            PipelineState::Refined => "refined",
            PipelineState::Scored => "scored",
            PipelineState::Costed => "costed",
            PipelineState::Exported => "exported",
            PipelineState::Rejected(reason) => return write!(f, "rejected({})", reason.as_str()),
            PipelineState::Infeasible => "infeasible",
        };
        f.write_str(label)
    }
}

/// Constraint layers kept on the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Streams,
    Wetlands,
    Flood,
    Geology,
    Roads,
    Flu,
    Shoreline,
}

impl LayerKind {
    pub const ALL: [LayerKind; 7] = [
        LayerKind::Streams,
        LayerKind::Wetlands,
        LayerKind::Flood,
        LayerKind::Geology,
        LayerKind::Roads,
        LayerKind::Flu,
        LayerKind::Shoreline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Streams => "streams",
            LayerKind::Wetlands => "wetlands",
            LayerKind::Flood => "flood",
            LayerKind::Geology => "geology",
            LayerKind::Roads => "roads",
            LayerKind::Flu => "flu",
            LayerKind::Shoreline => "shoreline",
        }
    }

    /// Reference layers are kept for context but never excluded from
    /// buildable area.
    pub fn is_reference(self) -> bool {
        matches!(self, LayerKind::Roads | LayerKind::Flu)
    }
}

/// Geometry of one constraint layer, already buffered for hazard layers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLayer {
    pub kind: LayerKind,
    pub features: Vec<Feature>,
}

impl ConstraintLayer {
    pub fn new(kind: LayerKind, features: Vec<Feature>) -> Self {
        Self { kind, features }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Polygonal footprint of every feature.
    pub fn footprints(&self) -> Vec<MultiPolygon<f64>> {
        self.features
            .iter()
            .map(|feature| geometry::polygonal(&feature.geometry))
            .filter(|area| !area.0.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParcelAttributes {
    pub parcel_id: String,
    pub gis_acres: Option<f64>,
    pub gis_sq_ft: Option<f64>,
    pub address: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    pub geometry: MultiPolygon<f64>,
    pub attributes: ParcelAttributes,
    /// The raw source record, kept for export.
    pub source: Feature,
}

impl ParcelRecord {
    /// Recorded area when the source carries one, else geometric area.
    pub fn area_sqft(&self) -> f64 {
        self.attributes
            .gis_sq_ft
            .filter(|sqft| *sqft > 0.0)
            .unwrap_or_else(|| self.geometry.unsigned_area())
    }
}

/// Named lot-partitioning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    MaxLots,
    EqualSplit,
    RoadOptimized,
    ConstraintAdaptive,
    Hybrid,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::MaxLots,
        Strategy::EqualSplit,
        Strategy::RoadOptimized,
        Strategy::ConstraintAdaptive,
        Strategy::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::MaxLots => "max_lots",
            Strategy::EqualSplit => "equal_split",
            Strategy::RoadOptimized => "road_optimized",
            Strategy::ConstraintAdaptive => "constraint_adaptive",
            Strategy::Hybrid => "hybrid",
        }
    }

    /// Lot count this strategy aims for given the area-bound maximum.
    pub fn target_lots(self, max_lots: usize) -> usize {
        match self {
            Strategy::MaxLots => max_lots,
            Strategy::EqualSplit => max_lots.min(3),
            Strategy::RoadOptimized => max_lots.min(4),
            Strategy::ConstraintAdaptive => max_lots.min(2),
            Strategy::Hybrid => max_lots.min(5).max(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Driveway {
    pub lot_index: usize,
    pub path: LineString<f64>,
    pub length_ft: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub lot_index: usize,
    pub footprint: MultiPolygon<f64>,
    pub area_sqft: f64,
}

/// Development cost components; `total` is the sum of the rounded parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub survey_engineering: f64,
    pub plat_application: f64,
    pub road: f64,
    pub utilities: f64,
    pub stormwater: f64,
    pub clearing: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LotLayout {
    pub id: String,
    pub strategy: Strategy,
    pub lots: Vec<MultiPolygon<f64>>,
    pub driveways: Vec<Driveway>,
    pub envelopes: Vec<Envelope>,
    pub score: Option<f64>,
    pub cost: Option<CostEstimate>,
    pub tags: TagSet,
    pub buildable_after_stormwater_sqft: Option<f64>,
}

impl LotLayout {
    pub fn new(id: String, strategy: Strategy, lots: Vec<MultiPolygon<f64>>) -> Self {
        Self {
            id,
            strategy,
            lots,
            driveways: Vec::new(),
            envelopes: Vec::new(),
            score: None,
            cost: None,
            tags: TagSet::new(),
            buildable_after_stormwater_sqft: None,
        }
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    pub fn total_lot_area(&self) -> f64 {
        self.lots.iter().map(|lot| lot.unsigned_area()).sum()
    }

    pub fn driveway_length_ft(&self) -> f64 {
        self.driveways.iter().map(|d| d.length_ft).sum()
    }
}

/// A recoverable phase failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseWarning {
    pub phase: &'static str,
    pub message: String,
}

impl PhaseWarning {
    pub fn from_error(phase: &'static str, err: &anyhow::Error) -> Self {
        Self {
            phase,
            message: format!("{err:#}"),
        }
    }
}

impl fmt::Display for PhaseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

/// Changes a phase wants applied to the context.
#[derive(Debug, Clone, Default)]
pub struct ContextDelta {
    pub parcel: Option<ParcelRecord>,
    pub zoning_code: Option<String>,
    pub zoning_rule: Option<ZoningRule>,
    pub layers: Vec<ConstraintLayer>,
    pub buildable: Option<MultiPolygon<f64>>,
    /// Replaces the layout list wholesale.
    pub layouts: Option<Vec<LotLayout>>,
    pub tags: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub export_paths: Vec<(String, PathBuf)>,
    pub stop: bool,
}

impl ContextDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.push_tag(tag);
        self
    }

    pub fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    #[cfg(test)]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.push((name.to_string(), value));
        self
    }

    pub fn layer(mut self, layer: ConstraintLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn stop(mut self) -> Self {
        self.stop = true;
        self
    }

    pub fn layouts(mut self, layouts: Vec<LotLayout>) -> Self {
        self.layouts = Some(layouts);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub parcel_id: String,
    pub parcel: Option<ParcelRecord>,
    pub zoning_code: Option<String>,
    /// Conservative defaults until zoning resolves.
    pub zoning_rule: ZoningRule,
    pub constraint_layers: BTreeMap<LayerKind, ConstraintLayer>,
    pub buildable: Option<MultiPolygon<f64>>,
    pub layouts: Vec<LotLayout>,
    pub tags: TagSet,
    pub warnings: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub export_paths: BTreeMap<String, PathBuf>,
    pub stop: bool,
    pub state: PipelineState,
}

impl AnalysisContext {
    pub fn new(parcel_id: impl Into<String>) -> Self {
        Self {
            parcel_id: parcel_id.into(),
            parcel: None,
            zoning_code: None,
            zoning_rule: ZoningRule::default(),
            constraint_layers: BTreeMap::new(),
            buildable: None,
            layouts: Vec::new(),
            tags: TagSet::new(),
            warnings: Vec::new(),
            metrics: BTreeMap::new(),
            export_paths: BTreeMap::new(),
            stop: false,
            state: PipelineState::NotStarted,
        }
    }

    pub fn parcel_geometry(&self) -> Option<&MultiPolygon<f64>> {
        self.parcel.as_ref().map(|parcel| &parcel.geometry)
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&ConstraintLayer> {
        self.constraint_layers.get(&kind)
    }

    /// Footprints of every non-reference layer.
    pub fn excluded_footprints(&self) -> Vec<MultiPolygon<f64>> {
        self.constraint_layers
            .values()
            .filter(|layer| !layer.kind.is_reference())
            .flat_map(ConstraintLayer::footprints)
            .collect()
    }

    pub fn buildable_area(&self) -> f64 {
        self.buildable
            .as_ref()
            .map(|area| area.unsigned_area())
            .unwrap_or(0.0)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Fold a phase failure into tags and warnings.
    pub fn record_failure(&mut self, warning: &PhaseWarning) {
        self.add_tag(tags::RISK_DATA_INCOMPLETE);
        self.add_warning(warning.to_string());
    }

    pub fn apply(&mut self, delta: ContextDelta) {
        if let Some(parcel) = delta.parcel {
            self.parcel = Some(parcel);
        }
        if let Some(code) = delta.zoning_code {
            self.zoning_code = Some(code);
        }
        if let Some(rule) = delta.zoning_rule {
            self.zoning_rule = rule;
        }
        for layer in delta.layers {
            self.constraint_layers.insert(layer.kind, layer);
        }
        if let Some(buildable) = delta.buildable {
            self.buildable = Some(buildable);
        }
        if let Some(layouts) = delta.layouts {
            self.layouts = layouts;
        }
        self.tags.extend(delta.tags);
        for warning in delta.warnings {
            self.add_warning(warning);
        }
        self.metrics.extend(delta.metrics);
        self.export_paths.extend(delta.export_paths);
        self.stop |= delta.stop;
    }

    pub fn best_layout(&self) -> Option<&LotLayout> {
        self.layouts.first().filter(|layout| layout.score.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::square;

    #[test]
    fn strategy_targets_follow_bounds() {
        let targets: Vec<usize> = Strategy::ALL.iter().map(|s| s.target_lots(7)).collect();
        assert_eq!(targets, vec![7, 3, 4, 2, 5]);
        let targets: Vec<usize> = Strategy::ALL.iter().map(|s| s.target_lots(2)).collect();
        assert_eq!(targets, vec![2, 2, 2, 2, 2]);
    }

    #[test]
    fn apply_merges_tags_layers_and_stop() {
        let mut ctx = AnalysisContext::new("P1");
        ctx.add_tag(tags::RISK_WELL_REQUIRED);
        let delta = ContextDelta::new()
            .tag(tags::RISK_WELL_REQUIRED)
            .tag(tags::RISK_WETLAND_PRESENT)
            .metric("slope_pct_33", 0.1)
            .layer(ConstraintLayer::new(
                LayerKind::Roads,
                vec![Feature::new(geo::Geometry::MultiPolygon(square(0.0, 0.0, 10.0)))],
            ))
            .layer(ConstraintLayer::new(
                LayerKind::Wetlands,
                vec![Feature::new(geo::Geometry::MultiPolygon(square(0.0, 0.0, 5.0)))],
            ))
            .stop();
        ctx.apply(delta);

        assert_eq!(ctx.tags.len(), 2);
        assert!(ctx.stop);
        assert_eq!(ctx.metrics.get("slope_pct_33"), Some(&0.1));
        let excluded = ctx.excluded_footprints();
        assert_eq!(excluded.len(), 1);
        assert!((excluded[0].unsigned_area() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn failures_become_warnings_and_incomplete_tag() {
        let mut ctx = AnalysisContext::new("P1");
        let warning = PhaseWarning::from_error("flood", &anyhow::anyhow!("HTTP 503"));
        ctx.record_failure(&warning);
        ctx.record_failure(&warning);
        assert_eq!(ctx.warnings, vec!["flood failed: HTTP 503".to_string()]);
        assert!(ctx.tags.contains(tags::RISK_DATA_INCOMPLETE));
    }

    #[test]
    fn state_labels() {
        assert_eq!(
            PipelineState::Rejected(RejectReason::IncorporatedCity).to_string(),
            "rejected(incorporated_city)"
        );
        assert!(PipelineState::Infeasible.is_terminal());
        assert!(!PipelineState::Scored.is_terminal());
    }
}
