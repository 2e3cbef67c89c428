//! Run summary handed to callers.
//!
//! `summary.json` is written twice per run: once as `running` before any phase
//! executes, and once with the final `complete` or `failed` outcome. Callers
//! polling the output directory therefore always see a well-formed record.
//!
//! ```text
//! FeasibilitySummary
//! ├── status: pending | running | complete | failed
//! ├── state: final pipeline state (e.g. "exported", "infeasible")
//! ├── tags / warnings / metrics
//! ├── layouts: [LayoutSummary, ...] best first
//! ├── best_layout_id / best_score
//! ├── exports: artifact name -> path
//! └── error: set only for failed runs
//! ```
use crate::context::{AnalysisContext, CostEstimate, LotLayout, PipelineState};
use crate::error::ParcelError;
use crate::staging::write_atomic_json;
use crate::tags::TagSet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub id: String,
    pub strategy: String,
    pub lot_count: usize,
    pub score: Option<f64>,
    pub tags: TagSet,
    pub cost_estimate: Option<CostEstimate>,
    pub driveway_length_ft: f64,
    pub total_lot_area_sqft: f64,
}

impl From<&LotLayout> for LayoutSummary {
    fn from(layout: &LotLayout) -> Self {
        Self {
            id: layout.id.clone(),
            strategy: layout.strategy.as_str().to_string(),
            lot_count: layout.lot_count(),
            score: layout.score,
            tags: layout.tags.clone(),
            cost_estimate: layout.cost.clone(),
            driveway_length_ft: layout.driveway_length_ft(),
            total_lot_area_sqft: layout.total_lot_area(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilitySummary {
    pub parcel_id: String,
    pub status: RunStatus,
    pub state: String,
    pub zoning_code: Option<String>,
    pub tags: TagSet,
    pub warnings: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub layouts: Vec<LayoutSummary>,
    pub best_layout_id: Option<String>,
    pub best_score: Option<f64>,
    pub exports: BTreeMap<String, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeasibilitySummary {
    fn empty(parcel_id: &str, status: RunStatus, state: PipelineState) -> Self {
        Self {
            parcel_id: parcel_id.to_string(),
            status,
            state: state.to_string(),
            zoning_code: None,
            tags: TagSet::new(),
            warnings: Vec::new(),
            metrics: BTreeMap::new(),
            layouts: Vec::new(),
            best_layout_id: None,
            best_score: None,
            exports: BTreeMap::new(),
            error: None,
        }
    }

    pub fn pending(parcel_id: &str) -> Self {
        Self::empty(parcel_id, RunStatus::Pending, PipelineState::NotStarted)
    }

    pub fn running(parcel_id: &str) -> Self {
        Self::empty(parcel_id, RunStatus::Running, PipelineState::NotStarted)
    }

    pub fn from_context(ctx: &AnalysisContext) -> Self {
        let best = ctx.best_layout();
        Self {
            parcel_id: ctx.parcel_id.clone(),
            status: RunStatus::Complete,
            state: ctx.state.to_string(),
            zoning_code: ctx.zoning_code.clone(),
            tags: ctx.tags.clone(),
            warnings: ctx.warnings.clone(),
            metrics: ctx.metrics.clone(),
            layouts: ctx.layouts.iter().map(LayoutSummary::from).collect(),
            best_layout_id: best.map(|layout| layout.id.clone()),
            best_score: best.and_then(|layout| layout.score),
            exports: ctx.export_paths.clone(),
            error: None,
        }
    }

    /// A fatal parcel outcome.
    pub fn failed(parcel_id: &str, err: &ParcelError) -> Self {
        let mut summary = Self::empty(
            parcel_id,
            RunStatus::Failed,
            PipelineState::Rejected(err.reject_reason()),
        );
        summary.error = Some(err.to_string());
        summary
    }

    /// A run that failed before any phase executed.
    pub fn aborted(parcel_id: &str, err: &anyhow::Error) -> Self {
        let mut summary = Self::empty(parcel_id, RunStatus::Failed, PipelineState::NotStarted);
        summary.error = Some(format!("{err:#}"));
        summary
    }

    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("create output dir {}", output_dir.display()))?;
        let path = output_dir.join(SUMMARY_FILE);
        write_atomic_json(&path, self)?;
        Ok(path)
    }

    #[cfg(test)]
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
    }

    /// Human-readable rendering for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let status = serde_json::to_value(self.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let _ = writeln!(out, "parcel {}: {} ({})", self.parcel_id, status, self.state);
        if let Some(zone) = &self.zoning_code {
            let _ = writeln!(out, "zoning: {zone}");
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "error: {error}");
        }
        match (&self.best_layout_id, self.best_score) {
            (Some(id), Some(score)) => {
                let _ = writeln!(out, "best layout: {id} (score {score:.2})");
            }
            _ => {
                let _ = writeln!(out, "best layout: none");
            }
        }
        for layout in &self.layouts {
            let total = layout
                .cost_estimate
                .as_ref()
                .map(|cost| format!("${:.2}", cost.total))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {:<24} lots={} score={} cost={}",
                layout.id,
                layout.lot_count,
                layout
                    .score
                    .map(|s| format!("{s:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
                total
            );
        }
        if !self.tags.is_empty() {
            let _ = writeln!(out, "tags:");
            for tag in self.tags.iter() {
                let _ = writeln!(out, "  {tag}");
            }
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {warning}");
        }
        if let Some(dir) = self.exports.get("output_dir") {
            let _ = writeln!(out, "outputs: {}", dir.display());
        }
        out
    }
}
