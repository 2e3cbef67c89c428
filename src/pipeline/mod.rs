//! Pipeline orchestrator.
//!
//! Runs the phases in a fixed order against one [`AnalysisContext`]:
//!
//! 1. parcel resolution (the only phase whose errors can be fatal)
//! 2. zoning resolution
//! 3. constraint overlays, each isolated from the others
//! 4. buildable area, layouts, stormwater, driveways, envelopes, scoring, costs,
//!    gated by the context's `stop` flag
//! 5. export, which always runs
//!
//! Every phase is `fn(&AnalysisContext, &PipelineEnv) -> Result<ContextDelta>`.
//! An `Err` becomes a [`PhaseWarning`] plus `RISK_DATA_INCOMPLETE`, and the
//! context stays exactly as it was before the phase.
pub mod buildable;
pub mod costs;
pub mod driveways;
pub mod envelopes;
pub mod export;
pub mod layouts;
pub mod map;
pub mod overlays;
pub mod parcel;
pub mod scoring;
pub mod stormwater;
pub mod zoning;

use crate::client::FeatureClient;
use crate::config::FeasibilityConfig;
use crate::context::{AnalysisContext, ContextDelta, PhaseWarning, PipelineState};
use crate::error::ParcelError;
use crate::tags::TagNamespace;
use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Collaborators shared by every phase of one run.
pub struct PipelineEnv<'a> {
    pub client: &'a FeatureClient,
    pub config: &'a FeasibilityConfig,
    pub output_dir: &'a Path,
}

pub type Phase = fn(&AnalysisContext, &PipelineEnv<'_>) -> Result<ContextDelta>;

/// Constraint overlays; order does not matter.
pub const OVERLAY_PHASES: &[(&str, Phase)] = &[
    ("streams", overlays::streams::run),
    ("wetlands", overlays::wetlands::run),
    ("flood", overlays::flood::run),
    ("slope", overlays::slope::run),
    ("geology", overlays::geology::run),
    ("soils", overlays::soils::run),
    ("utilities", overlays::utilities::run),
    ("roads", overlays::roads::run),
    ("flu", overlays::flu::run),
    ("shoreline", overlays::shoreline::run),
];

/// Phases gated by `stop`, with the state reached after each.
const REFINEMENT_PHASES: &[(&str, Phase, PipelineState)] = &[
    ("buildable", buildable::run, PipelineState::BuildableComputed),
    ("layouts", layouts::run, PipelineState::LayoutsGenerated),
    ("stormwater", stormwater::run, PipelineState::LayoutsGenerated),
    ("driveways", driveways::run, PipelineState::LayoutsGenerated),
    ("envelopes", envelopes::run, PipelineState::Refined),
    ("scoring", scoring::run, PipelineState::Scored),
    ("costs", costs::run, PipelineState::Costed),
];

/// Run one parcel through every phase.
///
/// Only [`ParcelError`] escapes; everything else is folded into the
/// returned context's tags and warnings.
pub fn run_feasibility(
    parcel_id: &str,
    env: &PipelineEnv<'_>,
) -> Result<AnalysisContext, ParcelError> {
    let started = Instant::now();
    let mut ctx = AnalysisContext::new(parcel_id);
    info!(parcel_id, offline = env.client.is_offline(), "feasibility run started");

    match parcel::run(&ctx, env) {
        Ok(delta) => {
            ctx.apply(delta);
            ctx.state = PipelineState::ParcelResolved;
        }
        Err(err) => match err.downcast::<ParcelError>() {
            Ok(fatal) => {
                warn!(parcel_id, error = %fatal, "parcel rejected");
                return Err(fatal);
            }
            Err(err) => {
                let warning = PhaseWarning::from_error("parcel", &err);
                warn!(phase = "parcel", error = %warning.message, "phase failed");
                ctx.record_failure(&warning);
                ctx.stop = true;
            }
        },
    }

    if ctx.parcel.is_some() {
        if run_phase(&mut ctx, env, "zoning", zoning::run) {
            ctx.state = PipelineState::ZoningResolved;
        }
        for (name, phase) in OVERLAY_PHASES {
            run_phase(&mut ctx, env, name, *phase);
        }
        ctx.state = PipelineState::ConstraintsOverlaid;
    }

    for (name, phase, reached) in REFINEMENT_PHASES {
        if ctx.stop {
            info!(phase = *name, "stop flag set; skipping remaining refinement");
            break;
        }
        if run_phase(&mut ctx, env, name, *phase) {
            ctx.state = *reached;
        }
    }
    if ctx.stop {
        ctx.state = PipelineState::Infeasible;
    }

    if run_phase(&mut ctx, env, "export", export::run) && !ctx.state.is_terminal() {
        ctx.state = PipelineState::Exported;
    }

    info!(
        parcel_id,
        state = %ctx.state,
        layouts = ctx.layouts.len(),
        tags = ctx.tags.len(),
        risks = ctx
            .tags
            .iter()
            .filter(|tag| TagNamespace::of(tag) == Some(TagNamespace::Risk))
            .count(),
        warnings = ctx.warnings.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "feasibility run finished"
    );
    Ok(ctx)
}

/// Run one isolated phase; returns whether it succeeded.
fn run_phase(ctx: &mut AnalysisContext, env: &PipelineEnv<'_>, name: &'static str, phase: Phase) -> bool {
    let started = Instant::now();
    let outcome = phase(ctx, env);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(delta) => {
            info!(phase = name, elapsed_ms, tags = delta.tags.len(), "phase complete");
            ctx.apply(delta);
            true
        }
        Err(err) => {
            let warning = PhaseWarning::from_error(name, &err);
            warn!(phase = name, elapsed_ms, error = %warning.message, "phase failed");
            ctx.record_failure(&warning);
            false
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
pub(crate) mod tests;
