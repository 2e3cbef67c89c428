//! Stream buffers, with a fallback to the national hydrography layer.
use super::{buffered, footprints, parcel_geometry, query_parcel, BUFFER_IMPACT_PCT};
use crate::context::{AnalysisContext, ConstraintLayer, ContextDelta, LayerKind};
use crate::geometry;
use crate::pipeline::PipelineEnv;
use crate::tags;
use anyhow::Result;
use tracing::{debug, info};

const TYPE_FIELDS: &[&str] = &["StreamType", "TYPE"];

pub fn run(ctx: &AnalysisContext, env: &PipelineEnv<'_>) -> Result<ContextDelta> {
    let parcel = parcel_geometry(ctx)?;
    let services = &env.config.services;
    let mut streams = query_parcel(env, &services.streams, parcel)?;
    if streams.is_empty() {
        debug!("county streams empty; trying hydrography fallback");
        streams = query_parcel(env, &services.streams_fallback, parcel)?;
    }

    let rules = &env.config.buffers.streams;
    let buffers: Vec<_> = streams
        .iter()
        .map(|stream| {
            let stream_type = stream.text(TYPE_FIELDS).unwrap_or_default();
            buffered(stream, rules.for_type(&stream_type))
        })
        .collect();
    let overlap = geometry::overlap_pct(parcel, &footprints(&buffers));
    info!(streams = streams.len(), overlap, "stream overlay");

    let mut delta = ContextDelta::new().metric("stream_buffer_overlap_pct", overlap);
    if overlap > BUFFER_IMPACT_PCT {
        delta.push_tag(tags::RISK_STREAM_BUFFER_IMPACT);
    }
    Ok(delta.layer(ConstraintLayer::new(LayerKind::Streams, buffers)))
}
