//! Offline rendering of a spec to a stereo buffer.

use crate::error::GraphError;
use crate::graph::{AssetMap, BuildReport, GraphContext, RuntimeGraph};
use echoform_io::AudioBuffer;
use echoform_spec::GraphSpec;

/// Render length, seconds.
///
/// The longest of the automation end times, the (trimmed) durations of
/// assets in `assets` and `override_secs`; `fallback_secs` when that is zero.
/// An override can extend a render but never shorten it.
pub fn estimate_duration(
    spec: &GraphSpec,
    assets: &AssetMap,
    override_secs: Option<f64>,
    fallback_secs: f64,
) -> f64 {
    let automation_end = spec
        .automations
        .iter()
        .map(|a| a.end_time)
        .fold(0.0f64, f64::max);
    let asset_end = spec
        .assets
        .iter()
        .filter_map(|a| {
            let buffer = assets.get(&a.id)?;
            let total = buffer.duration_secs();
            Some(a.trim.as_ref().map_or(total, |t| t.length(total)))
        })
        .fold(0.0f64, f64::max);
    let longest = automation_end
        .max(asset_end)
        .max(override_secs.unwrap_or(0.0));
    if longest > 0.0 { longest } else { fallback_secs }
}

/// Frames needed for `duration_secs` at `sample_rate`.
pub fn frames_for(duration_secs: f64, sample_rate: u32) -> usize {
    (duration_secs * f64::from(sample_rate)).ceil().max(0.0) as usize
}

/// Builds `spec` and renders `frames` stereo frames from time zero.
pub fn render_offline(
    spec: &GraphSpec,
    context: GraphContext,
    assets: &AssetMap,
    frames: usize,
) -> Result<(AudioBuffer, BuildReport), GraphError> {
    let mut graph = RuntimeGraph::build(spec, context, assets)?;
    let buffer = graph.render(frames);
    tracing::debug!(frames, sample_rate = context.sample_rate, "offline render complete");
    Ok((buffer, graph.report().clone()))
}
