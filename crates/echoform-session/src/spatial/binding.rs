//! One spatial binding and its cull/resume state machine.
//!
//! Modes are `live` (the node's runtime output feeds the emitter) and
//! `committed` (a rendered buffer loops into the emitter). Culling only acts
//! on committed bindings:
//!
//! - beyond `cull_distance` a fade-out starts and `cull_pending` guards
//!   against re-triggering; once the fade has elapsed the virtual playhead is
//!   captured and the source is detached
//! - within `resume_distance` a culled binding seeks to the captured virtual
//!   time plus the time spent culled, reattaches and fades back in
//!
//! Between the two distances nothing changes.

use super::bridge::{BridgeInput, BridgeOutput, stream_bridge};
use super::emitter::{
    AudioContextInfo, DistanceParams, GainRamp, ListenerHandle, PositionHandle, Vec3,
};
use crate::config::SpatialConfig;
use crate::error::SpatialBindError;
use echoform_graph::StereoBuffer;
use echoform_io::AudioBuffer;
use std::fmt;
use std::sync::Arc;

/// Binding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialMode {
    /// Fed by the runtime graph.
    Live,
    /// Fed by a looping committed render.
    Committed,
}

impl fmt::Display for SpatialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Live => "live",
            Self::Committed => "committed",
        })
    }
}

/// Per-binding options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindOptions {
    /// Whether distance culling applies.
    pub culling: bool,
    /// Distance beyond which the binding culls.
    pub cull_distance: f64,
    /// Distance within which a culled binding resumes.
    pub resume_distance: f64,
    /// Fade length, seconds.
    pub fade_secs: f64,
    /// Distance attenuation.
    pub distance: DistanceParams,
    /// Emitter gain before attenuation.
    pub gain: f64,
    /// Stream bridge buffering, milliseconds.
    pub bridge_latency_ms: f64,
}

impl BindOptions {
    /// Options from engine defaults, culling enabled.
    pub fn from_config(config: &SpatialConfig) -> Self {
        Self {
            culling: true,
            cull_distance: config.cull_distance,
            resume_distance: config.resume_distance,
            fade_secs: config.fade_ms / 1000.0,
            distance: DistanceParams {
                ref_distance: config.ref_distance,
                rolloff: config.rolloff,
                max_distance: config.max_distance,
                model: config.distance_model,
            },
            gain: 1.0,
            bridge_latency_ms: config.bridge_latency_ms,
        }
    }

    /// Overrides the cull and resume distances.
    pub fn with_distances(mut self, cull: f64, resume: f64) -> Self {
        self.cull_distance = cull;
        self.resume_distance = resume;
        self
    }

    /// Overrides the fade length.
    pub fn with_fade_secs(mut self, fade_secs: f64) -> Self {
        self.fade_secs = fade_secs;
        self
    }

    /// Disables culling.
    pub fn without_culling(mut self) -> Self {
        self.culling = false;
        self
    }

    pub(crate) fn check(&self) -> Result<(), SpatialBindError> {
        if self.culling
            && (self.resume_distance.is_nan() || self.resume_distance >= self.cull_distance)
        {
            return Err(SpatialBindError::NoHysteresis {
                cull: self.cull_distance,
                resume: self.resume_distance,
            });
        }
        Ok(())
    }
}

/// What one culling evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullTransition {
    /// Nothing.
    None,
    /// Fade-out toward culling started.
    FadeStarted,
    /// Fade-out was cancelled because the listener came back in range.
    FadeCancelled,
    /// The binding is now culled.
    Culled,
    /// The binding resumed playback.
    Resumed,
    /// An inconsistent pending flag was cleared.
    Healed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingCull {
    started: f64,
    deadline: f64,
}

/// Looping playback of a committed render.
#[derive(Debug, Clone)]
struct CommittedSource {
    buffer: Arc<AudioBuffer>,
    /// Read position, source frames.
    position: f64,
}

impl CommittedSource {
    fn duration(&self) -> f64 {
        self.buffer.duration_secs()
    }

    fn seek(&mut self, secs: f64) {
        self.position = secs * f64::from(self.buffer.sample_rate());
    }

    fn render(&mut self, out: &mut StereoBuffer, sample_rate: u32) {
        let frames = self.buffer.frames();
        if frames == 0 {
            out.clear();
            return;
        }
        let end = frames as f64;
        let step = f64::from(self.buffer.sample_rate()) / f64::from(sample_rate.max(1));
        for i in 0..out.len() {
            self.position %= end;
            let i0 = self.position as usize;
            let i1 = (i0 + 1) % frames;
            let frac = (self.position - i0 as f64) as f32;
            for (ch, side) in [&mut out.left, &mut out.right].into_iter().enumerate() {
                let a = self.buffer.sample(ch, i0);
                let b = self.buffer.sample(ch, i1);
                side[i] = a + (b - a) * frac;
            }
            self.position += step;
        }
    }
}

enum Route {
    Direct,
    Bridged {
        input: BridgeInput,
        output: BridgeOutput,
    },
}

/// Read-only view of a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingInfo {
    /// Bound node.
    pub node: String,
    /// Current mode.
    pub mode: SpatialMode,
    /// Whether playback is culled.
    pub is_culled: bool,
    /// Whether a cull fade is in progress.
    pub cull_pending: bool,
    /// Whether audio crosses a stream bridge.
    pub bridged: bool,
    /// Distance to the camera at the last culling update.
    pub distance: f64,
    /// Virtual playhead captured at the last cull, seconds.
    pub virtual_time: f64,
    /// Current emitter gain before attenuation.
    pub gain: f64,
}

/// One node bound to a positioned emitter.
pub struct SpatialBinding {
    node: String,
    position: PositionHandle,
    listener: ListenerHandle,
    graph_context: AudioContextInfo,
    options: BindOptions,
    mode: SpatialMode,
    route: Option<Route>,
    source: Option<CommittedSource>,
    ramp: GainRamp,
    prior_gain: f64,
    is_culled: bool,
    cull_pending: Option<PendingCull>,
    virtual_time: f64,
    paused_at: f64,
    play_origin: f64,
    play_offset: f64,
    last_distance_sq: f64,
    scratch: StereoBuffer,
}

impl fmt::Debug for SpatialBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialBinding")
            .field("node", &self.node)
            .field("mode", &self.mode)
            .field("is_culled", &self.is_culled)
            .field("cull_pending", &self.cull_pending.is_some())
            .finish_non_exhaustive()
    }
}

impl SpatialBinding {
    pub(crate) fn new(
        node: String,
        position: PositionHandle,
        listener: ListenerHandle,
        graph_context: AudioContextInfo,
        options: BindOptions,
    ) -> Self {
        let mut binding = Self {
            node,
            position,
            listener,
            graph_context,
            options,
            mode: SpatialMode::Live,
            route: None,
            source: None,
            ramp: GainRamp::fixed(options.gain),
            prior_gain: options.gain,
            is_culled: false,
            cull_pending: None,
            virtual_time: 0.0,
            paused_at: 0.0,
            play_origin: 0.0,
            play_offset: 0.0,
            last_distance_sq: 0.0,
            scratch: StereoBuffer::new(0),
        };
        binding.connect_live();
        binding
    }

    /// Bound node.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Current mode.
    pub fn mode(&self) -> SpatialMode {
        self.mode
    }

    /// Whether playback is culled.
    pub fn is_culled(&self) -> bool {
        self.is_culled
    }

    /// Whether a cull fade is in progress.
    pub fn cull_pending(&self) -> bool {
        self.cull_pending.is_some()
    }

    /// Whether audio crosses a stream bridge.
    pub fn is_bridged(&self) -> bool {
        matches!(self.route, Some(Route::Bridged { .. }))
    }

    /// Snapshot.
    pub fn info(&self, now: f64) -> BindingInfo {
        BindingInfo {
            node: self.node.clone(),
            mode: self.mode,
            is_culled: self.is_culled,
            cull_pending: self.cull_pending.is_some(),
            bridged: self.is_bridged(),
            distance: self.last_distance_sq.sqrt(),
            virtual_time: self.virtual_time,
            gain: self.ramp.value(now),
        }
    }

    /// Bytes held by the committed buffer and bridge ring.
    pub fn memory_bytes(&self) -> usize {
        let committed = self.source.as_ref().map_or(0, |s| s.buffer.size_bytes());
        let bridge = match &self.route {
            Some(Route::Bridged { input, .. }) => input.capacity() * std::mem::size_of::<f32>(),
            _ => 0,
        };
        committed + bridge
    }

    fn connect_live(&mut self) {
        self.route = Some(if self.listener.context.id == self.graph_context.id {
            Route::Direct
        } else {
            let (input, output) = stream_bridge(
                self.graph_context.sample_rate,
                self.listener.context.sample_rate,
                self.options.bridge_latency_ms,
            );
            tracing::debug!(node = %self.node, "spatial binding bridged across contexts");
            Route::Bridged { input, output }
        });
    }

    /// Playhead of the committed source, seconds, wrapped to its duration.
    fn playhead(&self, now: f64) -> f64 {
        let duration = self.source.as_ref().map_or(0.0, CommittedSource::duration);
        wrap(self.play_offset + (now - self.play_origin), duration)
    }

    /// Switches to committed playback of `buffer` from time zero.
    pub(crate) fn freeze(&mut self, buffer: Arc<AudioBuffer>, now: f64) {
        self.route = None;
        self.source = Some(CommittedSource {
            buffer,
            position: 0.0,
        });
        self.mode = SpatialMode::Committed;
        self.is_culled = false;
        self.cull_pending = None;
        self.play_origin = now;
        self.play_offset = 0.0;
        self.virtual_time = 0.0;
        self.ramp = GainRamp::fixed(self.prior_gain);
    }

    /// Stops committed playback and reconnects the live source.
    pub(crate) fn unfreeze(&mut self) -> Result<(), SpatialBindError> {
        if self.mode != SpatialMode::Committed {
            return Err(SpatialBindError::InvalidTransition {
                node: self.node.clone(),
                mode: self.mode,
                action: "unfreeze",
            });
        }
        self.source = None;
        self.mode = SpatialMode::Live;
        self.is_culled = false;
        self.cull_pending = None;
        self.ramp = GainRamp::fixed(self.prior_gain);
        self.connect_live();
        Ok(())
    }

    /// Evaluates culling for one frame.
    pub(crate) fn update_culling(
        &mut self,
        camera: Vec3,
        now: f64,
    ) -> Result<CullTransition, SpatialBindError> {
        let d2 = self.position.get().distance_sq(camera);
        self.last_distance_sq = d2;
        if !self.options.culling || self.mode == SpatialMode::Live {
            if self.cull_pending.take().is_some() {
                return Ok(CullTransition::Healed);
            }
            return Ok(CullTransition::None);
        }

        if let Some(pending) = self.cull_pending
            && (self.is_culled || now < pending.started)
        {
            tracing::warn!(node = %self.node, "clearing stuck cull flag");
            self.cull_pending = None;
            return Ok(CullTransition::Healed);
        }

        let cull_sq = self.options.cull_distance * self.options.cull_distance;
        let resume_sq = self.options.resume_distance * self.options.resume_distance;
        match self.cull_pending {
            Some(pending) if now >= pending.deadline => self.complete_cull(now),
            Some(_) if d2 < resume_sq => {
                self.cull_pending = None;
                self.ramp.ramp_to(self.prior_gain, now, self.options.fade_secs);
                Ok(CullTransition::FadeCancelled)
            }
            Some(_) => Ok(CullTransition::None),
            None if !self.is_culled && d2 > cull_sq => {
                self.prior_gain = self.ramp.target();
                self.ramp.ramp_to(0.0, now, self.options.fade_secs);
                self.cull_pending = Some(PendingCull {
                    started: now,
                    deadline: now + self.options.fade_secs,
                });
                if self.options.fade_secs <= 0.0 {
                    return self.complete_cull(now);
                }
                Ok(CullTransition::FadeStarted)
            }
            None if self.is_culled && d2 < resume_sq => self.resume(now),
            None => Ok(CullTransition::None),
        }
    }

    fn complete_cull(&mut self, now: f64) -> Result<CullTransition, SpatialBindError> {
        self.cull_pending = None;
        if self.source.is_none() {
            return Err(SpatialBindError::InvalidTransition {
                node: self.node.clone(),
                mode: self.mode,
                action: "cull without a committed source",
            });
        }
        self.virtual_time = self.playhead(now);
        self.paused_at = now;
        self.is_culled = true;
        tracing::debug!(
            node = %self.node,
            virtual_time = self.virtual_time,
            "spatial binding culled"
        );
        Ok(CullTransition::Culled)
    }

    fn resume(&mut self, now: f64) -> Result<CullTransition, SpatialBindError> {
        let Some(source) = self.source.as_mut() else {
            self.is_culled = false;
            return Err(SpatialBindError::InvalidTransition {
                node: self.node.clone(),
                mode: self.mode,
                action: "resume without a committed source",
            });
        };
        let offset = wrap(self.virtual_time + (now - self.paused_at), source.duration());
        source.seek(offset);
        self.play_offset = offset;
        self.play_origin = now;
        self.is_culled = false;
        self.ramp = GainRamp::fixed(0.0);
        self.ramp.ramp_to(self.prior_gain, now, self.options.fade_secs);
        tracing::debug!(node = %self.node, offset, "spatial binding resumed");
        Ok(CullTransition::Resumed)
    }

    /// Current playback offset of the committed source, seconds.
    pub fn playback_offset(&self, now: f64) -> Option<f64> {
        match (&self.source, self.is_culled) {
            (Some(_), false) => Some(self.playhead(now)),
            _ => None,
        }
    }

    /// Mixes this binding's block into `out`. `input` is the node's runtime
    /// output for the block.
    pub(crate) fn render(
        &mut self,
        input: Option<&StereoBuffer>,
        now: f64,
        out: &mut StereoBuffer,
    ) {
        let gain = (self.ramp.value(now) * self.attenuation()) as f32;
        match self.mode {
            SpatialMode::Live => match (&mut self.route, input) {
                (Some(Route::Direct), Some(input)) => out.add_scaled(input, gain),
                (Some(Route::Bridged { input: bridge, .. }), Some(input)) => {
                    bridge.push(input);
                }
                _ => {}
            },
            SpatialMode::Committed => {
                if self.is_culled {
                    return;
                }
                if let Some(source) = self.source.as_mut() {
                    self.scratch.resize(out.len());
                    source.render(&mut self.scratch, self.graph_context.sample_rate);
                    out.add_scaled(&self.scratch, gain);
                }
            }
        }
    }

    /// Pulls bridged audio at the listener's rate into `out`.
    pub(crate) fn pull_bridged(&mut self, now: f64, out: &mut StereoBuffer) -> bool {
        let gain = (self.ramp.value(now) * self.attenuation()) as f32;
        match &mut self.route {
            Some(Route::Bridged { output, .. }) if self.mode == SpatialMode::Live => {
                output.pull(out);
                out.scale(gain);
                true
            }
            _ => false,
        }
    }

    fn attenuation(&self) -> f64 {
        let listener = self.listener.position.get();
        let distance = self.position.get().distance_sq(listener).sqrt();
        self.options.distance.gain(distance)
    }
}

fn wrap(secs: f64, duration: f64) -> f64 {
    if duration > 0.0 { secs.rem_euclid(duration) } else { 0.0 }
}
