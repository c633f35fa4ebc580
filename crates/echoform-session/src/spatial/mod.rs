//! Spatial bindings: graph outputs attached to positioned emitters.
//!
//! A [`SpatialManager`] owns every binding of a session. The external scene
//! driver calls [`update_culling`](SpatialManager::update_culling) once per
//! frame with the camera position; audio for all bindings is mixed by
//! [`process`](SpatialManager::process) right after the runtime graph has
//! produced a block.

mod binding;
mod bridge;
mod emitter;

pub use binding::{BindOptions, BindingInfo, CullTransition, SpatialBinding, SpatialMode};
pub use bridge::{BridgeInput, BridgeOutput, stream_bridge};
pub use emitter::{
    AudioContextInfo, DistanceModel, DistanceParams, GainRamp, ListenerHandle, PositionHandle, Vec3,
};

use crate::clock::Clock;
use crate::error::SpatialBindError;
use echoform_graph::{RuntimeGraph, StereoBuffer};
use echoform_io::AudioBuffer;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

type BindingTable = BTreeMap<String, SpatialBinding>;

/// Aggregate binding counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialStats {
    /// Bindings.
    pub total: usize,
    /// Bindings not culled.
    pub active: usize,
    /// Culled bindings.
    pub culled: usize,
    /// Committed buffers and bridge rings, MiB.
    pub estimated_memory_mb: f64,
}

/// Outcome of one binding's culling evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CullOutcome {
    /// Bound node.
    pub node: String,
    /// What happened, or why it failed.
    pub result: Result<CullTransition, SpatialBindError>,
}

/// Detaches a binding when disposed or dropped.
#[must_use = "dropping the disposer unbinds immediately"]
#[derive(Debug)]
pub struct SpatialDisposer {
    table: Weak<Mutex<BindingTable>>,
    node: String,
    done: bool,
}

impl SpatialDisposer {
    /// Bound node.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Detaches the binding and releases its buffers. Returns whether a
    /// binding was removed.
    pub fn dispose(mut self) -> bool {
        self.release()
    }

    /// Keeps the binding alive until the session unbinds it.
    pub fn forget(mut self) {
        self.done = true;
    }

    fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.done, true) {
            return false;
        }
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let removed = table.lock().remove(&self.node).is_some();
        if removed {
            tracing::debug!(node = %self.node, "spatial binding disposed");
        }
        removed
    }
}

impl Drop for SpatialDisposer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owner of a session's spatial bindings.
pub struct SpatialManager {
    table: Arc<Mutex<BindingTable>>,
    clock: Arc<dyn Clock>,
    context: AudioContextInfo,
    mix: StereoBuffer,
}

impl std::fmt::Debug for SpatialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialManager")
            .field("context", &self.context)
            .field("bindings", &self.table.lock().len())
            .finish_non_exhaustive()
    }
}

impl SpatialManager {
    /// Creates a manager for a graph running in `context`.
    pub fn new(context: AudioContextInfo, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(Mutex::new(BTreeMap::new())),
            clock,
            context,
            mix: StereoBuffer::new(0),
        }
    }

    /// Graph-side audio context.
    pub fn context(&self) -> AudioContextInfo {
        self.context
    }

    /// Current clock time.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Binds `node` to an emitter at `position`, heard by `listener`.
    ///
    /// Starts in live mode. The caller checks that `node` exists.
    pub fn bind(
        &self,
        node: &str,
        position: PositionHandle,
        listener: ListenerHandle,
        options: BindOptions,
    ) -> Result<SpatialDisposer, SpatialBindError> {
        if listener.context.sample_rate == 0 {
            return Err(SpatialBindError::InvalidListener(
                "listener sample rate is zero".into(),
            ));
        }
        if !listener.position.get().is_finite() {
            return Err(SpatialBindError::InvalidListener(
                "listener position is not finite".into(),
            ));
        }
        options.check()?;

        let mut table = self.table.lock();
        if table.contains_key(node) {
            return Err(SpatialBindError::AlreadyBound(node.to_string()));
        }
        let binding =
            SpatialBinding::new(node.to_string(), position, listener, self.context, options);
        tracing::debug!(node, bridged = binding.is_bridged(), "spatial binding created");
        table.insert(node.to_string(), binding);
        Ok(SpatialDisposer {
            table: Arc::downgrade(&self.table),
            node: node.to_string(),
            done: false,
        })
    }

    /// Removes a binding without its disposer.
    pub fn unbind(&self, node: &str) -> bool {
        self.table.lock().remove(node).is_some()
    }

    /// Removes every binding.
    pub fn clear(&self) {
        self.table.lock().clear();
    }

    /// Snapshot of one binding.
    pub fn binding(&self, node: &str) -> Option<BindingInfo> {
        let now = self.clock.now();
        self.table.lock().get(node).map(|b| b.info(now))
    }

    /// Mode of one binding.
    pub fn mode(&self, node: &str) -> Option<SpatialMode> {
        self.table.lock().get(node).map(SpatialBinding::mode)
    }

    /// Committed playback offset of one binding, seconds.
    pub fn playback_offset(&self, node: &str) -> Option<f64> {
        let now = self.clock.now();
        self.table.lock().get(node).and_then(|b| b.playback_offset(now))
    }

    /// Switches `node` to looping playback of `buffer`.
    pub fn freeze(&self, node: &str, buffer: Arc<AudioBuffer>) -> Result<(), SpatialBindError> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let binding = table
            .get_mut(node)
            .ok_or_else(|| SpatialBindError::NotBound(node.to_string()))?;
        binding.freeze(buffer, now);
        Ok(())
    }

    /// Returns `node` to live playback.
    pub fn unfreeze(&self, node: &str) -> Result<(), SpatialBindError> {
        let mut table = self.table.lock();
        table
            .get_mut(node)
            .ok_or_else(|| SpatialBindError::NotBound(node.to_string()))?
            .unfreeze()
    }

    /// Evaluates culling for every binding against `camera`. Must be called
    /// once per frame.
    pub fn update_culling(&self, camera: Vec3) -> Vec<CullOutcome> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        table
            .values_mut()
            .map(|binding| {
                let result = binding.update_culling(camera, now);
                if let Err(err) = &result {
                    tracing::warn!(node = binding.node(), error = %err, "culling update failed");
                }
                CullOutcome {
                    node: binding.node().to_string(),
                    result,
                }
            })
            .collect()
    }

    /// Mixes every binding's block at the graph rate. Call right after the
    /// graph processed `frames` frames.
    pub fn process(&mut self, graph: &RuntimeGraph, frames: usize) -> &StereoBuffer {
        let now = self.clock.now();
        self.mix.resize(frames);
        self.mix.clear();
        let mut table = self.table.lock();
        for (node, binding) in table.iter_mut() {
            binding.render(graph.output(node), now, &mut self.mix);
        }
        &self.mix
    }

    /// Last spatial mix.
    pub fn mix(&self) -> &StereoBuffer {
        &self.mix
    }

    /// Pulls a bridged binding's audio at the listener's rate. Returns false
    /// when the binding is not bridged or not live.
    pub fn pull_bridged(
        &self,
        node: &str,
        out: &mut StereoBuffer,
    ) -> Result<bool, SpatialBindError> {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let binding = table
            .get_mut(node)
            .ok_or_else(|| SpatialBindError::NotBound(node.to_string()))?;
        Ok(binding.pull_bridged(now, out))
    }

    /// Aggregate counters.
    pub fn stats(&self) -> SpatialStats {
        let table = self.table.lock();
        let culled = table.values().filter(|b| b.is_culled()).count();
        let bytes: usize = table.values().map(SpatialBinding::memory_bytes).sum();
        SpatialStats {
            total: table.len(),
            active: table.len() - culled,
            culled,
            estimated_memory_mb: bytes as f64 / (1024.0 * 1024.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const CONTEXT: AudioContextInfo = AudioContextInfo {
        id: 1,
        sample_rate: 1000,
    };

    struct Rig {
        clock: Arc<ManualClock>,
        manager: SpatialManager,
        emitter: PositionHandle,
        listener: ListenerHandle,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::at(0.0));
        let manager = SpatialManager::new(CONTEXT, clock.clone());
        Rig {
            clock,
            manager,
            emitter: PositionHandle::new(Vec3::new(50.0, 0.0, 0.0)),
            listener: ListenerHandle {
                position: PositionHandle::default(),
                context: CONTEXT,
            },
        }
    }

    fn options() -> BindOptions {
        BindOptions::from_config(&crate::config::SpatialConfig::default())
            .with_distances(100.0, 60.0)
            .with_fade_secs(0.05)
    }

    fn committed(rig: &Rig, secs: usize) -> SpatialDisposer {
        let disposer = rig
            .manager
            .bind("g", rig.emitter.clone(), rig.listener.clone(), options())
            .unwrap();
        let buffer = Arc::new(AudioBuffer::new(vec![vec![0.5; secs * 1000]], 1000));
        rig.manager.freeze("g", buffer).unwrap();
        disposer
    }

    fn at(x: f64) -> Vec3 {
        Vec3::new(-x + 50.0, 0.0, 0.0)
    }

    fn step(rig: &Rig, distance: f64) -> CullTransition {
        let outcomes = rig.manager.update_culling(at(distance));
        outcomes[0].result.clone().unwrap()
    }

    #[test]
    fn rebinding_is_refused() {
        let rig = rig();
        let _d = rig
            .manager
            .bind("g", rig.emitter.clone(), rig.listener.clone(), options())
            .unwrap();
        let err = rig
            .manager
            .bind("g", rig.emitter.clone(), rig.listener.clone(), options())
            .unwrap_err();
        assert_eq!(err, SpatialBindError::AlreadyBound("g".into()));
    }

    #[test]
    fn invalid_listener_and_hysteresis_refused() {
        let rig = rig();
        let mut listener = rig.listener.clone();
        listener.context.sample_rate = 0;
        assert!(matches!(
            rig.manager.bind("g", rig.emitter.clone(), listener, options()),
            Err(SpatialBindError::InvalidListener(_))
        ));
        assert!(matches!(
            rig.manager.bind(
                "g",
                rig.emitter.clone(),
                rig.listener.clone(),
                options().with_distances(50.0, 60.0)
            ),
            Err(SpatialBindError::NoHysteresis { .. })
        ));
    }

    #[test]
    fn disposer_detaches() {
        let rig = rig();
        let d = rig
            .manager
            .bind("g", rig.emitter.clone(), rig.listener.clone(), options())
            .unwrap();
        assert_eq!(rig.manager.stats().total, 1);
        assert!(d.dispose());
        assert_eq!(rig.manager.stats().total, 0);
        assert!(rig.manager.mode("g").is_none());
    }

    #[test]
    fn live_mode_only_tracks_distance() {
        let rig = rig();
        let _d = rig
            .manager
            .bind("g", rig.emitter.clone(), rig.listener.clone(), options())
            .unwrap();
        assert_eq!(step(&rig, 500.0), CullTransition::None);
        let info = rig.manager.binding("g").unwrap();
        assert!(!info.is_culled);
        assert!((info.distance - 500.0).abs() < 1e-9);
    }

    #[test]
    fn culls_after_fade_window() {
        let rig = rig();
        let _d = committed(&rig, 2);
        assert_eq!(step(&rig, 50.0), CullTransition::None);
        assert_eq!(step(&rig, 150.0), CullTransition::FadeStarted);
        assert!(rig.manager.binding("g").unwrap().cull_pending);
        // Pending guards against re-triggering.
        assert_eq!(step(&rig, 150.0), CullTransition::None);
        rig.clock.advance(0.05);
        assert_eq!(step(&rig, 150.0), CullTransition::Culled);
        let info = rig.manager.binding("g").unwrap();
        assert!(info.is_culled);
        assert!(!info.cull_pending);
        assert_eq!(rig.manager.stats().culled, 1);
    }

    #[test]
    fn hysteresis_band_never_toggles() {
        let rig = rig();
        let _d = committed(&rig, 2);
        for i in 0..50 {
            rig.clock.advance(0.016);
            let d = if i % 2 == 0 { 80.0 } else { 90.0 };
            assert_eq!(step(&rig, d), CullTransition::None);
            assert!(!rig.manager.binding("g").unwrap().is_culled);
        }

        step(&rig, 150.0);
        rig.clock.advance(0.1);
        assert_eq!(step(&rig, 150.0), CullTransition::Culled);
        for i in 0..50 {
            rig.clock.advance(0.016);
            let d = if i % 2 == 0 { 80.0 } else { 90.0 };
            assert_eq!(step(&rig, d), CullTransition::None);
            assert!(rig.manager.binding("g").unwrap().is_culled);
        }
        assert_eq!(step(&rig, 59.0), CullTransition::Resumed);
    }

    #[test]
    fn resume_continues_virtual_time() {
        let rig = rig();
        let _d = committed(&rig, 2);
        rig.clock.advance(0.7);
        step(&rig, 150.0);
        rig.clock.advance(0.05);
        assert_eq!(step(&rig, 150.0), CullTransition::Culled);
        let t0 = rig.manager.binding("g").unwrap().virtual_time;
        assert!((t0 - 0.75).abs() < 1e-9);

        rig.clock.advance(3.0);
        assert_eq!(step(&rig, 10.0), CullTransition::Resumed);
        let offset = rig.manager.playback_offset("g").unwrap();
        assert!((offset - (0.75 + 3.0) % 2.0).abs() < 1e-9, "offset {offset}");
    }

    #[test]
    fn returning_mid_fade_cancels() {
        let rig = rig();
        let _d = committed(&rig, 1);
        step(&rig, 150.0);
        rig.clock.advance(0.01);
        assert_eq!(step(&rig, 10.0), CullTransition::FadeCancelled);
        rig.clock.advance(1.0);
        assert_eq!(step(&rig, 10.0), CullTransition::None);
        let info = rig.manager.binding("g").unwrap();
        assert!(!info.is_culled);
        assert!((info.gain - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unfreeze_clears_pending_and_returns_live() {
        let rig = rig();
        let _d = committed(&rig, 1);
        step(&rig, 150.0);
        rig.manager.unfreeze("g").unwrap();
        let info = rig.manager.binding("g").unwrap();
        assert_eq!(info.mode, SpatialMode::Live);
        assert!(!info.cull_pending);
        assert!(matches!(
            rig.manager.unfreeze("g"),
            Err(SpatialBindError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn clock_going_backwards_self_heals() {
        let rig = rig();
        rig.clock.set(10.0);
        let _d = committed(&rig, 1);
        step(&rig, 150.0);
        rig.clock.set(5.0);
        assert_eq!(step(&rig, 150.0), CullTransition::Healed);
        // Next frame re-evaluates from a clean state.
        assert_eq!(step(&rig, 150.0), CullTransition::FadeStarted);
    }

    #[test]
    fn different_context_uses_bridge() {
        let rig = rig();
        let listener = ListenerHandle {
            position: PositionHandle::default(),
            context: AudioContextInfo {
                id: 2,
                sample_rate: 2000,
            },
        };
        let _d = rig
            .manager
            .bind("g", rig.emitter.clone(), listener, options().without_culling())
            .unwrap();
        assert!(rig.manager.binding("g").unwrap().bridged);
        assert!(rig.manager.stats().estimated_memory_mb > 0.0);
        let mut out = StereoBuffer::new(16);
        assert!(rig.manager.pull_bridged("g", &mut out).unwrap());
    }
}
