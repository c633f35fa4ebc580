//! Node abstraction and the explicit per-node control handle.

use crate::buffer::StereoBuffer;
use crate::param::AudioParam;
use echoform_spec::{Coerced, NodeType, ParamError, ParamKind, ParamValue};
use std::collections::BTreeMap;

/// Timing of the block being processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockContext {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Absolute frame index of the first sample.
    pub start_frame: u64,
    /// Frames in this block.
    pub frames: usize,
}

impl BlockContext {
    /// Absolute time of the first sample, seconds.
    pub fn start_time(&self) -> f64 {
        self.start_frame as f64 / f64::from(self.sample_rate)
    }
}

/// Signal-processing behavior of one node type.
///
/// Nodes read the summed output of their upstream nodes and write one stereo
/// block. Automatable parameters are exposed as [`AudioParam`]s so they can be
/// scheduled; everything else goes through [`set_option`](Self::set_option).
pub trait AudioNode: Send {
    /// Registered type of this node.
    fn node_type(&self) -> NodeType;

    /// Schedulable parameter by name.
    fn param(&self, name: &str) -> Option<&AudioParam>;

    /// Mutable schedulable parameter by name.
    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam>;

    /// Applies a non-automatable parameter (enum, switch or fixed number).
    /// `value` has already been coerced against the schema.
    fn set_option(&mut self, name: &str, value: &ParamValue);

    /// Current value of a non-automatable parameter.
    fn option(&self, name: &str) -> Option<ParamValue>;

    /// Processes one block.
    fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer);

    /// Clears internal state (delay lines, filter memory, playback position).
    fn reset(&mut self) {}
}

/// Control surface for one live node: its id, its type, raw access to its
/// schedulable parameters, and schema-checked writes.
pub struct NodeHandle {
    id: String,
    node_type: NodeType,
    node: Box<dyn AudioNode>,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .finish_non_exhaustive()
    }
}

impl NodeHandle {
    /// Wraps a node instance.
    pub fn new(id: impl Into<String>, node: Box<dyn AudioNode>) -> Self {
        Self {
            id: id.into(),
            node_type: node.node_type(),
            node,
        }
    }

    /// Node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Node type.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Direct access to a schedulable parameter, bypassing schema checks.
    pub fn raw_control(&mut self, name: &str) -> Option<&mut AudioParam> {
        self.node.param_mut(name)
    }

    /// Coerces and applies one parameter immediately. For schedulable
    /// parameters this moves the base value and leaves scheduled events alone.
    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<Coerced, ParamError> {
        let spec = self.node_type.param(name)?;
        let coerced = spec.coerce(value)?;
        match (&spec.kind, self.node.param_mut(name)) {
            (ParamKind::Number { .. }, Some(param)) if spec.automatable => {
                param.set_value(coerced.value.as_f64().unwrap_or_default() as f32);
            }
            _ => self.node.set_option(name, &coerced.value),
        }
        Ok(coerced)
    }

    /// Coerces and schedules a step change of an automatable parameter at
    /// absolute graph time `at`.
    pub fn schedule_param(
        &mut self,
        name: &str,
        value: &ParamValue,
        at: f64,
    ) -> Result<Coerced, ParamError> {
        let spec = self.node_type.automatable_param(name)?;
        let coerced = spec.coerce(value)?;
        if let Some(param) = self.node.param_mut(name) {
            param.set_value_at(coerced.value.as_f64().unwrap_or_default() as f32, at);
        }
        Ok(coerced)
    }

    /// Drops a step change previously scheduled with
    /// [`schedule_param`](Self::schedule_param).
    pub fn cancel_scheduled(&mut self, name: &str, value: &ParamValue, at: f64) -> bool {
        let value = value.as_f64().unwrap_or_default() as f32;
        self.node
            .param_mut(name)
            .is_some_and(|param| param.cancel_set_at(value, at))
    }

    /// Applies every parameter in `params`, stopping at the first invalid one.
    /// Returns the names of parameters that were clamped.
    pub fn set(
        &mut self,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Vec<String>, ParamError> {
        let mut clamped = Vec::new();
        for (name, value) in params {
            if self.set_param(name, value)?.clamped {
                clamped.push(name.clone());
            }
        }
        Ok(clamped)
    }

    /// Current value of a parameter: the base value for schedulable
    /// parameters, the stored option otherwise.
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        match self.node.param(name) {
            Some(p) => Some(ParamValue::Number(f64::from(p.base_value()))),
            None => self.node.option(name),
        }
    }

    /// Processes one block.
    pub fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer) {
        self.node.process(ctx, input, output);
    }

    /// Resets internal state.
    pub fn reset(&mut self) {
        self.node.reset();
    }
}
