use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_spec::{NodeType, ParamValue};
use std::f32::consts::{FRAC_PI_4, SQRT_2};

/// Equal-power stereo panner, unity at center.
#[derive(Debug, Clone)]
pub struct Panner {
    pan: AudioParam,
    scratch: Vec<f32>,
}

impl Panner {
    /// Centered panner.
    pub fn new() -> Self {
        Self {
            pan: super::default_param(NodeType::Panner, "pan"),
            scratch: Vec::new(),
        }
    }
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}

/// Left/right gains for a pan position in `[-1, 1]`.
#[inline]
fn pan_gains(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (theta.cos() * SQRT_2, theta.sin() * SQRT_2)
}

impl AudioNode for Panner {
    fn node_type(&self) -> NodeType {
        NodeType::Panner
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        (name == "pan").then_some(&self.pan)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        (name == "pan").then_some(&mut self.pan)
    }

    fn set_option(&mut self, _name: &str, _value: &ParamValue) {}

    fn option(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer) {
        self.scratch.resize(ctx.frames, 0.0);
        self.pan.fill(ctx.start_time(), ctx.sample_rate, &mut self.scratch);
        for i in 0..ctx.frames {
            let (l, r) = pan_gains(self.scratch[i]);
            output.left[i] = input.left[i] * l;
            output.right[i] = input.right[i] * r;
        }
    }
}
