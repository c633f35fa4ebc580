use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_spec::{NodeType, ParamValue};

/// Linear gain stage.
#[derive(Debug, Clone)]
pub struct Gain {
    gain: AudioParam,
    scratch: Vec<f32>,
}

impl Gain {
    /// Unity gain.
    pub fn new() -> Self {
        Self {
            gain: super::default_param(NodeType::Gain, "gain"),
            scratch: Vec::new(),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for Gain {
    fn node_type(&self) -> NodeType {
        NodeType::Gain
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        (name == "gain").then_some(&self.gain)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        (name == "gain").then_some(&mut self.gain)
    }

    fn set_option(&mut self, _name: &str, _value: &ParamValue) {}

    fn option(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer) {
        self.scratch.resize(ctx.frames, 0.0);
        self.gain
            .fill(ctx.start_time(), ctx.sample_rate, &mut self.scratch);
        for i in 0..ctx.frames {
            output.left[i] = input.left[i] * self.scratch[i];
            output.right[i] = input.right[i] * self.scratch[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_scheduled_gain() {
        let mut g = Gain::new();
        g.gain.set_value(0.5);
        g.gain.set_value_at(2.0, 1.0 / 48000.0 * 2.0);
        let ctx = BlockContext {
            sample_rate: 48000.0,
            start_frame: 0,
            frames: 4,
        };
        let mut input = StereoBuffer::new(4);
        input.left.fill(1.0);
        input.right.fill(1.0);
        let mut out = StereoBuffer::new(4);
        g.process(&ctx, &input, &mut out);
        assert_eq!(out.left, vec![0.5, 0.5, 2.0, 2.0]);
    }
}
