use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_spec::{NodeType, ParamValue};

/// Longest delay time in seconds, matching the schema maximum.
const MAX_DELAY_SECS: f32 = 2.0;

/// Feedback delay with a fractional, interpolated read head.
#[derive(Debug, Clone)]
pub struct Delay {
    time: AudioParam,
    feedback: AudioParam,
    mix: AudioParam,
    lines: [Vec<f32>; 2],
    write: usize,
    scratch: [Vec<f32>; 3],
}

impl Delay {
    /// Allocates lines for [`MAX_DELAY_SECS`] at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        let len = (MAX_DELAY_SECS * sample_rate).ceil() as usize + 2;
        Self {
            time: super::default_param(NodeType::Delay, "time"),
            feedback: super::default_param(NodeType::Delay, "feedback"),
            mix: super::default_param(NodeType::Delay, "mix"),
            lines: [vec![0.0; len], vec![0.0; len]],
            write: 0,
            scratch: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    #[inline]
    fn read(line: &[f32], write: usize, delay_samples: f32) -> f32 {
        let len = line.len();
        let d = delay_samples.clamp(0.0, (len - 2) as f32);
        let whole = d.floor() as usize;
        let frac = d - d.floor();
        let i0 = (write + len - whole) % len;
        let i1 = (i0 + len - 1) % len;
        line[i0] + (line[i1] - line[i0]) * frac
    }
}

impl AudioNode for Delay {
    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        match name {
            "time" => Some(&self.time),
            "feedback" => Some(&self.feedback),
            "mix" => Some(&self.mix),
            _ => None,
        }
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        match name {
            "time" => Some(&mut self.time),
            "feedback" => Some(&mut self.feedback),
            "mix" => Some(&mut self.mix),
            _ => None,
        }
    }

    fn set_option(&mut self, _name: &str, _value: &ParamValue) {}

    fn option(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer) {
        let start = ctx.start_time();
        let [times, feedbacks, mixes] = &mut self.scratch;
        let lanes = [
            (&self.time, &mut *times),
            (&self.feedback, &mut *feedbacks),
            (&self.mix, &mut *mixes),
        ];
        for (param, buf) in lanes {
            buf.resize(ctx.frames, 0.0);
            param.fill(start, ctx.sample_rate, buf);
        }

        let len = self.lines[0].len();
        for i in 0..ctx.frames {
            let delay_samples = times[i] * ctx.sample_rate;
            let (fb, mix) = (feedbacks[i], mixes[i]);
            for (ch, x) in [input.left[i], input.right[i]].into_iter().enumerate() {
                let line = &mut self.lines[ch];
                let delayed = if delay_samples < 1.0 {
                    x
                } else {
                    Self::read(line, self.write, delay_samples)
                };
                line[self.write] = x + delayed * fb;
                let y = x * (1.0 - mix) + delayed * mix;
                if ch == 0 {
                    output.left[i] = y;
                } else {
                    output.right[i] = y;
                }
            }
            self.write = (self.write + 1) % len;
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write = 0;
    }
}
