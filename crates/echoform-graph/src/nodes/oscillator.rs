use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_spec::{NodeType, ParamValue};
use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    fn parse(name: &str) -> Self {
        match name {
            "square" => Self::Square,
            "sawtooth" => Self::Sawtooth,
            "triangle" => Self::Triangle,
            _ => Self::Sine,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Sawtooth => "sawtooth",
            Self::Triangle => "triangle",
        }
    }

    /// Sample at phase in `[0, 1)`.
    #[inline]
    fn sample(self, phase: f64) -> f32 {
        let v = match self {
            Self::Sine => (phase * TAU).sin(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Sawtooth => 2.0 * phase - 1.0,
            Self::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        };
        v as f32
    }
}

/// Naive periodic oscillator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: AudioParam,
    gain: AudioParam,
    waveform: Waveform,
    phase: f64,
    freq_scratch: Vec<f32>,
    gain_scratch: Vec<f32>,
}

impl Oscillator {
    /// A 440 Hz sine.
    pub fn new() -> Self {
        Self {
            frequency: super::default_param(NodeType::Oscillator, "frequency"),
            gain: super::default_param(NodeType::Oscillator, "gain"),
            waveform: Waveform::Sine,
            phase: 0.0,
            freq_scratch: Vec::new(),
            gain_scratch: Vec::new(),
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for Oscillator {
    fn node_type(&self) -> NodeType {
        NodeType::Oscillator
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        match name {
            "frequency" => Some(&self.frequency),
            "gain" => Some(&self.gain),
            _ => None,
        }
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        match name {
            "frequency" => Some(&mut self.frequency),
            "gain" => Some(&mut self.gain),
            _ => None,
        }
    }

    fn set_option(&mut self, name: &str, value: &ParamValue) {
        if name == "waveform" {
            self.waveform = Waveform::parse(value.as_str().unwrap_or("sine"));
        }
    }

    fn option(&self, name: &str) -> Option<ParamValue> {
        (name == "waveform").then(|| ParamValue::Text(self.waveform.name().to_string()))
    }

    fn process(&mut self, ctx: &BlockContext, _input: &StereoBuffer, output: &mut StereoBuffer) {
        self.freq_scratch.resize(ctx.frames, 0.0);
        self.gain_scratch.resize(ctx.frames, 0.0);
        let start = ctx.start_time();
        self.frequency.fill(start, ctx.sample_rate, &mut self.freq_scratch);
        self.gain.fill(start, ctx.sample_rate, &mut self.gain_scratch);

        let sr = f64::from(ctx.sample_rate);
        for i in 0..ctx.frames {
            let s = self.waveform.sample(self.phase) * self.gain_scratch[i];
            output.left[i] = s;
            output.right[i] = s;
            self.phase = (self.phase + f64::from(self.freq_scratch[i]) / sr).fract();
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
