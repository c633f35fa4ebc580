use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use echoform_spec::{NodeType, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

impl Response {
    fn parse(name: &str) -> Self {
        match name {
            "highpass" => Self::HighPass,
            "bandpass" => Self::BandPass,
            "notch" => Self::Notch,
            _ => Self::LowPass,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::LowPass => "lowpass",
            Self::HighPass => "highpass",
            Self::BandPass => "bandpass",
            Self::Notch => "notch",
        }
    }

    fn biquad_type(self) -> Type<f32> {
        match self {
            Self::LowPass => Type::LowPass,
            Self::HighPass => Type::HighPass,
            Self::BandPass => Type::BandPass,
            Self::Notch => Type::Notch,
        }
    }
}

/// Stereo biquad filter backed by the `biquad` crate.
#[derive(Debug, Clone)]
pub struct Filter {
    response: Response,
    frequency: AudioParam,
    q: AudioParam,
    sample_rate: f32,
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
    last: (f32, f32),
    freq_scratch: Vec<f32>,
    q_scratch: Vec<f32>,
}

impl Filter {
    /// Default low-pass at 1 kHz.
    pub fn new(sample_rate: f32) -> Self {
        let frequency = super::default_param(NodeType::Filter, "frequency");
        let q = super::default_param(NodeType::Filter, "q");
        let coeffs = design(Response::LowPass, sample_rate, frequency.base_value(), q.base_value())
            .unwrap_or_else(passthrough);
        Self {
            response: Response::LowPass,
            last: (frequency.base_value(), q.base_value()),
            frequency,
            q,
            sample_rate,
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
            freq_scratch: Vec::new(),
            q_scratch: Vec::new(),
        }
    }

    fn update(&mut self, frequency: f32, q: f32) {
        if let Some(coeffs) = design(self.response, self.sample_rate, frequency, q) {
            self.left.update_coefficients(coeffs);
            self.right.update_coefficients(coeffs);
        }
        self.last = (frequency, q);
    }
}

fn passthrough() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Coefficients for the response, with the cutoff kept below Nyquist.
fn design(
    response: Response,
    sample_rate: f32,
    frequency: f32,
    q: f32,
) -> Option<Coefficients<f32>> {
    let f0 = frequency.clamp(1.0, sample_rate * 0.49);
    Coefficients::<f32>::from_params(
        response.biquad_type(),
        sample_rate.hz(),
        f0.hz(),
        q.max(0.01),
    )
    .ok()
}

impl AudioNode for Filter {
    fn node_type(&self) -> NodeType {
        NodeType::Filter
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        match name {
            "frequency" => Some(&self.frequency),
            "q" => Some(&self.q),
            _ => None,
        }
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        match name {
            "frequency" => Some(&mut self.frequency),
            "q" => Some(&mut self.q),
            _ => None,
        }
    }

    fn set_option(&mut self, name: &str, value: &ParamValue) {
        if name == "type" {
            self.response = Response::parse(value.as_str().unwrap_or("lowpass"));
            let (f, q) = self.last;
            self.update(f, q);
        }
    }

    fn option(&self, name: &str) -> Option<ParamValue> {
        (name == "type").then(|| ParamValue::Text(self.response.name().to_string()))
    }

    fn process(&mut self, ctx: &BlockContext, input: &StereoBuffer, output: &mut StereoBuffer) {
        self.freq_scratch.resize(ctx.frames, 0.0);
        self.q_scratch.resize(ctx.frames, 0.0);
        let start = ctx.start_time();
        self.frequency.fill(start, ctx.sample_rate, &mut self.freq_scratch);
        self.q.fill(start, ctx.sample_rate, &mut self.q_scratch);

        for i in 0..ctx.frames {
            let (f, q) = (self.freq_scratch[i], self.q_scratch[i]);
            if f != self.last.0 || q != self.last.1 {
                self.update(f, q);
            }
            output.left[i] = self.left.run(input.left[i]);
            output.right[i] = self.right.run(input.right[i]);
        }
    }

    fn reset(&mut self) {
        self.left.reset_state();
        self.right.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn tone(freq: f32, sr: f32, n: usize) -> StereoBuffer {
        let mut b = StereoBuffer::new(n);
        for i in 0..n {
            let s = (i as f32 * freq * std::f32::consts::TAU / sr).sin();
            b.left[i] = s;
            b.right[i] = s;
        }
        b
    }

    #[test]
    fn lowpass_attenuates_highs() {
        let sr = 48000.0;
        let ctx = BlockContext {
            sample_rate: sr,
            start_frame: 0,
            frames: 4800,
        };
        let mut f = Filter::new(sr);
        f.frequency.set_value(200.0);
        let mut out = StereoBuffer::new(4800);
        f.process(&ctx, &tone(8000.0, sr, 4800), &mut out);
        assert!(rms(&out.left[2400..]) < 0.05);

        f.reset();
        f.set_option("type", &"highpass".into());
        f.process(&ctx, &tone(8000.0, sr, 4800), &mut out);
        assert!(rms(&out.left[2400..]) > 0.6);
        assert_eq!(f.option("type"), Some(ParamValue::Text("highpass".into())));
    }

    #[test]
    fn cutoff_above_nyquist_is_clamped() {
        assert!(design(Response::LowPass, 8000.0, 20000.0, 0.7).is_some());
    }
}
