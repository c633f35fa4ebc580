use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_spec::{NodeType, ParamValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded white or pink noise. Identical seeds give identical streams.
#[derive(Debug, Clone)]
pub struct Noise {
    gain: AudioParam,
    pink: bool,
    seed: u64,
    rng: StdRng,
    // Paul Kellet's economy pink filter state.
    b: [f32; 3],
    scratch: Vec<f32>,
}

impl Noise {
    /// White noise from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            gain: super::default_param(NodeType::Noise, "gain"),
            pink: false,
            seed,
            rng: StdRng::seed_from_u64(seed),
            b: [0.0; 3],
            scratch: Vec::new(),
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let white: f32 = self.rng.gen_range(-1.0..1.0);
        if !self.pink {
            return white;
        }
        self.b[0] = 0.99765 * self.b[0] + white * 0.0990460;
        self.b[1] = 0.96300 * self.b[1] + white * 0.2965164;
        self.b[2] = 0.57000 * self.b[2] + white * 1.0526913;
        (self.b[0] + self.b[1] + self.b[2] + white * 0.1848) * 0.25
    }
}

impl AudioNode for Noise {
    fn node_type(&self) -> NodeType {
        NodeType::Noise
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        (name == "gain").then_some(&self.gain)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        (name == "gain").then_some(&mut self.gain)
    }

    fn set_option(&mut self, name: &str, value: &ParamValue) {
        if name == "color" {
            self.pink = value.as_str() == Some("pink");
        }
    }

    fn option(&self, name: &str) -> Option<ParamValue> {
        let color = if self.pink { "pink" } else { "white" };
        (name == "color").then(|| ParamValue::Text(color.to_string()))
    }

    fn process(&mut self, ctx: &BlockContext, _input: &StereoBuffer, output: &mut StereoBuffer) {
        self.scratch.resize(ctx.frames, 0.0);
        let mut gains = std::mem::take(&mut self.scratch);
        self.gain.fill(ctx.start_time(), ctx.sample_rate, &mut gains);
        for (i, g) in gains.iter().enumerate() {
            let s = self.next() * g;
            output.left[i] = s;
            output.right[i] = s;
        }
        self.scratch = gains;
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.b = [0.0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(noise: &mut Noise) -> Vec<f32> {
        let ctx = BlockContext {
            sample_rate: 48000.0,
            start_frame: 0,
            frames: 64,
        };
        let input = StereoBuffer::new(64);
        let mut out = StereoBuffer::new(64);
        noise.process(&ctx, &input, &mut out);
        out.left
    }

    #[test]
    fn same_seed_same_stream() {
        let a = render(&mut Noise::new(11));
        let b = render(&mut Noise::new(11));
        let c = render(&mut Noise::new(12));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn reset_replays_stream() {
        let mut n = Noise::new(5);
        n.set_option("color", &"pink".into());
        let first = render(&mut n);
        n.reset();
        assert_eq!(render(&mut n), first);
        assert!(first.iter().all(|s| s.is_finite()));
    }
}
