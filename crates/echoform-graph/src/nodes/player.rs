use crate::buffer::StereoBuffer;
use crate::node::{AudioNode, BlockContext};
use crate::param::AudioParam;
use echoform_io::AudioBuffer;
use echoform_spec::{NodeType, ParamValue};
use std::sync::Arc;

/// Sample player. Reads its asset with linear interpolation, resampling when
/// the asset rate differs from the context rate. Without an asset it is silent.
#[derive(Debug, Clone)]
pub struct Player {
    buffer: Option<Arc<AudioBuffer>>,
    gain: AudioParam,
    rate: AudioParam,
    offset_secs: f64,
    loop_param: bool,
    asset_loops: bool,
    /// Read position in source frames.
    position: f64,
    gain_scratch: Vec<f32>,
    rate_scratch: Vec<f32>,
}

impl Player {
    /// Creates a player for `buffer`.
    pub fn new(buffer: Option<Arc<AudioBuffer>>, asset_loops: bool) -> Self {
        Self {
            buffer,
            gain: super::default_param(NodeType::Player, "gain"),
            rate: super::default_param(NodeType::Player, "playbackRate"),
            offset_secs: 0.0,
            loop_param: false,
            asset_loops,
            position: 0.0,
            gain_scratch: Vec::new(),
            rate_scratch: Vec::new(),
        }
    }

    /// Whether an asset is attached.
    pub fn has_asset(&self) -> bool {
        self.buffer.is_some()
    }

    fn looping(&self) -> bool {
        self.loop_param || self.asset_loops
    }

    fn rewind(&mut self) {
        self.position = self
            .buffer
            .as_ref()
            .map_or(0.0, |b| self.offset_secs * f64::from(b.sample_rate()));
    }
}

#[inline]
fn read_interpolated(buffer: &AudioBuffer, ch: usize, position: f64, looping: bool) -> f32 {
    let frames = buffer.frames();
    let i0 = position.floor() as usize;
    let frac = (position - position.floor()) as f32;
    let i1 = if looping && i0 + 1 >= frames { 0 } else { i0 + 1 };
    let a = buffer.sample(ch, i0);
    let b = buffer.sample(ch, i1);
    a + (b - a) * frac
}

impl AudioNode for Player {
    fn node_type(&self) -> NodeType {
        NodeType::Player
    }

    fn param(&self, name: &str) -> Option<&AudioParam> {
        match name {
            "gain" => Some(&self.gain),
            "playbackRate" => Some(&self.rate),
            _ => None,
        }
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AudioParam> {
        match name {
            "gain" => Some(&mut self.gain),
            "playbackRate" => Some(&mut self.rate),
            _ => None,
        }
    }

    fn set_option(&mut self, name: &str, value: &ParamValue) {
        match name {
            "offset" => {
                self.offset_secs = value.as_f64().unwrap_or(0.0);
                self.rewind();
            }
            "loop" => self.loop_param = value.as_bool().unwrap_or(false),
            _ => {}
        }
    }

    fn option(&self, name: &str) -> Option<ParamValue> {
        match name {
            "offset" => Some(ParamValue::Number(self.offset_secs)),
            "loop" => Some(ParamValue::Bool(self.loop_param)),
            _ => None,
        }
    }

    fn process(&mut self, ctx: &BlockContext, _input: &StereoBuffer, output: &mut StereoBuffer) {
        let Some(buffer) = self.buffer.clone() else {
            output.clear();
            return;
        };
        let frames = buffer.frames();
        if frames == 0 {
            output.clear();
            return;
        }

        self.gain_scratch.resize(ctx.frames, 0.0);
        self.rate_scratch.resize(ctx.frames, 0.0);
        let start = ctx.start_time();
        self.gain.fill(start, ctx.sample_rate, &mut self.gain_scratch);
        self.rate.fill(start, ctx.sample_rate, &mut self.rate_scratch);

        let ratio = f64::from(buffer.sample_rate()) / f64::from(ctx.sample_rate);
        let looping = self.looping();
        let end = frames as f64;

        for i in 0..ctx.frames {
            if self.position >= end {
                if looping {
                    self.position %= end;
                } else {
                    output.left[i] = 0.0;
                    output.right[i] = 0.0;
                    continue;
                }
            }
            let g = self.gain_scratch[i];
            output.left[i] = read_interpolated(&buffer, 0, self.position, looping) * g;
            output.right[i] = read_interpolated(&buffer, 1, self.position, looping) * g;
            self.position += f64::from(self.rate_scratch[i]) * ratio;
        }
    }

    fn reset(&mut self) {
        self.rewind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(start_frame: u64, frames: usize) -> BlockContext {
        BlockContext {
            sample_rate: 100.0,
            start_frame,
            frames,
        }
    }

    fn ramp_buffer() -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(vec![(0..10).map(|i| i as f32 * 0.1).collect()], 100))
    }

    #[test]
    fn plays_once_then_silence() {
        let mut p = Player::new(Some(ramp_buffer()), false);
        let input = StereoBuffer::new(12);
        let mut out = StereoBuffer::new(12);
        p.process(&ctx(0, 12), &input, &mut out);
        assert!((out.left[3] - 0.3).abs() < 1e-6);
        assert_eq!(out.left[3], out.right[3]);
        assert_eq!(out.left[10], 0.0);
        assert_eq!(out.left[11], 0.0);
    }

    #[test]
    fn loops_when_asset_loops() {
        let mut p = Player::new(Some(ramp_buffer()), true);
        let input = StereoBuffer::new(12);
        let mut out = StereoBuffer::new(12);
        p.process(&ctx(0, 12), &input, &mut out);
        assert!((out.left[11] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn resamples_by_rate_ratio() {
        let buf = Arc::new(AudioBuffer::new(vec![(0..10).map(|i| i as f32).collect()], 50));
        let mut p = Player::new(Some(buf), false);
        let input = StereoBuffer::new(4);
        let mut out = StereoBuffer::new(4);
        p.process(&ctx(0, 4), &input, &mut out);
        assert_eq!(out.left, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn offset_and_missing_asset() {
        let mut p = Player::new(Some(ramp_buffer()), false);
        p.set_option("offset", &ParamValue::Number(0.05));
        let input = StereoBuffer::new(1);
        let mut out = StereoBuffer::new(1);
        p.process(&ctx(0, 1), &input, &mut out);
        assert!((out.left[0] - 0.5).abs() < 1e-6);

        let mut silent = Player::new(None, false);
        out.left[0] = 1.0;
        silent.process(&ctx(0, 1), &input, &mut out);
        assert_eq!(out.left[0], 0.0);
        assert!(!silent.has_asset());
    }
}
