//! Deterministic PCM encoding of rendered audio.
//!
//! The conditioning chain runs in a fixed order:
//!
//! 1. Per-channel DC offset removal (subtract the channel mean)
//! 2. Peak detection across all channels
//! 3. Hard clamp to `[-1, 1]` when the peak exceeds full scale
//! 4. Optional normalization to `normalize_target` when requested and the
//!    peak is below [`NORMALIZE_BELOW`]
//! 5. TPDF dither (one LSB peak-to-peak per side) from a seeded RNG, then
//!    rounding to the target integer width
//!
//! The same input, options and seed always produce byte-identical output.

use crate::{AudioBuffer, Error, Result};
use hound::{SampleFormat, WavWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

/// Peak below which normalization is applied.
pub const NORMALIZE_BELOW: f32 = 0.7;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    /// Integer bit depth: 16 or 24.
    pub bit_depth: u16,
    /// Raise quiet renders to `normalize_target`.
    pub normalize: bool,
    /// Peak level normalization aims for.
    pub normalize_target: f32,
    /// Dither RNG seed.
    pub dither_seed: u64,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bit_depth: 16,
            normalize: false,
            normalize_target: 0.89,
            dither_seed: 0,
        }
    }
}

/// Output of [`encode_wav`].
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Complete RIFF/WAVE file.
    pub bytes: Vec<u8>,
    /// Conditioned float audio that was quantized.
    pub conditioned: AudioBuffer,
    /// Peak after DC removal, before clamping or normalization.
    pub peak: f32,
    /// Linear gain applied by normalization (1.0 when none).
    pub gain: f32,
}

struct TpdfDither {
    rng: StdRng,
}

impl TpdfDither {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Triangular noise in LSB units, range (-1, 1).
    fn sample(&mut self) -> f32 {
        let a: f32 = self.rng.r#gen();
        let b: f32 = self.rng.r#gen();
        a - b
    }
}

/// Applies DC removal, peak handling and optional normalization in place.
/// Returns `(peak, gain)`.
pub fn condition(buffer: &mut AudioBuffer, options: &EncodeOptions) -> (f32, f32) {
    for ch in 0..buffer.channel_count() {
        let samples = buffer.channel_mut(ch);
        if samples.is_empty() {
            continue;
        }
        let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / samples.len() as f64;
        let mean = mean as f32;
        for s in samples.iter_mut() {
            *s -= mean;
        }
    }

    let peak = buffer.peak();
    let mut gain = 1.0;
    if peak > 1.0 {
        for ch in 0..buffer.channel_count() {
            for s in buffer.channel_mut(ch) {
                *s = s.clamp(-1.0, 1.0);
            }
        }
    } else if options.normalize && peak > 0.0 && peak < NORMALIZE_BELOW {
        gain = options.normalize_target / peak;
        for ch in 0..buffer.channel_count() {
            for s in buffer.channel_mut(ch) {
                *s *= gain;
            }
        }
    }
    (peak, gain)
}

/// Conditions, dithers and encodes `buffer` as integer PCM WAV.
pub fn encode_wav(buffer: &AudioBuffer, options: &EncodeOptions) -> Result<Encoded> {
    if !matches!(options.bit_depth, 16 | 24) {
        return Err(Error::UnsupportedBitDepth(options.bit_depth));
    }
    if buffer.channel_count() == 0 {
        return Err(Error::NoChannels);
    }

    let mut conditioned = buffer.clone();
    let (peak, gain) = condition(&mut conditioned, options);

    let spec = hound::WavSpec {
        channels: conditioned.channel_count() as u16,
        sample_rate: conditioned.sample_rate(),
        bits_per_sample: options.bit_depth,
        sample_format: SampleFormat::Int,
    };
    let full_scale = (1i32 << (options.bit_depth - 1)) as f32;
    let mut dither = TpdfDither::new(options.dither_seed);

    let mut bytes = Vec::with_capacity(44 + conditioned.size_bytes());
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for i in 0..conditioned.frames() {
            for ch in conditioned.channels() {
                let q = quantise(ch[i], full_scale, dither.sample());
                if options.bit_depth == 16 {
                    writer.write_sample(q as i16)?;
                } else {
                    writer.write_sample(q)?;
                }
            }
        }
        writer.finalize()?;
    }

    tracing::debug!(
        frames = conditioned.frames(),
        peak,
        gain,
        bytes = bytes.len(),
        "encoded wav"
    );

    Ok(Encoded {
        bytes,
        conditioned,
        peak,
        gain,
    })
}

#[inline]
fn quantise(sample: f32, full_scale: f32, dither_lsb: f32) -> i32 {
    let scaled = sample * full_scale + dither_lsb;
    scaled.round().clamp(-full_scale, full_scale - 1.0) as i32
}
