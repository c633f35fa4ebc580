//! WAV decoding and plain file output.

use crate::{AudioBuffer, Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::io::{Cursor, Read};
use std::path::Path;

/// Decodes a complete WAV file held in memory.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    decode_reader(WavReader::new(Cursor::new(bytes))?)
}

/// Reads and decodes a WAV file.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    decode_reader(WavReader::open(path)?)
}

fn decode_reader<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(Error::NoChannels);
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &samples,
        channels,
        spec.sample_rate,
    ))
}

/// Writes a buffer as 32-bit float WAV without any conditioning.
pub fn write_wav_f32<P: AsRef<Path>>(path: P, buffer: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
