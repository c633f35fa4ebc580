//! Planar multi-channel audio buffer.

use echoform_spec::Trim;

/// Decoded, planar audio: one `Vec<f32>` per channel, all of equal length.
///
/// This is the interchange type between the decoder, the buffer cache, the
/// player node and the render pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from planar channels.
    ///
    /// Channels longer than the shortest one are truncated.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// A silent buffer.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples. A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Interleaved copy (L, R, L, R, ...).
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channel_count());
        for i in 0..frames {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Decoded size in bytes (f32 samples).
    pub fn size_bytes(&self) -> usize {
        self.frames() * self.channel_count() * std::mem::size_of::<f32>()
    }

    /// One channel's samples.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutable channel access.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// All channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Sample for output channel `ch`. Mono buffers feed every output channel;
    /// otherwise channels past the last repeat the last one.
    #[inline]
    pub fn sample(&self, ch: usize, frame: usize) -> f32 {
        match self.channels.len() {
            0 => 0.0,
            n => self.channels[ch.min(n - 1)].get(frame).copied().unwrap_or(0.0),
        }
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Copy restricted to a trim window.
    pub fn trimmed(&self, trim: &Trim) -> Self {
        let total = self.duration_secs();
        let start = (trim.start.clamp(0.0, total) * f64::from(self.sample_rate)).round() as usize;
        let len = (trim.length(total) * f64::from(self.sample_rate)).round() as usize;
        let start = start.min(self.frames());
        let end = (start + len).min(self.frames());
        Self {
            channels: self.channels.iter().map(|ch| ch[start..end].to_vec()).collect(),
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_round_trip() {
        let buf = AudioBuffer::new(vec![vec![1.0, 2.0], vec![-1.0, -2.0]], 48000);
        let inter = buf.to_interleaved();
        assert_eq!(inter, vec![1.0, -1.0, 2.0, -2.0]);
        assert_eq!(AudioBuffer::from_interleaved(&inter, 2, 48000), buf);
    }

    #[test]
    fn ragged_channels_truncate() {
        let buf = AudioBuffer::new(vec![vec![0.0; 10], vec![0.0; 7]], 8000);
        assert_eq!(buf.frames(), 7);
        assert_eq!(buf.size_bytes(), 7 * 2 * 4);
    }

    #[test]
    fn mono_feeds_all_outputs() {
        let buf = AudioBuffer::new(vec![vec![0.25, 0.5]], 8000);
        assert_eq!(buf.sample(0, 1), 0.5);
        assert_eq!(buf.sample(1, 1), 0.5);
        assert_eq!(buf.sample(1, 9), 0.0);
    }

    #[test]
    fn trim_selects_window() {
        let buf = AudioBuffer::new(vec![(0..100).map(|i| i as f32).collect()], 100);
        let trimmed = buf.trimmed(&Trim {
            start: 0.25,
            end: Some(0.5),
        });
        assert_eq!(trimmed.frames(), 25);
        assert_eq!(trimmed.channel(0)[0], 25.0);
        assert!((trimmed.duration_secs() - 0.25).abs() < 1e-9);
    }
}
