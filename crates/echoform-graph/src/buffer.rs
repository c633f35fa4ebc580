//! Block-sized stereo buffers.

/// A stereo block buffer (planar left/right channels).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    /// Left channel samples.
    pub left: Vec<f32>,
    /// Right channel samples.
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// Creates a new zeroed stereo buffer with the given block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            left: vec![0.0; block_size],
            right: vec![0.0; block_size],
        }
    }

    /// Fills both channels with zeros.
    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Resizes both channels, zeroing new samples.
    pub fn resize(&mut self, block_size: usize) {
        self.left.resize(block_size, 0.0);
        self.right.resize(block_size, 0.0);
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Returns true if the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Adds `other * gain` into this buffer.
    pub fn add_scaled(&mut self, other: &StereoBuffer, gain: f32) {
        for (d, s) in self.left.iter_mut().zip(&other.left) {
            *d += s * gain;
        }
        for (d, s) in self.right.iter_mut().zip(&other.right) {
            *d += s * gain;
        }
    }

    /// Multiplies both channels by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for s in self.left.iter_mut().chain(self.right.iter_mut()) {
            *s *= gain;
        }
    }

    /// Largest absolute sample.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixes_with_gain() {
        let mut a = StereoBuffer::new(4);
        let mut b = StereoBuffer::new(4);
        b.left.fill(1.0);
        b.right.fill(-1.0);
        a.add_scaled(&b, 0.5);
        a.add_scaled(&b, 0.25);
        assert_eq!(a.left, vec![0.75; 4]);
        assert_eq!(a.right, vec![-0.75; 4]);
        assert_eq!(a.peak(), 0.75);
        a.scale(2.0);
        assert_eq!(a.left[0], 1.5);
    }
}
