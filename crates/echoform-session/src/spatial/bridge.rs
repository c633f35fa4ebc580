//! Stream bridge between two audio contexts.
//!
//! The graph side pushes interleaved stereo at its own rate; the listener
//! side pulls at its rate, linearly resampled. Overruns drop the newest
//! samples, underruns read silence.

use echoform_graph::StereoBuffer;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Graph-side half.
pub struct BridgeInput {
    producer: HeapProd<f32>,
    scratch: Vec<f32>,
    dropped_frames: u64,
}

/// Listener-side half.
pub struct BridgeOutput {
    consumer: HeapCons<f32>,
    /// Source frames advanced per output frame.
    step: f64,
    phase: f64,
    prev: [f32; 2],
    next: [f32; 2],
    underruns: u64,
}

/// Creates a bridge from `source_rate` to `target_rate` buffering
/// `latency_ms` of source audio.
pub fn stream_bridge(
    source_rate: u32,
    target_rate: u32,
    latency_ms: f64,
) -> (BridgeInput, BridgeOutput) {
    let frames = (f64::from(source_rate) * latency_ms.max(1.0) / 1000.0).ceil() as usize;
    let ring = HeapRb::<f32>::new(frames.max(256) * 2);
    let (producer, consumer) = ring.split();
    (
        BridgeInput {
            producer,
            scratch: Vec::new(),
            dropped_frames: 0,
        },
        BridgeOutput {
            consumer,
            step: f64::from(source_rate) / f64::from(target_rate.max(1)),
            phase: 1.0,
            prev: [0.0; 2],
            next: [0.0; 2],
            underruns: 0,
        },
    )
}

impl BridgeInput {
    /// Queues one block. Returns the frames that did not fit.
    pub fn push(&mut self, block: &StereoBuffer) -> usize {
        self.scratch.clear();
        for (l, r) in block.left.iter().zip(&block.right) {
            self.scratch.push(*l);
            self.scratch.push(*r);
        }
        let written = self.producer.push_slice(&self.scratch);
        let dropped = (self.scratch.len() - written) / 2;
        if dropped > 0 {
            self.dropped_frames += dropped as u64;
            tracing::warn!(dropped, "stream bridge overrun");
        }
        dropped
    }

    /// Frames dropped on overrun so far.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Samples the ring can hold.
    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }
}

impl BridgeOutput {
    /// Fills `out` with resampled audio.
    pub fn pull(&mut self, out: &mut StereoBuffer) {
        for i in 0..out.len() {
            while self.phase >= 1.0 {
                self.prev = self.next;
                let mut frame = [0.0f32; 2];
                if self.consumer.occupied_len() >= 2 {
                    self.consumer.pop_slice(&mut frame);
                } else {
                    self.underruns += 1;
                }
                self.next = frame;
                self.phase -= 1.0;
            }
            let t = self.phase as f32;
            out.left[i] = self.prev[0] + (self.next[0] - self.prev[0]) * t;
            out.right[i] = self.prev[1] + (self.next[1] - self.prev[1]) * t;
            self.phase += self.step;
        }
    }

    /// Source frames read while the ring was empty.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Frames waiting in the ring.
    pub fn queued_frames(&self) -> usize {
        self.consumer.occupied_len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(values: &[f32]) -> StereoBuffer {
        let mut b = StereoBuffer::new(values.len());
        b.left.copy_from_slice(values);
        b.right.copy_from_slice(values);
        b
    }

    #[test]
    fn same_rate_passes_through_with_one_frame_delay() {
        let (mut input, mut output) = stream_bridge(48000, 48000, 10.0);
        input.push(&block(&[1.0, 2.0, 3.0, 4.0]));
        let mut out = StereoBuffer::new(4);
        output.pull(&mut out);
        assert_eq!(out.left, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(out.right, out.left);
    }

    #[test]
    fn upsampling_interpolates() {
        let (mut input, mut output) = stream_bridge(24000, 48000, 10.0);
        input.push(&block(&[2.0, 4.0, 6.0]));
        let mut out = StereoBuffer::new(4);
        output.pull(&mut out);
        assert_eq!(out.left, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn underrun_reads_silence() {
        let (_input, mut output) = stream_bridge(48000, 48000, 10.0);
        let mut out = StereoBuffer::new(8);
        output.pull(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(output.underruns(), 8);
    }

    #[test]
    fn overrun_drops_excess() {
        let (mut input, output) = stream_bridge(1000, 1000, 1.0);
        let capacity_frames = input.capacity() / 2;
        let dropped = input.push(&StereoBuffer::new(capacity_frames + 10));
        assert_eq!(dropped, 10);
        assert_eq!(input.dropped_frames(), 10);
        assert_eq!(output.queued_frames(), capacity_frames);
    }
}
