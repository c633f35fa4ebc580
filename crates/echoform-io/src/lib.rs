//! Audio buffers and WAV I/O for echoform.
//!
//! - [`AudioBuffer`]: planar decoded audio shared by the cache, player nodes
//!   and the render pipeline
//! - [`decode_wav`] / [`read_wav`]: PCM or float WAV to [`AudioBuffer`]
//! - [`encode_wav`]: DC removal, clip-safe scaling, optional normalization and
//!   TPDF dither to 16- or 24-bit PCM, byte-for-byte reproducible
//!
//! ```rust
//! use echoform_io::{AudioBuffer, EncodeOptions, decode_wav, encode_wav};
//!
//! let tone: Vec<f32> = (0..480).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
//! let buffer = AudioBuffer::new(vec![tone.clone(), tone], 48000);
//! let encoded = encode_wav(&buffer, &EncodeOptions::default()).unwrap();
//! let decoded = decode_wav(&encoded.bytes).unwrap();
//! assert_eq!(decoded.frames(), 480);
//! ```

mod buffer;
mod encode;
mod wav;

pub use buffer::AudioBuffer;
pub use encode::{EncodeOptions, Encoded, NORMALIZE_BELOW, condition, encode_wav};
pub use wav::{decode_wav, read_wav, write_wav_f32};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV parse or write error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Bit depth other than 16 or 24 requested for integer encoding.
    #[error("unsupported bit depth: {0} (expected 16 or 24)")]
    UnsupportedBitDepth(u16),

    /// Audio with zero channels.
    #[error("audio has no channels")]
    NoChannels,

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
