//! Linear PCM framing, sample reassembly and decoding
//!
//! Speech arrives as an open-ended byte stream whose chunk boundaries fall
//! anywhere, including in the middle of a sample. [`SampleAssembler`] holds
//! the incomplete tail of each chunk so that every decoded frame contains only
//! whole samples.

use std::time::Duration;

/// Sample rate of synthesized speech
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Fixed framing of a linear PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample (signed, little-endian)
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 16-bit signed little-endian mono at 24 kHz
    pub const LINEAR16_MONO_24K: Self = Self {
        sample_rate: PLAYBACK_SAMPLE_RATE,
        channels: 1,
        bits_per_sample: 16,
    };

    /// Bytes per sample frame (all channels)
    #[must_use]
    pub const fn sample_width(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Playback duration of `samples` sample frames
    #[must_use]
    pub fn duration_of(&self, samples: u64) -> Duration {
        Duration::from_secs_f64(ticks_to_secs(samples, self.sample_rate))
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::LINEAR16_MONO_24K
    }
}

/// Convert a tick count at `sample_rate` to seconds
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ticks_to_secs(ticks: u64, sample_rate: u32) -> f64 {
    ticks as f64 / f64::from(sample_rate)
}

/// Decode 16-bit little-endian signed samples into `[-1.0, 1.0)`
///
/// Any trailing odd byte is ignored; callers go through [`SampleAssembler`]
/// to avoid handing one in.
#[must_use]
pub fn decode_linear16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Reassembles whole samples across arbitrary chunk boundaries
#[derive(Debug, Clone)]
pub struct SampleAssembler {
    width: usize,
    carry: Vec<u8>,
}

impl SampleAssembler {
    /// Create an assembler for `format`
    #[must_use]
    pub fn new(format: PcmFormat) -> Self {
        let width = format.sample_width().max(1);
        Self {
            width,
            carry: Vec::with_capacity(width),
        }
    }

    /// Append `chunk` after the carried bytes and decode every whole sample
    ///
    /// The bytes that do not complete a sample are kept for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<f32> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(chunk);

        let usable = data.len() - data.len() % self.width;
        self.carry = data.split_off(usable);

        decode_linear16(&data)
    }

    /// Number of bytes held over from the previous chunk
    #[must_use]
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// End the stream, returning how many trailing bytes were dropped
    #[must_use]
    pub fn finish(self) -> usize {
        self.carry.len()
    }
}

/// One playable buffer of mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wrap decoded samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Sample data
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Take the sample data
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of samples, which is also the frame length in clock ticks
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate of the frame
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(ticks_to_secs(self.samples.len() as u64, self.sample_rate))
    }
}
