//! Container header detection for speech streams
//!
//! Synthesis services can wrap linear PCM in a RIFF/WAVE container. The
//! player only understands raw samples, so the header is validated against
//! the expected [`PcmFormat`] and stripped before any audio is scheduled.
//! Streams that do not start with `RIFF` pass through unchanged.

use bytes::{Bytes, BytesMut};

use crate::voice::PcmFormat;
use crate::{Error, Result};

/// Largest header accepted before giving up on finding the `data` chunk
const MAX_HEADER_BYTES: usize = 64 * 1024;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Result of feeding bytes into a [`ContainerProbe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// More bytes are needed to decide
    NeedMore,
    /// The header is resolved; the payload bytes seen so far follow
    Ready(Bytes),
}

/// Detected framing of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bare samples
    Raw,
    /// RIFF/WAVE with a validated `fmt ` chunk
    Wav,
}

/// Incremental RIFF/WAVE header parser
#[derive(Debug)]
pub struct ContainerProbe {
    expected: PcmFormat,
    buffer: BytesMut,
    framing: Option<Framing>,
}

impl ContainerProbe {
    /// Create a probe that validates against `expected`
    #[must_use]
    pub fn new(expected: PcmFormat) -> Self {
        Self {
            expected,
            buffer: BytesMut::new(),
            framing: None,
        }
    }

    /// Framing detected so far, if resolved
    #[must_use]
    pub const fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Feed the next chunk of the stream
    ///
    /// Once [`Probe::Ready`] has been returned, later chunks should bypass the
    /// probe entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the header describes a format other than
    /// the expected one, or is malformed
    pub fn push(&mut self, chunk: &[u8]) -> Result<Probe> {
        if self.framing.is_some() {
            return Ok(Probe::Ready(Bytes::copy_from_slice(chunk)));
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() < 4 {
            return Ok(Probe::NeedMore);
        }

        if &self.buffer[..4] != b"RIFF" {
            self.framing = Some(Framing::Raw);
            return Ok(Probe::Ready(self.buffer.split().freeze()));
        }

        match self.parse_wav()? {
            Some(payload_offset) => {
                self.framing = Some(Framing::Wav);
                let _header = self.buffer.split_to(payload_offset);
                Ok(Probe::Ready(self.buffer.split().freeze()))
            }
            None if self.buffer.len() > MAX_HEADER_BYTES => Err(Error::Format(format!(
                "no data chunk within {MAX_HEADER_BYTES} bytes of WAV header"
            ))),
            None => Ok(Probe::NeedMore),
        }
    }

    /// Signal end of stream while the header is still unresolved
    ///
    /// A stream too short to carry a header is treated as raw audio; a
    /// truncated WAV header yields no payload.
    #[must_use]
    pub fn finish(mut self) -> Bytes {
        if self.framing.is_some() || self.buffer.starts_with(b"RIFF") {
            if !self.buffer.is_empty() {
                tracing::warn!(
                    bytes = self.buffer.len(),
                    "speech stream ended inside WAV header"
                );
            }
            return Bytes::new();
        }
        self.buffer.split().freeze()
    }

    /// Walk RIFF chunks; returns the payload offset once `data` is reached
    fn parse_wav(&self) -> Result<Option<usize>> {
        let buf = &self.buffer[..];
        if buf.len() < 12 {
            return Ok(None);
        }
        if &buf[8..12] != b"WAVE" {
            return Err(Error::Format("RIFF stream is not WAVE".to_string()));
        }

        let mut offset = 12;
        let mut format_seen = false;

        loop {
            let Some(header) = buf.get(offset..offset + 8) else {
                return Ok(None);
            };
            let id = &header[..4];
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let body_start = offset + 8;

            if id == b"data" {
                if !format_seen {
                    return Err(Error::Format("WAV data chunk before fmt chunk".to_string()));
                }
                return Ok(Some(body_start));
            }

            // Chunk bodies are padded to even length
            let body_end = body_start + size + size % 2;
            let Some(body) = buf.get(body_start..body_start + size) else {
                return Ok(None);
            };

            if id == b"fmt " {
                self.validate_fmt(body)?;
                format_seen = true;
            } else {
                tracing::trace!(chunk = %String::from_utf8_lossy(id), size, "skipping WAV chunk");
            }

            offset = body_end;
        }
    }

    fn validate_fmt(&self, body: &[u8]) -> Result<()> {
        if body.len() < 16 {
            return Err(Error::Format(format!("fmt chunk too short: {} bytes", body.len())));
        }

        let tag = u16::from_le_bytes([body[0], body[1]]);
        let channels = u16::from_le_bytes([body[2], body[3]]);
        let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);

        if tag != WAVE_FORMAT_PCM && tag != WAVE_FORMAT_EXTENSIBLE {
            return Err(Error::Format(format!("unsupported WAV format tag {tag:#06x}")));
        }

        let found = PcmFormat {
            sample_rate,
            channels,
            bits_per_sample,
        };
        if found != self.expected {
            return Err(Error::Format(format!(
                "expected {}ch/{}bit/{}Hz, stream is {}ch/{}bit/{}Hz",
                self.expected.channels,
                self.expected.bits_per_sample,
                self.expected.sample_rate,
                found.channels,
                found.bits_per_sample,
                found.sample_rate,
            )));
        }

        tracing::debug!(sample_rate, channels, bits_per_sample, "validated WAV header");
        Ok(())
    }
}
