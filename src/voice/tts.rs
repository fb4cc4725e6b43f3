//! Text-to-speech (TTS) client
//!
//! Speech is requested as linear PCM and handed to the player while it is
//! still downloading. Any container header is validated and stripped before
//! the stream is returned, so a format mismatch fails the request instead of
//! playing noise.

use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};

use crate::voice::{ContainerProbe, PcmFormat, Probe};
use crate::{Error, Result};

/// Default Deepgram API base URL
pub const DEFAULT_TTS_BASE_URL: &str = "https://api.deepgram.com/v1";

/// Default Deepgram voice model
pub const DEFAULT_TTS_MODEL: &str = "aura-asteria-en";

/// Container requested from the synthesis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechContainer {
    /// Bare samples
    #[default]
    None,
    /// RIFF/WAVE, stripped before playback
    Wav,
}

impl SpeechContainer {
    /// Query parameter value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Wav => "wav",
        }
    }
}

impl FromStr for SpeechContainer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Self::None),
            "wav" => Ok(Self::Wav),
            other => Err(Error::Config(format!("unknown speech container: {other}"))),
        }
    }
}

/// Turns text into a stream of speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the stream's framing does not
    /// match the playback format
    async fn synthesize(&self, text: &str) -> Result<SpeechStream>;
}

type ByteSource = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Raw PCM speech, ready for the player
///
/// Transport errors after the header has been validated end the stream.
pub struct SpeechStream {
    head: Option<Bytes>,
    source: ByteSource,
    done: bool,
}

impl SpeechStream {
    /// Wrap `source`, validating and stripping any container header
    ///
    /// # Errors
    ///
    /// Returns error if the source fails or the header does not match
    /// `format` before the first audio bytes arrive
    pub async fn open<S>(source: S, format: PcmFormat) -> Result<Self>
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let mut source: ByteSource = Box::pin(source);
        let mut probe = ContainerProbe::new(format);

        loop {
            match source.next().await {
                Some(Ok(chunk)) => {
                    if let Probe::Ready(head) = probe.push(&chunk)? {
                        tracing::debug!(framing = ?probe.framing(), "speech stream framing resolved");
                        return Ok(Self {
                            head: Some(head),
                            source,
                            done: false,
                        });
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Ok(Self {
                        head: Some(probe.finish()),
                        source,
                        done: true,
                    });
                }
            }
        }
    }

    /// Speech that is already in memory
    #[must_use]
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        Self {
            head: None,
            source: Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))),
            done: false,
        }
    }
}

impl Stream for SpeechStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        if let Some(head) = self.head.take() {
            return Poll::Ready(Some(head));
        }
        if self.done {
            return Poll::Ready(None);
        }

        match self.source.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(chunk)),
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "speech stream interrupted");
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Deepgram speech synthesis
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    container: SpeechContainer,
    format: PcmFormat,
}

impl TextToSpeech {
    /// Create a new TTS client producing 16-bit mono 24 kHz speech
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        api_key: SecretString,
        base_url: String,
        model: String,
        container: SpeechContainer,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            container,
            format: PcmFormat::LINEAR16_MONO_24K,
        })
    }

    fn query(&self) -> [(&'static str, String); 4] {
        [
            ("model", self.model.clone()),
            ("encoding", "linear16".to_string()),
            ("sample_rate", self.format.sample_rate.to_string()),
            ("container", self.container.as_str().to_string()),
        ]
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechStream> {
        #[derive(serde::Serialize)]
        struct SpeakRequest<'a> {
            text: &'a str,
        }

        tracing::debug!(chars = text.len(), model = %self.model, "requesting speech");

        let response = self
            .client
            .post(format!("{}/speak", self.base_url))
            .query(&self.query())
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .json(&SpeakRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Deepgram TTS error {status}: {body}")));
        }

        let source = response.bytes_stream().map(|r| r.map_err(Error::from));
        SpeechStream::open(source, self.format).await
    }
}
