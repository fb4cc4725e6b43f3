//! One conversational turn with the tutor
//!
//! A turn transcribes the learner (unless they typed), asks the chat model
//! for a reply and starts synthesizing it. The reply audio is returned as a
//! stream so playback can begin before synthesis finishes.

use std::sync::Arc;
use std::time::Instant;

use crate::llm::{ChatMessage, Completer};
use crate::voice::{SpeechStream, Synthesizer, Transcriber};
use crate::{Error, Result};

/// What the learner said
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Typed text, used as the transcript as-is
    Text(String),
    /// Recorded WAV audio
    Audio(Vec<u8>),
}

/// Result of a turn
pub struct Turn {
    pub transcript: String,
    pub response: String,
    pub audio: SpeechStream,
}

/// Conversation state plus the services a turn needs
pub struct Tutor {
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn Completer>,
    synthesizer: Arc<dyn Synthesizer>,
    history: Vec<ChatMessage>,
}

impl Tutor {
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn Completer>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            completer,
            synthesizer,
            history: Vec::new(),
        }
    }

    /// Messages exchanged so far
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget the conversation
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Run one turn
    ///
    /// History is only extended once the reply audio has started streaming.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAudio`] if no speech was recognized, or the
    /// first upstream error
    pub async fn respond(&mut self, input: TurnInput) -> Result<Turn> {
        let started = Instant::now();

        let transcript = match input {
            TurnInput::Text(text) => {
                if text.trim().is_empty() {
                    return Err(Error::InvalidAudio);
                }
                text
            }
            TurnInput::Audio(wav) => self.transcriber.transcribe(wav).await?,
        };
        tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "transcribe");

        let stage = Instant::now();
        let response = self.completer.complete(&self.history, &transcript).await?;
        tracing::debug!(elapsed_ms = stage.elapsed().as_millis(), "text completion");

        let stage = Instant::now();
        let audio = self.synthesizer.synthesize(&response).await?;
        tracing::debug!(elapsed_ms = stage.elapsed().as_millis(), "synthesis request");

        self.history.push(ChatMessage::user(transcript.clone()));
        self.history.push(ChatMessage::assistant(response.clone()));

        tracing::info!(
            transcript = %transcript,
            response = %response,
            elapsed_ms = started.elapsed().as_millis(),
            "turn complete"
        );

        Ok(Turn {
            transcript,
            response,
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;

    struct FixedTranscript(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscript {
        async fn transcribe(&self, _wav: Vec<u8>) -> Result<String> {
            if self.0.is_empty() {
                return Err(Error::InvalidAudio);
            }
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct Echo {
        seen_history: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Completer for Echo {
        async fn complete(&self, history: &[ChatMessage], message: &str) -> Result<String> {
            self.seen_history.lock().unwrap().push(history.len());
            Ok(format!("echo: {message}"))
        }
    }

    struct Silence;

    #[async_trait]
    impl Synthesizer for Silence {
        async fn synthesize(&self, _text: &str) -> Result<SpeechStream> {
            Ok(SpeechStream::from_chunks(vec![Bytes::from_static(&[0, 0, 0, 0])]))
        }
    }

    struct Broken;

    #[async_trait]
    impl Synthesizer for Broken {
        async fn synthesize(&self, _text: &str) -> Result<SpeechStream> {
            Err(Error::Tts("503".to_string()))
        }
    }

    fn tutor(transcript: &'static str, echo: Arc<Echo>) -> Tutor {
        Tutor::new(Arc::new(FixedTranscript(transcript)), echo, Arc::new(Silence))
    }

    #[tokio::test]
    async fn test_audio_turn_transcribes_and_replies() {
        let mut tutor = tutor("hola", Arc::new(Echo::default()));
        let turn = tutor.respond(TurnInput::Audio(vec![1, 2, 3])).await.unwrap();

        assert_eq!(turn.transcript, "hola");
        assert_eq!(turn.response, "echo: hola");
        let audio: Vec<Bytes> = turn.audio.collect().await;
        assert_eq!(audio.len(), 1);
    }

    #[tokio::test]
    async fn test_history_grows_between_turns() {
        let echo = Arc::new(Echo::default());
        let mut tutor = tutor("unused", Arc::clone(&echo));

        tutor.respond(TurnInput::Text("uno".to_string())).await.unwrap();
        tutor.respond(TurnInput::Text("dos".to_string())).await.unwrap();

        assert_eq!(*echo.seen_history.lock().unwrap(), vec![0, 2]);
        assert_eq!(tutor.history().len(), 4);
        assert_eq!(tutor.history()[2], ChatMessage::user("dos"));

        tutor.clear();
        assert!(tutor.history().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_is_invalid_audio() {
        let mut tutor = tutor("", Arc::new(Echo::default()));
        assert!(matches!(
            tutor.respond(TurnInput::Text("  ".to_string())).await,
            Err(Error::InvalidAudio)
        ));
        assert!(matches!(
            tutor.respond(TurnInput::Audio(Vec::new())).await,
            Err(Error::InvalidAudio)
        ));
        assert!(tutor.history().is_empty());
    }

    #[tokio::test]
    async fn test_failed_synthesis_leaves_history_untouched() {
        let mut tutor = Tutor::new(
            Arc::new(FixedTranscript("hola")),
            Arc::new(Echo::default()),
            Arc::new(Broken),
        );
        let result = tutor.respond(TurnInput::Text("hola".to_string())).await;
        assert!(matches!(result, Err(Error::Tts(_))));
        assert!(tutor.history().is_empty());
    }
}
