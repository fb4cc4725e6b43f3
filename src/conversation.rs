//! Hands-free conversation loop
//!
//! Listens on the microphone, turns each utterance into a tutor turn and
//! plays the reply. Speaking over a reply stops it.

use std::future::Future;
use std::time::Duration;

use crate::tutor::{Tutor, TurnInput};
use crate::voice::{
    Activity, AudioCapture, CAPTURE_SAMPLE_RATE, StreamingPlayer, UtteranceDetector,
    samples_to_wav,
};
use crate::{Error, Result};

/// How often captured audio is inspected
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A spoken conversation with the tutor
pub struct Conversation {
    tutor: Tutor,
    player: StreamingPlayer,
    detector: UtteranceDetector,
}

impl Conversation {
    #[must_use]
    pub fn new(tutor: Tutor, player: StreamingPlayer) -> Self {
        Self {
            tutor,
            player,
            detector: UtteranceDetector::new(),
        }
    }

    /// Use a custom detector (e.g. a different energy threshold)
    #[must_use]
    pub fn with_detector(mut self, detector: UtteranceDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Converse until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot be started
    #[allow(clippy::future_not_send)]
    pub async fn run<F>(mut self, mut capture: AudioCapture, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        capture.start()?;
        tracing::info!(device = capture.device_name(), "listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                () = tokio::time::sleep(POLL_INTERVAL) => {
                    let samples = capture.drain();
                    if let Err(e) = self.hear(&samples).await {
                        tracing::error!(error = %e, "voice processing error");
                    }
                }
            }
        }

        self.player.stop();
        capture.stop();
        Ok(())
    }

    /// Feed one block of captured samples
    ///
    /// # Errors
    ///
    /// Returns error if the utterance cannot be encoded
    pub async fn hear(&mut self, samples: &[f32]) -> Result<()> {
        match self.detector.process(samples) {
            Activity::SpeechStarted => {
                if self.player.is_playing() {
                    tracing::info!("barge-in, stopping reply");
                    self.player.stop();
                }
                Ok(())
            }
            Activity::Utterance(speech) => self.reply(&speech).await,
            Activity::Quiet | Activity::Speaking => Ok(()),
        }
    }

    async fn reply(&mut self, speech: &[f32]) -> Result<()> {
        let wav = samples_to_wav(speech, CAPTURE_SAMPLE_RATE)?;

        let turn = match self.tutor.respond(TurnInput::Audio(wav)).await {
            Ok(turn) => turn,
            Err(Error::InvalidAudio) => {
                tracing::debug!("no speech recognized");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                return Ok(());
            }
        };

        // The session is live before the next block is heard, so barge-in
        // always has something to stop
        if let Err(e) = self
            .player
            .spawn_play(turn.audio, || tracing::debug!("reply finished"))
        {
            tracing::warn!(error = %e, "reply playback failed");
        }

        Ok(())
    }
}
