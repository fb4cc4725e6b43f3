//! Utterance detection
//!
//! Splits microphone audio into utterances using RMS energy: speech starts
//! when a block is loud enough, and the utterance is complete once enough
//! speech has been followed by enough silence.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech for an utterance (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence that ends an utterance (0.5 s at 16 kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Result of feeding one block of samples
#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    /// Nothing is being said
    Quiet,
    /// The user just started speaking
    SpeechStarted,
    /// An utterance is in progress
    Speaking,
    /// The utterance ended; carries its samples
    Utterance(Vec<f32>),
}

/// State of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Listening,
}

/// Energy based utterance detector
#[derive(Debug)]
pub struct UtteranceDetector {
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    threshold: f32,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    /// Create a detector with the default energy threshold
    #[must_use]
    pub const fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Create a detector with a custom RMS threshold
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            threshold,
        }
    }

    /// Process a block of samples
    pub fn process(&mut self, samples: &[f32]) -> Activity {
        if samples.is_empty() {
            return match self.state {
                DetectorState::Idle => Activity::Quiet,
                DetectorState::Listening => Activity::Speaking,
            };
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Idle => {
                if !is_speech {
                    return Activity::Quiet;
                }
                self.state = DetectorState::Listening;
                self.speech_buffer.clear();
                self.speech_buffer.extend_from_slice(samples);
                self.silence_counter = 0;
                tracing::trace!(energy, "speech detected, listening");
                Activity::SpeechStarted
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        let utterance = std::mem::take(&mut self.speech_buffer);
                        self.reset();
                        return Activity::Utterance(utterance);
                    }

                    // Too short to be speech
                    tracing::trace!("discarding short noise burst");
                    self.reset();
                    return Activity::Quiet;
                }

                Activity::Speaking
            }
        }
    }

    /// Samples accumulated for the current utterance
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Reset to idle, discarding any partial utterance
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
