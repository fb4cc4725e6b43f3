//! Voice processing module
//!
//! Handles microphone capture, utterance detection, the speech services and
//! gapless playback of streamed PCM speech.

mod activity;
mod capture;
mod container;
pub mod output;
mod pcm;
mod player;
mod session;
mod stt;
mod tts;

pub use activity::{Activity, DetectorState, UtteranceDetector, calculate_energy};
pub use capture::{AudioCapture, CAPTURE_SAMPLE_RATE, samples_to_wav};
pub use container::{ContainerProbe, Framing, Probe};
pub use output::{FrameHandle, HeadlessOutput, OutputClock, OutputDevice, Pacing, SpeakerOutput};
pub use pcm::{
    AudioFrame, PLAYBACK_SAMPLE_RATE, PcmFormat, SampleAssembler, decode_linear16, ticks_to_secs,
};
pub use player::{PlaybackOutcome, StreamingPlayer};
pub use session::PlaybackSession;
pub use stt::{DEFAULT_STT_BASE_URL, DEFAULT_STT_MODEL, SpeechToText, Transcriber};
pub use tts::{
    DEFAULT_TTS_BASE_URL, DEFAULT_TTS_MODEL, SpeechContainer, SpeechStream, Synthesizer,
    TextToSpeech,
};
