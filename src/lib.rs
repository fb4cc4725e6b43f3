//! Linguo - a spoken language tutor
//!
//! This library provides the core functionality for Linguo:
//! - Gapless playback of PCM speech streamed from a synthesis service
//! - Microphone capture and utterance detection
//! - Transcription, chat completion and speech synthesis clients
//! - The tutor turn and the hands-free conversation loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Conversation (capture → utterance → turn)     │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │  Tutor:  STT (Groq)  │  Chat (Groq)  │  TTS (Deepgram)│
//! └────────────────────┬─────────────────────────────────┘
//!                      │ Stream<Item = Bytes>
//! ┌────────────────────▼─────────────────────────────────┐
//! │  StreamingPlayer → PlaybackSession → OutputClock     │
//! │                    (cpal speaker or headless)        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod tutor;
pub mod voice;

pub use config::Config;
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use llm::{ChatClient, ChatMessage, Completer, Role};
pub use tutor::{Turn, TurnInput, Tutor};
pub use voice::{PlaybackOutcome, StreamingPlayer};
