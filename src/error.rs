//! Error types for Linguo

use thiserror::Error;

/// Result type alias for Linguo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Linguo
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Output device or clock could not be acquired
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech stream framing does not match the playback contract
    #[error("audio format error: {0}")]
    Format(String),

    /// Recorded audio produced no transcript
    #[error("invalid audio: no speech recognized")]
    InvalidAudio,

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text completion error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
