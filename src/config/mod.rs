//! Configuration management for Linguo

pub mod file;

use secrecy::{ExposeSecret, SecretString};

use crate::llm::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::voice::{
    DEFAULT_STT_BASE_URL, DEFAULT_STT_MODEL, DEFAULT_TTS_BASE_URL, DEFAULT_TTS_MODEL,
    SpeechContainer,
};
use crate::{Error, Result};

use self::file::LinguoConfigFile;

/// Linguo configuration
#[derive(Debug)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Chat model configuration
    pub llm: LlmConfig,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `Groq` API key (transcription and chat)
    pub groq: Option<SecretString>,

    /// `Deepgram` API key (speech synthesis)
    pub deepgram: Option<SecretString>,
}

/// Chat model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Tutor instructions
    pub system_prompt: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model
    pub stt_model: String,

    /// OpenAI-compatible transcription base URL
    pub stt_base_url: String,

    /// TTS model
    pub tts_model: String,

    /// Deepgram API base URL
    pub tts_base_url: String,

    /// Container requested for synthesized speech
    pub tts_container: SpeechContainer,

    /// Output device name; system default when `None`
    pub output_device: Option<String>,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the speech container is not recognized
    pub fn from_sources<E>(fc: LinguoConfigFile, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_keys = ApiKeys {
            groq: env("GROQ_API_KEY")
                .or(fc.api_keys.groq)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        let groq_url = env("LINGUO_GROQ_URL");

        let llm = LlmConfig {
            model: env("LINGUO_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: groq_url
                .clone()
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            system_prompt: fc
                .llm
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let tts_container = env("LINGUO_TTS_CONTAINER")
            .or(fc.voice.tts_container)
            .map(|c| c.parse::<SpeechContainer>())
            .transpose()?
            .unwrap_or_default();

        let voice = VoiceConfig {
            stt_model: env("LINGUO_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            stt_base_url: groq_url
                .or(fc.voice.stt_base_url)
                .unwrap_or_else(|| DEFAULT_STT_BASE_URL.to_string()),
            tts_model: env("LINGUO_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_base_url: env("LINGUO_DEEPGRAM_URL")
                .or(fc.voice.tts_base_url)
                .unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_string()),
            tts_container,
            output_device: env("LINGUO_OUTPUT_DEVICE").or(fc.voice.output_device),
        };

        Ok(Self {
            api_keys,
            llm,
            voice,
        })
    }

    /// Groq API key
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn groq_key(&self) -> Result<SecretString> {
        require(self.api_keys.groq.as_ref(), "GROQ_API_KEY")
    }

    /// Deepgram API key
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn deepgram_key(&self) -> Result<SecretString> {
        require(self.api_keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")
    }
}

fn require(key: Option<&SecretString>, var: &str) -> Result<SecretString> {
    key.map(|k| SecretString::from(k.expose_secret().to_owned()))
        .ok_or_else(|| {
            Error::Config(format!(
                "{var} is not set (or add it under [api_keys] in the config file)"
            ))
        })
}
