//! TOML configuration file loading
//!
//! Supports `~/.config/linguo/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LinguoConfigFile {
    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// API keys configuration
#[derive(Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub groq: Option<String>,
    pub deepgram: Option<String>,
}

impl std::fmt::Debug for ApiKeysFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeysFileConfig")
            .field("groq", &self.groq.as_ref().map(|_| "[REDACTED]"))
            .field("deepgram", &self.deepgram.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Chat model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "llama3-8b-8192")
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,

    /// Tutor instructions
    pub system_prompt: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-large-v3")
    pub stt_model: Option<String>,

    /// OpenAI-compatible transcription base URL
    pub stt_base_url: Option<String>,

    /// TTS model (e.g. "aura-asteria-en")
    pub tts_model: Option<String>,

    /// Deepgram API base URL
    pub tts_base_url: Option<String>,

    /// Container requested for synthesized speech ("none" or "wav")
    pub tts_container: Option<String>,

    /// Output device name; system default when unset
    pub output_device: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LinguoConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LinguoConfigFile {
    config_file_path().map_or_else(LinguoConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`
pub fn load_config_file_from(path: &Path) -> LinguoConfigFile {
    if !path.exists() {
        return LinguoConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LinguoConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LinguoConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/linguo/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("linguo").join("config.toml"))
}
