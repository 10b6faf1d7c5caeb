use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MrigaError, Result};
use crate::types::VoiceTag;

/// Top-level configuration for the Mriga client.
///
/// Loaded from `~/.mriga/config.toml` by default. Every section falls back to
/// its defaults when missing from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MrigaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl MrigaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MrigaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(_) if !path.exists() => {
                info!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MrigaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Remote model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Gemini model name.
    pub model: String,
    /// REST base URL, without the trailing `/{model}:method` part.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

/// Speech input/output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// BCP-47 language used by the recognizer.
    pub recognition_language: String,
    /// BCP-47 language of the synthesis voices to select.
    pub synthesis_language: String,
    /// Speaking rate of the console synthesizer.
    pub words_per_minute: u32,
    /// Voices offered by the console synthesizer.
    pub voices: Vec<VoiceEntry>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            recognition_language: "en-US".to_string(),
            synthesis_language: "hi-IN".to_string(),
            words_per_minute: 160,
            voices: vec![
                VoiceEntry {
                    name: "Console Hindi Male".to_string(),
                    language: "hi-IN".to_string(),
                    tags: vec![VoiceTag::Male],
                },
                VoiceEntry {
                    name: "Console Hindi Female".to_string(),
                    language: "hi-IN".to_string(),
                    tags: vec![VoiceTag::Female],
                },
            ],
        }
    }
}

/// A synthesis voice declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub tags: Vec<VoiceTag>,
}

/// Terminal presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Initial theme key.
    pub theme: String,
    /// Print status changes (Listening, Thinking, ...) as they happen.
    pub show_status: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "deep-space".to_string(),
            show_status: true,
        }
    }
}
