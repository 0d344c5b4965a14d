use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KikiError, Result};
use crate::markup::SanitizePolicy;
use crate::types::ChatMode;

/// Top-level configuration for the Kiki client.
///
/// Loaded from `~/.kiki/config.toml` by default. Every section falls back to
/// its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KikiConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl KikiConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KikiConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KikiError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General settings.
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

/// Where the assistant backend lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL including the `/api` prefix.
    pub base_url: String,
    /// Request timeout in seconds. Zero leaves requests unbounded.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5081/api".to_string(),
            timeout_secs: 0,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Mode selected on start. A new session always goes back to RAG.
    pub start_mode: ChatMode,
    /// Characters of the first user message kept as the conversation title.
    pub summary_title_chars: usize,
    /// Rotation period of the "thinking" status.
    pub thinking_interval_ms: u64,
    /// Rotation period of the document upload status.
    pub document_upload_interval_ms: u64,
    /// Rotation period of the image upload status.
    pub image_upload_interval_ms: u64,
    /// How long a "switched to" notice stays visible.
    pub notice_dismiss_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            start_mode: ChatMode::Rag,
            summary_title_chars: 40,
            thinking_interval_ms: 2000,
            document_upload_interval_ms: 2500,
            image_upload_interval_ms: 2000,
            notice_dismiss_ms: 2000,
        }
    }
}

/// Query-then-source wizard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Rotation period of the "analyzing" status.
    pub status_interval_ms: u64,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 2000,
        }
    }
}

/// Speech input and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Recognition language tag.
    pub lang: String,
    /// Keep recognising until explicitly stopped.
    pub continuous: bool,
    /// Report interim (unfinalised) results.
    pub interim_results: bool,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Speak bot replies as they arrive. Off by default; `/speak` reads a
    /// reply on request.
    pub auto_speak: bool,
    /// Voice names tried in order before falling back to any English voice.
    pub preferred_voices: Vec<String>,
    /// Seconds before the compatibility notice dismisses itself.
    pub compatibility_notice_secs: u64,
    /// Program used for speech output. Empty probes `say`, `espeak-ng` and `espeak`.
    pub synthesizer_command: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            continuous: true,
            interim_results: true,
            rate: 1.1,
            pitch: 1.0,
            volume: 1.0,
            auto_speak: false,
            preferred_voices: vec![
                "Google US English".to_string(),
                "Google UK English Female".to_string(),
                "Microsoft Zira - English (United States)".to_string(),
                "Samantha".to_string(),
                "Karen".to_string(),
                "Victoria".to_string(),
                "Alex".to_string(),
            ],
            compatibility_notice_secs: 10,
            synthesizer_command: String::new(),
        }
    }
}

/// Answer rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sanitize: SanitizePolicy,
}
