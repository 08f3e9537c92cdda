//! Solace configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Solace configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion endpoint configuration
    pub completion: CompletionConfig,

    /// Daily usage quota configuration
    pub quota: QuotaConfig,

    /// Prompt context window sizes
    pub context: ContextConfig,

    /// Background insight extraction configuration
    pub insight: InsightConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// User profile (collected during onboarding, mirrored here)
    pub profile: ProfileConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set. Call this early
    /// in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.completion.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "API key not found. Set the {} environment variable.",
                self.completion.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .solace.yml
        let local_config = PathBuf::from(".solace.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/solace/solace.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("solace").join("solace.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SOLACE_API_KEY".to_string(),
            base_url: "https://api.solace.app".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Daily usage quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Daily completions on the free tier
    #[serde(rename = "free-daily-limit")]
    pub free_daily_limit: u32,

    /// Daily completions on the premium tier
    #[serde(rename = "premium-daily-limit")]
    pub premium_daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 10,
            premium_daily_limit: 100,
        }
    }
}

/// Prompt context window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Exchanges of history included in plain chat prompts
    #[serde(rename = "chat-window-exchanges")]
    pub chat_window_exchanges: usize,

    /// Exchanges of history included in exercise step prompts
    #[serde(rename = "step-window-exchanges")]
    pub step_window_exchanges: usize,

    /// Messages replayed when requesting a summary artifact
    #[serde(rename = "summary-window-messages")]
    pub summary_window_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            chat_window_exchanges: 10,
            step_window_exchanges: 3,
            summary_window_messages: 15,
        }
    }
}

/// Background insight extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Minimum user messages before extraction is attempted
    #[serde(rename = "min-user-messages")]
    pub min_user_messages: usize,

    /// Minimum characters for a user message to count toward the gate
    #[serde(rename = "min-message-chars")]
    pub min_message_chars: usize,

    /// Minimum confidence for a pattern to be persisted
    #[serde(rename = "min-confidence")]
    pub min_confidence: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_user_messages: 2,
            min_message_chars: 20,
            min_confidence: 0.6,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for MindStore data
    #[serde(rename = "mindstore-dir")]
    pub mindstore_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/solace on Linux)
        let mindstore_dir = dirs::data_dir()
            .map(|d| d.join("solace"))
            .unwrap_or_else(|| PathBuf::from(".mindstore"))
            .to_string_lossy()
            .into_owned();

        Self { mindstore_dir }
    }
}

/// User profile mirrored from onboarding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Preferred name, used to personalize system instructions
    pub name: Option<String>,

    /// Subscription tier ("free" or "premium")
    pub tier: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: None,
            tier: "free".to_string(),
        }
    }
}
