//! Configuration management for live-narrator-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! full defaults, so the service runs with no config file at all.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::state::Settings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port for the JSON control API.
    pub api_port: u16,
    /// Port for the static control page.
    pub web_port: u16,
    /// Directory served as the control page root.
    pub web_root: String,
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: 5000,
            web_port: 8080,
            web_root: "web".into(),
            bind_address: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the chat relay that streams room events as NDJSON.
    pub base_url: String,
    pub connect_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765".into(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    /// Bearer key. The LIVE_NARRATOR_AI_KEY environment variable overrides
    /// this if set.
    pub api_key: String,
    pub system_prompt: String,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "deepseek-coder".into(),
            base_url: "https://api.blackbox.ai".into(),
            api_key: String::new(),
            system_prompt: "You are the co-host of a livestream. Reply in one or two short \
                            spoken sentences, greet users by name, and acknowledge gifts \
                            warmly. Never read out emoji."
                .into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Speech synthesis endpoint: GET with `q` (text) and `tl` (language)
    /// query parameters, returns MP3 bytes.
    pub endpoint: String,
    pub language: String,
    pub request_timeout_secs: u64,
    /// Narration queue bound; excess normal-priority requests are dropped.
    pub queue_limit: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.google.com/translate_tts".into(),
            language: "en".into(),
            request_timeout_secs: 15,
            queue_limit: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Event log capacity; oldest entries evicted past this.
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Minimum gift-free seconds before a reminder may fire.
    pub quiet_window_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            quiet_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub ai: AiConfig,
    pub tts: TtsConfig,
    pub log: LogConfig,
    pub reminder: ReminderConfig,
    /// Initial runtime settings; mutable afterwards via /api/settings.
    pub settings: Settings,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/live-narrator/config.yaml
    /// 3. /etc/live-narrator/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/live-narrator/config.yaml")),
                Some(PathBuf::from("/etc/live-narrator/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {e}, using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {e}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
        };

        if let Ok(key) = std::env::var("LIVE_NARRATOR_AI_KEY") {
            if !key.is_empty() {
                config.ai.api_key = key;
            }
        }

        config
    }
}
