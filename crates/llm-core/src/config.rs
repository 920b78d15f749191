//! Endpoint configuration (babyagi.toml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::DEFAULT_MODEL;

pub const CONFIG_FILE_NAME: &str = "babyagi.toml";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Bearer token; `None` means the agent cannot start
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ask the endpoint for `response_format = json_object` on planning calls
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default = "default_app_title")]
    pub app_title: String,
    #[serde(default)]
    pub referer: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_app_title() -> String {
    "BabyAGI II".to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            json_mode: false,
            app_title: default_app_title(),
            referer: None,
        }
    }
}

impl Config {
    /// Load configuration from the nearest babyagi.toml, falling back to the
    /// user config file and then to defaults. Environment overrides apply last.
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_path() {
            Ok(path) => Self::load_from(path)?,
            Err(_) => match Self::user_config_path() {
                Ok(path) if path.exists() => Self::load_from(path)?,
                _ => Self::default(),
            },
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Try to load configuration, returning None on IO or parse failure
    pub fn try_load() -> Option<Self> {
        Self::load().ok()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find babyagi.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Per-user location, e.g. ~/.config/babyagi/babyagi.toml
    pub fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("babyagi").join(CONFIG_FILE_NAME))
    }

    /// Apply environment overrides using the given lookup
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.openrouter.api_key = Some(key);
        }
        if let Some(model) = lookup("BABYAGI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.openrouter.model = model;
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.openrouter.base_url = url;
        }
        self
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::user_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Both an API key and a model are present
    pub fn is_configured(&self) -> bool {
        self.openrouter
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
            && !self.openrouter.model.trim().is_empty()
    }

    /// Chat completions endpoint URL
    pub fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.openrouter.base_url.trim_end_matches('/')
        )
    }

    /// API key with the middle masked, for display
    pub fn masked_api_key(&self) -> Option<String> {
        let key = self.openrouter.api_key.as_deref()?;
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return Some("*".repeat(chars.len()));
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        Some(format!("{}...{}", head, tail))
    }
}
