//! User configuration for the babyagi CLI
//!
//! Configuration file: ~/.config/babyagi/config.toml (or platform equivalent).
//! Model endpoint settings live in babyagi.toml, see `llm_core::Config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::DEFAULT_STEP_INTERVAL_SECS;
use crate::draft::DEFAULT_DEBOUNCE;

/// User configuration for the babyagi CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// REPL configuration
    #[serde(default)]
    pub repl: ReplConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds between steps
    #[serde(default = "default_step_interval")]
    pub step_interval_secs: u64,

    /// Where sessions and drafts are stored (platform data dir if unset)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Quiet period before a draft objective is saved
    #[serde(default = "default_draft_debounce")]
    pub draft_debounce_ms: u64,
}

/// REPL-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplConfig {
    /// Show timestamps on agent activity lines
    #[serde(default)]
    pub show_timestamps: bool,

    /// Maximum history entries to keep
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_step_interval() -> u64 {
    DEFAULT_STEP_INTERVAL_SECS
}

fn default_draft_debounce() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_history_size() -> usize {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_interval_secs: default_step_interval(),
            data_dir: None,
            draft_debounce_ms: default_draft_debounce(),
        }
    }
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            show_timestamps: false,
            history_size: default_history_size(),
        }
    }
}

impl AgentConfig {
    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }
}

impl UserConfig {
    /// Load user configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("babyagi").join("config.toml"))
    }

    /// Create a default configuration file with comments
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path()?;

        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = r#"# babyagi CLI configuration
# Location: ~/.config/babyagi/config.toml
# API key and model live in babyagi.toml (`babyagi config set-key`)

[agent]
# Seconds to wait between steps (0 runs steps back to back)
step_interval_secs = 5

# Directory for saved sessions and the draft objective
# data_dir = "/home/me/.local/share/babyagi/store"

# Quiet period before a draft objective is saved, in milliseconds
draft_debounce_ms = 500

[repl]
# Show timestamps on agent activity lines
show_timestamps = false

# Maximum input history entries to keep
history_size = 1000
"#;

        fs::write(&path, default_config)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}
