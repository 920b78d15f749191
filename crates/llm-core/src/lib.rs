//! llm-core: Shared library for talking to the model endpoint
//!
//! Provides:
//! - Configuration loading (babyagi.toml)
//! - OpenRouter chat completions client
//! - Catalogue of free models

pub mod config;
pub mod models;
pub mod openrouter;

pub use config::Config;
pub use models::{find_model, ModelInfo, DEFAULT_MODEL, FREE_MODELS};
pub use openrouter::{ChatError, ChatMessage, ChatOptions, OpenRouterClient, Role};
