//! OpenRouter chat completions client

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request sampling options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Request `response_format: {"type": "json_object"}`
    pub json: bool,
}

impl ChatOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Failure of a chat call
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("OpenRouter API key is not set")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to reach model endpoint: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Invalid API key. Please check your OpenRouter API key in settings.")]
    Unauthorized,

    #[error("Insufficient credits. Please check your OpenRouter account.")]
    InsufficientCredits,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("API request failed: {status}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode model response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("No response from API")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter API client
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    url: String,
    api_key: String,
    model: String,
    defaults: ChatOptions,
    app_title: String,
    referer: Option<String>,
    client: reqwest::Client,
}

impl OpenRouterClient {
    /// Create a client for `{base_url}/chat/completions`
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ChatError> {
        Self::with_timeout(base_url, api_key, model, Duration::from_secs(120))
    }

    fn with_timeout(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ChatError::Client)?;

        Ok(Self {
            url: format!("{}/chat/completions", base_url.as_ref().trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            defaults: ChatOptions::default(),
            app_title: "BabyAGI II".to_string(),
            referer: None,
            client,
        })
    }

    /// Build a client from configuration; fails when no API key is set
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        let settings = &config.openrouter;
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ChatError::MissingApiKey)?;

        let mut client = Self::with_timeout(
            &settings.base_url,
            api_key,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )?;
        client.defaults = ChatOptions::default()
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens);
        client.app_title = settings.app_title.clone();
        client.referer = settings.referer.clone();
        Ok(client)
    }

    /// Model identifier sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat request and return the first choice's content
    #[instrument(skip(self, messages, options), fields(model = %self.model, messages = messages.len()))]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, ChatError> {
        let req = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature.or(self.defaults.temperature),
            max_tokens: options.max_tokens.or(self.defaults.max_tokens),
            response_format: (options.json || self.defaults.json).then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("X-Title", &self.app_title)
            .json(&req);
        if let Some(ref referer) = self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }

        let resp = builder.send().await.map_err(ChatError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Chat request rejected");
            return Err(match status.as_u16() {
                401 => ChatError::Unauthorized,
                402 => ChatError::InsufficientCredits,
                429 => ChatError::RateLimited,
                _ => ChatError::Status { status, body },
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(ChatError::Decode)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ChatError::EmptyResponse)?;

        debug!(chars = content.len(), "Chat response received");
        Ok(content)
    }

    /// Check the key/model pair with a minimal request
    pub async fn validate(&self) -> bool {
        let options = ChatOptions::default().with_max_tokens(10);
        match self.chat(&[ChatMessage::user("Hello")], &options).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "API key validation failed");
                false
            }
        }
    }
}
