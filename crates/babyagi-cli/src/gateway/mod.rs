//! LLM gateway: the three model calls the agent loop is built from

mod parse;
pub mod prompts;

use parse::parse_task_list;

use async_trait::async_trait;
use llm_core::{ChatError, ChatOptions, Config, OpenRouterClient};
use tracing::{debug, instrument, warn};

use crate::error::{AgentError, AgentResult};
use crate::tasks::{HistoryEntry, Task};

/// Backend the state machine talks to
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Initial breakdown of an objective. Never returns an empty list.
    async fn decompose(&self, objective: &str) -> AgentResult<Vec<Task>>;

    /// Simulate one task and return its free-text result
    async fn execute_one(
        &self,
        objective: &str,
        task: &Task,
        history: &[HistoryEntry],
    ) -> AgentResult<String>;

    /// Next task queue. An empty list means the objective is complete.
    async fn reprioritize(
        &self,
        objective: &str,
        history: &[HistoryEntry],
        pending: &[Task],
    ) -> AgentResult<Vec<Task>>;
}

/// Gateway backed by an OpenRouter chat model
#[derive(Debug, Clone)]
pub struct LlmGateway {
    client: OpenRouterClient,
    planning: ChatOptions,
    execution: ChatOptions,
}

impl LlmGateway {
    pub fn new(client: OpenRouterClient) -> Self {
        Self {
            client,
            planning: ChatOptions::default(),
            execution: ChatOptions::default(),
        }
    }

    /// Build from configuration; a missing key or model is a configuration error
    pub fn from_config(config: &Config) -> AgentResult<Self> {
        if !config.is_configured() {
            return Err(AgentError::configuration(
                "OpenRouter API is not configured. Set your API key with `babyagi config set-key <key>` or OPENROUTER_API_KEY.",
            ));
        }
        let client = OpenRouterClient::from_config(config)
            .map_err(|e| AgentError::configuration(e.to_string()))?;
        Ok(Self::new(client).with_json_mode(config.openrouter.json_mode))
    }

    /// Request JSON-object responses for planning calls
    pub fn with_json_mode(mut self, json: bool) -> Self {
        self.planning = self.planning.with_json(json);
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }
}

/// Message for a failed planning call
fn planning_failure(context: &str, err: ChatError) -> AgentError {
    AgentError::Network(format!("{} {}", context, err))
}

#[async_trait]
impl TaskGateway for LlmGateway {
    #[instrument(skip(self), fields(model = %self.client.model()))]
    async fn decompose(&self, objective: &str) -> AgentResult<Vec<Task>> {
        const CONTEXT: &str = "Failed to generate initial tasks.";

        let content = self
            .client
            .chat(&prompts::decompose(objective), &self.planning)
            .await
            .map_err(|e| planning_failure(CONTEXT, e))?;

        let tasks = parse_task_list(&content, "task").map_err(|e| {
            warn!(error = %e, response = %content, "Unparseable decomposition");
            AgentError::Parse(format!("{} {}", CONTEXT, e))
        })?;

        if tasks.is_empty() {
            return Err(AgentError::Generation(format!(
                "{} AI returned no usable tasks. Please try rephrasing your objective.",
                CONTEXT
            )));
        }

        debug!(count = tasks.len(), "Objective decomposed");
        Ok(tasks)
    }

    #[instrument(skip(self, task, history), fields(task_id = %task.id, history = history.len()))]
    async fn execute_one(
        &self,
        objective: &str,
        task: &Task,
        history: &[HistoryEntry],
    ) -> AgentResult<String> {
        let result = self
            .client
            .chat(&prompts::execute(objective, task, history), &self.execution)
            .await
            .map_err(|e| {
                AgentError::Execution(format!(
                    "Failed to execute task: {}. {}",
                    task.description, e
                ))
            })?;

        debug!(chars = result.len(), "Task executed");
        Ok(result)
    }

    #[instrument(skip(self, history, pending), fields(history = history.len(), pending = pending.len()))]
    async fn reprioritize(
        &self,
        objective: &str,
        history: &[HistoryEntry],
        pending: &[Task],
    ) -> AgentResult<Vec<Task>> {
        const CONTEXT: &str = "Failed to re-prioritize and generate tasks.";

        let content = self
            .client
            .chat(
                &prompts::reprioritize(objective, history, pending),
                &self.planning,
            )
            .await
            .map_err(|e| planning_failure(CONTEXT, e))?;

        let tasks = parse_task_list(&content, "task_new").map_err(|e| {
            warn!(error = %e, response = %content, "Unparseable reprioritization");
            AgentError::Parse(format!("{} {}", CONTEXT, e))
        })?;

        debug!(count = tasks.len(), "Tasks reprioritized");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    async fn gateway_replying(content: &str) -> (LlmGateway, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
            .mount(&server)
            .await;
        let client = OpenRouterClient::new(server.uri(), "sk-test", "test/model").unwrap();
        (LlmGateway::new(client), server)
    }

    #[test]
    fn test_from_config_requires_key() {
        let err = LlmGateway::from_config(&Config::default()).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));

        let mut config = Config::default();
        config.openrouter.api_key = Some("sk-or".into());
        let gateway = LlmGateway::from_config(&config).unwrap();
        assert_eq!(gateway.model(), llm_core::DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_decompose_parses_fenced_reply() {
        let (gateway, _server) =
            gateway_replying("```json\n[{\"id\": \"t1\", \"description\": \"Research\"}]\n```").await;
        let tasks = gateway.decompose("Plan a launch").await.unwrap();
        assert_eq!(tasks, vec![Task::new("t1", "Research")]);
    }

    #[tokio::test]
    async fn test_decompose_empty_is_generation_error() {
        let (gateway, _server) = gateway_replying("[]").await;
        let err = gateway.decompose("Plan a launch").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_decompose_garbage_is_parse_error() {
        let (gateway, _server) = gateway_replying("I would rather not.").await;
        let err = gateway.decompose("Plan a launch").await.unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to generate initial tasks."));
    }

    #[tokio::test]
    async fn test_decompose_http_failure_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let client = OpenRouterClient::new(server.uri(), "sk-test", "m").unwrap();
        let err = LlmGateway::new(client).decompose("x").await.unwrap_err();
        assert_eq!(
            err,
            AgentError::Network(
                "Failed to generate initial tasks. Rate limit exceeded. Please try again later."
                    .into()
            )
        );
    }

    #[tokio::test]
    async fn test_reprioritize_empty_means_done() {
        let (gateway, _server) = gateway_replying(r#"{"tasks": []}"#).await;
        let tasks = gateway.reprioritize("x", &[], &[]).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_reprioritize_sends_remaining_tasks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Task ID: t2, Description: Write copy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"[{"description": "Ship it"}]"#,
            )))
            .expect(1)
            .mount(&server)
            .await;
        let client = OpenRouterClient::new(server.uri(), "sk-test", "m").unwrap();
        let tasks = LlmGateway::new(client)
            .reprioritize("x", &[], &[Task::new("t2", "Write copy")])
            .await
            .unwrap();
        assert_eq!(tasks, vec![Task::new("task_new_1", "Ship it")]);
    }

    #[tokio::test]
    async fn test_execute_returns_text() {
        let (gateway, _server) = gateway_replying("Found three competitors.").await;
        let result = gateway
            .execute_one("Plan a launch", &Task::new("t1", "Research"), &[])
            .await
            .unwrap();
        assert_eq!(result, "Found three competitors.");
    }

    #[tokio::test]
    async fn test_execute_failure_is_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = OpenRouterClient::new(server.uri(), "sk-test", "m").unwrap();
        let err = LlmGateway::new(client)
            .execute_one("x", &Task::new("t1", "Research"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));
        assert!(err.to_string().starts_with("Failed to execute task: Research."));
    }
}
