//! Agent status and the persisted session snapshot

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::tasks::{HistoryEntry, Task};

/// Lifecycle of one agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Complete,
    Error,
}

impl AgentStatus {
    /// States `start` is accepted from
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Error)
    }

    /// Status as written to storage; a reload never resumes on its own
    pub fn persisted(self) -> Self {
        match self {
            Self::Running | Self::Paused => Self::Idle,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted form of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub objective: String,
    pub pending_tasks: Vec<Task>,
    pub history: Vec<HistoryEntry>,
    pub status: AgentStatus,
    pub step_interval_seconds: u64,
}

impl SessionState {
    pub fn to_json(&self) -> AgentResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AgentError::storage(format!("Failed to serialize session: {}", e)))
    }

    /// Parse and validate a stored snapshot
    pub fn from_json(json: &str) -> AgentResult<Self> {
        let state: Self = serde_json::from_str(json).map_err(|e| AgentError::corrupt(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    fn validate(&self) -> AgentResult<()> {
        let mut task_ids = HashSet::new();
        for task in &self.pending_tasks {
            if task.description.trim().is_empty() {
                return Err(AgentError::corrupt(format!("task '{}' has no description", task.id)));
            }
            if !task_ids.insert(task.id.as_str()) {
                return Err(AgentError::corrupt(format!("duplicate task id '{}'", task.id)));
            }
        }

        let mut entry_ids = HashSet::new();
        for entry in &self.history {
            if !entry_ids.insert(entry.id.as_str()) {
                return Err(AgentError::corrupt(format!("duplicate history id '{}'", entry.id)));
            }
        }

        Ok(())
    }
}

/// Read-only view of the agent for display and reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub status: AgentStatus,
    pub objective: String,
    pub pending: Vec<Task>,
    pub history: Vec<HistoryEntry>,
    pub step_interval_secs: u64,
    pub last_error: Option<String>,
    pub activity: String,
    pub in_flight: bool,
}

impl AgentSnapshot {
    pub fn current_task(&self) -> Option<&Task> {
        self.pending.first()
    }
}
