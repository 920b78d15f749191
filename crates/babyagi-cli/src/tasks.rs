//! Pending task queue and execution history

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A unit of work proposed by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Record of one executed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub task_description: String,
    pub result: String,
    pub timestamp: String,
}

impl HistoryEntry {
    /// New entry with a fresh id and the current time
    pub fn record(task: &Task, result: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_description: task.description.clone(),
            result: result.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Ordered queue of pending tasks (index 0 is current) plus an append-only
/// history of executed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStore {
    pending: Vec<Task>,
    history: Vec<HistoryEntry>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts
    pub fn from_parts(pending: Vec<Task>, history: Vec<HistoryEntry>) -> Self {
        Self { pending, history }
    }

    pub fn pending(&self) -> &[Task] {
        &self.pending
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Task that the next step executes
    pub fn current(&self) -> Option<&Task> {
        self.pending.first()
    }

    /// Everything queued behind the current task
    pub fn remaining_after_current(&self) -> &[Task] {
        self.pending.get(1..).unwrap_or(&[])
    }

    /// Replace the whole queue; no merging with the old one
    pub fn replace_pending(&mut self, tasks: Vec<Task>) {
        self.pending = tasks;
    }

    /// Drop the current task without recording it
    pub fn skip_current(&mut self) -> Option<Task> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.history.clear();
    }
}
