//! Scripted gateway for state machine and scheduler tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use crate::error::{AgentError, AgentResult};
use crate::gateway::TaskGateway;
use crate::tasks::{HistoryEntry, Task};

#[derive(Debug, Clone)]
pub enum Reply {
    Tasks(Vec<Task>),
    Text(String),
    Fail(AgentError),
}

/// Answers gateway calls from a queue of canned replies
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<String>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    held: Notify,
}

impl ScriptedGateway {
    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Calls made so far: `decompose`, `execute:<id>`, `reprioritize:<history>:<pending>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Block the next call until the returned sender fires
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock() = Some(rx);
        tx
    }

    /// Wait until a held call has started
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    async fn answer(&self, call: String) -> AgentResult<Reply> {
        self.calls.lock().push(call);
        let hold = self.hold.lock().take();
        if let Some(rx) = hold {
            self.held.notify_one();
            let _ = rx.await;
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| AgentError::Generation("script exhausted".into()))
    }

    async fn tasks(&self, call: String) -> AgentResult<Vec<Task>> {
        match self.answer(call).await? {
            Reply::Tasks(tasks) => Ok(tasks),
            Reply::Fail(e) => Err(e),
            Reply::Text(text) => panic!("expected tasks, scripted text {:?}", text),
        }
    }
}

#[async_trait]
impl TaskGateway for ScriptedGateway {
    async fn decompose(&self, _objective: &str) -> AgentResult<Vec<Task>> {
        self.tasks("decompose".into()).await
    }

    async fn execute_one(
        &self,
        _objective: &str,
        task: &Task,
        _history: &[HistoryEntry],
    ) -> AgentResult<String> {
        match self.answer(format!("execute:{}", task.id)).await? {
            Reply::Text(text) => Ok(text),
            Reply::Fail(e) => Err(e),
            Reply::Tasks(tasks) => panic!("expected text, scripted tasks {:?}", tasks),
        }
    }

    async fn reprioritize(
        &self,
        _objective: &str,
        history: &[HistoryEntry],
        pending: &[Task],
    ) -> AgentResult<Vec<Task>> {
        self.tasks(format!("reprioritize:{}:{}", history.len(), pending.len()))
            .await
    }
}
