//! Agent state machine
//!
//! One `Agent` owns the status, the objective and the task store. Control
//! operations are synchronous and take effect immediately; `start` and `step`
//! await gateway calls with the state lock released. The status field, read
//! under the lock at the moment a step begins, is the only thing deciding
//! whether the step runs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::state::{AgentSnapshot, AgentStatus, SessionState};
use crate::error::{AgentError, AgentResult};
use crate::gateway::TaskGateway;
use crate::output::OutputSink;
use crate::storage::{KeyValueStore, SESSION_KEY};
use crate::tasks::{HistoryEntry, Task, TaskStore};

/// Delay used when the configured interval is zero
pub const MIN_STEP_DELAY: Duration = Duration::from_millis(50);

pub const DEFAULT_STEP_INTERVAL_SECS: u64 = 5;

/// Wait before the next step for a given interval
pub fn step_delay(interval_secs: u64) -> Duration {
    if interval_secs == 0 {
        MIN_STEP_DELAY
    } else {
        Duration::from_secs(interval_secs)
    }
}

/// What a call to [`Agent::step`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not running, or another call is in flight; nothing changed
    Skipped,
    /// Queue replaced, more work to do
    Advanced,
    /// Reprioritization returned no tasks
    Completed,
    /// A gateway call failed; the agent is now in `Error`
    Failed(AgentError),
    /// Reset or cleared while the call was in flight; results dropped
    Discarded,
}

/// The next step the scheduler should arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStep {
    pub delay: Duration,
    pub interval_secs: u64,
    pub next_task: Option<String>,
}

struct Inner {
    status: AgentStatus,
    objective: String,
    tasks: TaskStore,
    step_interval_secs: u64,
    last_error: Option<String>,
    activity: String,
    in_flight: bool,
    /// Bumped by reset/clear/load/start; a step landing in a newer epoch is dropped
    epoch: u64,
    gateway: Option<Arc<dyn TaskGateway>>,
}

struct Shared {
    state: Mutex<Inner>,
    changes: watch::Sender<u64>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn OutputSink>,
}

impl Shared {
    fn notify(&self) {
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn say(&self, inner: &mut Inner, line: String) {
        self.sink.emit(&line);
        inner.activity = line;
    }
}

/// Marks a gateway call as outstanding; clears the flag if the future is dropped
struct Flight<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> Flight<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn land(mut self, inner: &mut Inner) {
        inner.in_flight = false;
        self.armed = false;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().in_flight = false;
            self.shared.notify();
        }
    }
}

/// Handle to one agent session; clones share state
#[derive(Clone)]
pub struct Agent {
    shared: Arc<Shared>,
}

impl Agent {
    pub fn new(
        gateway: Option<Arc<dyn TaskGateway>>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    status: AgentStatus::Idle,
                    objective: String::new(),
                    tasks: TaskStore::new(),
                    step_interval_secs: DEFAULT_STEP_INTERVAL_SECS,
                    last_error: None,
                    activity: String::new(),
                    in_flight: false,
                    epoch: 0,
                    gateway,
                }),
                changes,
                store,
                sink,
            }),
        }
    }

    pub fn with_interval(self, secs: u64) -> Self {
        self.shared.state.lock().step_interval_secs = secs;
        self
    }

    /// Swap the backend, e.g. after the API key changed
    pub fn configure(&self, gateway: Option<Arc<dyn TaskGateway>>) {
        self.shared.state.lock().gateway = gateway;
    }

    pub fn is_configured(&self) -> bool {
        self.shared.state.lock().gateway.is_some()
    }

    /// Revision counter bumped on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn status(&self) -> AgentStatus {
        self.shared.state.lock().status
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let inner = self.shared.state.lock();
        AgentSnapshot {
            status: inner.status,
            objective: inner.objective.clone(),
            pending: inner.tasks.pending().to_vec(),
            history: inner.tasks.history().to_vec(),
            step_interval_secs: inner.step_interval_secs,
            last_error: inner.last_error.clone(),
            activity: inner.activity.clone(),
            in_flight: inner.in_flight,
        }
    }

    /// Emit an activity line without changing state
    pub fn announce(&self, line: impl Into<String>) {
        let mut inner = self.shared.state.lock();
        self.shared.say(&mut inner, line.into());
    }

    /// Step the scheduler should arm, if any
    pub fn pending_step(&self) -> Option<PendingStep> {
        let inner = self.shared.state.lock();
        if inner.status != AgentStatus::Running || inner.in_flight {
            return None;
        }
        Some(PendingStep {
            delay: step_delay(inner.step_interval_secs),
            interval_secs: inner.step_interval_secs,
            next_task: inner.tasks.current().map(|t| t.description.clone()),
        })
    }

    /// Begin a run: decompose the objective and fill the queue
    #[instrument(skip(self))]
    pub async fn start(&self, objective: &str) -> AgentResult<()> {
        let objective = objective.trim().to_string();
        let shared = &*self.shared;

        let (gateway, epoch) = {
            let mut inner = shared.state.lock();
            if inner.in_flight {
                return Err(AgentError::Busy);
            }
            if !inner.status.can_start() {
                return Err(AgentError::InvalidTransition {
                    from: inner.status,
                    action: "start",
                });
            }
            if objective.is_empty() {
                return Err(AgentError::configuration(
                    "Please set an objective to start the agent.",
                ));
            }
            let Some(gateway) = inner.gateway.clone() else {
                return Err(AgentError::configuration(
                    "OpenRouter API is not configured. Please set your API key in settings.",
                ));
            };

            inner.objective = objective.clone();
            inner.status = AgentStatus::Running;
            inner.last_error = None;
            inner.tasks.replace_pending(Vec::new());
            inner.in_flight = true;
            inner.epoch += 1;
            shared.say(
                &mut inner,
                "Agent initialized. Generating initial tasks...".to_string(),
            );
            (gateway, inner.epoch)
        };
        shared.notify();
        info!(objective = %objective, "Agent started");

        let flight = Flight::new(shared);
        let result = gateway.decompose(&objective).await;

        let mut inner = shared.state.lock();
        flight.land(&mut inner);
        if inner.epoch != epoch {
            debug!("Decomposition landed after reset; discarded");
            drop(inner);
            shared.notify();
            return Ok(());
        }

        let result = result.and_then(|tasks| {
            if tasks.is_empty() {
                Err(AgentError::Generation(
                    "Failed to generate initial tasks. AI returned no usable tasks.".into(),
                ))
            } else {
                Ok(tasks)
            }
        });
        let outcome = match result {
            Ok(tasks) => {
                let next = tasks[0].description.clone();
                info!(count = tasks.len(), "Initial tasks generated");
                inner.tasks.replace_pending(tasks);
                shared.say(
                    &mut inner,
                    format!("Initial tasks generated. Next task: \"{}\"", next),
                );
                Ok(())
            }
            Err(e) => {
                fail(shared, &mut inner, e.clone());
                Err(e)
            }
        };
        drop(inner);
        shared.notify();
        outcome
    }

    /// Run one iteration of the loop if the agent is running and idle
    #[instrument(skip(self))]
    pub async fn step(&self) -> StepOutcome {
        let shared = &*self.shared;

        let (gateway, objective, head, rest, mut history, epoch) = {
            let mut inner = shared.state.lock();
            if inner.status != AgentStatus::Running || inner.in_flight {
                return StepOutcome::Skipped;
            }
            let Some(gateway) = inner.gateway.clone() else {
                let err = AgentError::configuration("OpenRouter API is not configured.");
                fail(shared, &mut inner, err.clone());
                drop(inner);
                shared.notify();
                return StepOutcome::Failed(err);
            };
            inner.in_flight = true;
            (
                gateway,
                inner.objective.clone(),
                inner.tasks.current().cloned(),
                inner.tasks.remaining_after_current().to_vec(),
                inner.tasks.history().to_vec(),
                inner.epoch,
            )
        };
        let flight = Flight::new(shared);

        let Some(head) = head else {
            self.announce(
                "No more pending tasks. Checking if objective is complete or new tasks are needed...",
            );
            let result = gateway.reprioritize(&objective, &history, &[]).await;
            return self.land(flight, epoch, result);
        };

        debug!(task_id = %head.id, "Executing task");
        self.announce(format!("Executing task: \"{}\"", head.description));
        let result = match gateway.execute_one(&objective, &head, &history).await {
            Ok(result) => result,
            Err(e) => return self.land(flight, epoch, Err(e)),
        };

        let entry = HistoryEntry::record(&head, result);
        {
            let mut inner = shared.state.lock();
            if inner.epoch != epoch {
                flight.land(&mut inner);
                debug!("Execution landed after reset; discarded");
                drop(inner);
                shared.notify();
                return StepOutcome::Discarded;
            }
            inner.tasks.append_history(entry.clone());
            shared.say(
                &mut inner,
                format!("Task \"{}\" executed. Result: \"{}\"", head.description, entry.result),
            );
        }
        shared.notify();
        history.push(entry);

        self.announce("Re-prioritizing tasks based on new results...");
        let result = gateway.reprioritize(&objective, &history, &rest).await;
        self.land(flight, epoch, result)
    }

    /// Apply a reprioritization result (or failure) at the end of a step
    fn land(&self, flight: Flight<'_>, epoch: u64, result: AgentResult<Vec<Task>>) -> StepOutcome {
        let shared = &*self.shared;
        let mut inner = shared.state.lock();
        flight.land(&mut inner);

        let outcome = if inner.epoch != epoch {
            debug!("Step landed after reset; discarded");
            StepOutcome::Discarded
        } else {
            match result {
                Ok(tasks) if tasks.is_empty() => {
                    inner.tasks.replace_pending(Vec::new());
                    inner.status = AgentStatus::Complete;
                    info!(executed = inner.tasks.history().len(), "Objective complete");
                    shared.say(
                        &mut inner,
                        "Objective appears complete! Agent is stopping.".to_string(),
                    );
                    StepOutcome::Completed
                }
                Ok(tasks) => {
                    let next = tasks[0].description.clone();
                    debug!(count = tasks.len(), "Queue replaced");
                    inner.tasks.replace_pending(tasks);
                    shared.say(&mut inner, format!("Tasks updated. Next task: \"{}\"", next));
                    StepOutcome::Advanced
                }
                Err(e) => {
                    fail(shared, &mut inner, e.clone());
                    StepOutcome::Failed(e)
                }
            }
        };

        drop(inner);
        shared.notify();
        outcome
    }

    pub fn pause(&self) -> AgentResult<()> {
        self.transition(AgentStatus::Running, AgentStatus::Paused, "pause", "Agent paused.")
    }

    pub fn resume(&self) -> AgentResult<()> {
        self.transition(
            AgentStatus::Paused,
            AgentStatus::Running,
            "resume",
            "Agent resumed. Continuing operations...",
        )
    }

    fn transition(
        &self,
        from: AgentStatus,
        to: AgentStatus,
        action: &'static str,
        line: &str,
    ) -> AgentResult<()> {
        {
            let mut inner = self.shared.state.lock();
            if inner.status != from {
                return Err(AgentError::InvalidTransition {
                    from: inner.status,
                    action,
                });
            }
            inner.status = to;
            self.shared.say(&mut inner, line.to_string());
        }
        info!(from = %from, to = %to, "Agent status changed");
        self.shared.notify();
        Ok(())
    }

    /// Back to a blank `Idle` session from any state
    pub fn reset(&self) {
        {
            let mut inner = self.shared.state.lock();
            inner.status = AgentStatus::Idle;
            inner.objective.clear();
            inner.tasks.clear();
            inner.last_error = None;
            inner.activity.clear();
            inner.epoch += 1;
        }
        info!("Agent reset");
        self.shared.notify();
    }

    /// Drop the current task without executing it
    pub fn skip_current_task(&self) -> AgentResult<Option<Task>> {
        let skipped = {
            let mut inner = self.shared.state.lock();
            if inner.in_flight {
                return Err(AgentError::Busy);
            }
            let skipped = inner.tasks.skip_current();
            if let Some(ref task) = skipped {
                self.shared
                    .say(&mut inner, format!("Skipped task: \"{}\"", task.description));
            }
            skipped
        };
        if skipped.is_some() {
            self.shared.notify();
        }
        Ok(skipped)
    }

    /// Empty queue and history and return to `Idle`; the objective is kept
    pub fn clear_all(&self) {
        {
            let mut inner = self.shared.state.lock();
            inner.tasks.clear();
            inner.status = AgentStatus::Idle;
            inner.last_error = None;
            inner.epoch += 1;
            self.shared
                .say(&mut inner, "Cleared all tasks and history.".to_string());
        }
        info!("Tasks and history cleared");
        self.shared.notify();
    }

    /// Change the delay between steps; re-arms any scheduled step
    pub fn set_interval(&self, secs: u64) {
        self.shared.state.lock().step_interval_secs = secs;
        debug!(secs, "Step interval changed");
        self.shared.notify();
    }

    /// Persist the session; allowed in any state
    pub fn save_state(&self) -> AgentResult<()> {
        let json = {
            let inner = self.shared.state.lock();
            SessionState {
                objective: inner.objective.clone(),
                pending_tasks: inner.tasks.pending().to_vec(),
                history: inner.tasks.history().to_vec(),
                status: inner.status.persisted(),
                step_interval_seconds: inner.step_interval_secs,
            }
            .to_json()?
        };
        self.shared.store.put(SESSION_KEY, &json)?;
        info!("Session saved");
        Ok(())
    }

    /// Restore the saved session as `Idle`
    pub fn load_state(&self) -> AgentResult<()> {
        self.ensure_loadable()?;

        let json = self
            .shared
            .store
            .get(SESSION_KEY)?
            .ok_or_else(|| AgentError::storage("No saved session found"))?;
        let state = SessionState::from_json(&json).inspect_err(|e| {
            warn!(error = %e, "Rejected saved session");
        })?;

        {
            let mut inner = self.shared.state.lock();
            // Re-check: the store read happened without the lock
            Self::check_loadable(&inner)?;
            inner.objective = state.objective;
            inner.tasks = TaskStore::from_parts(state.pending_tasks, state.history);
            inner.step_interval_secs = state.step_interval_seconds;
            inner.status = AgentStatus::Idle;
            inner.last_error = None;
            inner.epoch += 1;
            let line = format!(
                "Session restored: {} pending task(s), {} completed.",
                inner.tasks.pending().len(),
                inner.tasks.history().len()
            );
            self.shared.say(&mut inner, line);
        }
        info!("Session loaded");
        self.shared.notify();
        Ok(())
    }

    fn ensure_loadable(&self) -> AgentResult<()> {
        Self::check_loadable(&self.shared.state.lock())
    }

    fn check_loadable(inner: &Inner) -> AgentResult<()> {
        if matches!(inner.status, AgentStatus::Running | AgentStatus::Paused) {
            return Err(AgentError::InvalidTransition {
                from: inner.status,
                action: "load a session",
            });
        }
        if inner.in_flight {
            return Err(AgentError::Busy);
        }
        Ok(())
    }
}

/// Record a terminal failure
fn fail(shared: &Shared, inner: &mut Inner, err: AgentError) {
    warn!(error = %err, terminal = err.is_terminal(), "Agent run failed");
    inner.status = AgentStatus::Error;
    inner.last_error = Some(err.to_string());
    shared.say(inner, format!("Agent operation failed: {}", err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingSink;
    use crate::storage::MemoryStore;
    use crate::testing::{Reply, ScriptedGateway};

    struct Harness {
        agent: Agent,
        gateway: Arc<ScriptedGateway>,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let agent = Agent::new(
            Some(gateway.clone() as Arc<dyn TaskGateway>),
            store.clone(),
            sink.clone(),
        );
        Harness {
            agent,
            gateway,
            store,
            sink,
        }
    }

    fn task(id: &str, description: &str) -> Task {
        Task::new(id, description)
    }

    #[tokio::test]
    async fn test_scenario_a_single_task_to_complete() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Text("Found three competitors".into()));
        h.gateway.push(Reply::Tasks(vec![]));

        h.agent.start("Plan a launch").await.unwrap();
        assert_eq!(h.agent.status(), AgentStatus::Running);
        assert_eq!(h.agent.snapshot().pending, vec![task("t1", "Research")]);

        assert_eq!(h.agent.step().await, StepOutcome::Completed);
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Complete);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].task_description, "Research");
        assert_eq!(snap.history[0].result, "Found three competitors");
        assert!(snap.pending.is_empty());
        assert_eq!(h.gateway.calls(), vec!["decompose", "execute:t1", "reprioritize:1:0"]);
    }

    #[tokio::test]
    async fn test_scenario_b_decompose_failure() {
        let h = harness();
        h.gateway.push(Reply::Fail(AgentError::Network(
            "Failed to generate initial tasks. connection refused".into(),
        )));

        let err = h.agent.start("Plan a launch").await.unwrap_err();
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Error);
        assert!(snap.pending.is_empty());
        assert_eq!(snap.last_error.as_deref(), Some(err.to_string().as_str()));
        assert_eq!(err.to_string(), "Failed to generate initial tasks. connection refused");
        assert!(!snap.in_flight);
    }

    #[tokio::test]
    async fn test_start_requires_objective_and_backend() {
        let h = harness();
        let err = h.agent.start("   ").await.unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert_eq!(h.agent.status(), AgentStatus::Idle);

        let unconfigured = Agent::new(None, Arc::new(MemoryStore::new()), h.sink.clone());
        let err = unconfigured.start("Plan a launch").await.unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert_eq!(unconfigured.status(), AgentStatus::Idle);
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejected_while_running() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("Plan a launch").await.unwrap();

        let err = h.agent.start("Another").await.unwrap_err();
        assert_eq!(
            err,
            AgentError::InvalidTransition {
                from: AgentStatus::Running,
                action: "start"
            }
        );
        assert_eq!(h.agent.snapshot().objective, "Plan a launch");
    }

    #[tokio::test]
    async fn test_restart_after_error_clears_error_keeps_history() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Fail(AgentError::Network("boom".into())));
        h.agent.start("Plan a launch").await.unwrap();
        assert!(matches!(h.agent.step().await, StepOutcome::Failed(_)));
        assert_eq!(h.agent.status(), AgentStatus::Error);

        h.gateway.push(Reply::Tasks(vec![task("t9", "Retry")]));
        h.agent.start("Plan a launch").await.unwrap();
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Running);
        assert!(snap.last_error.is_none());
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.pending, vec![task("t9", "Retry")]);
    }

    #[tokio::test]
    async fn test_step_is_noop_unless_running() {
        let h = harness();
        assert_eq!(h.agent.step().await, StepOutcome::Skipped);

        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("Plan a launch").await.unwrap();
        h.agent.pause().unwrap();
        let before = h.agent.snapshot();
        assert_eq!(h.agent.step().await, StepOutcome::Skipped);
        assert_eq!(h.agent.snapshot(), before);
        assert_eq!(h.gateway.calls(), vec!["decompose"]);
    }

    #[tokio::test]
    async fn test_empty_queue_step_reprioritizes() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("Plan a launch").await.unwrap();
        h.agent.skip_current_task().unwrap();

        h.gateway.push(Reply::Tasks(vec![task("t2", "Follow up")]));
        assert_eq!(h.agent.step().await, StepOutcome::Advanced);
        assert_eq!(h.agent.snapshot().pending, vec![task("t2", "Follow up")]);
        assert_eq!(h.agent.status(), AgentStatus::Running);

        h.agent.skip_current_task().unwrap();
        h.gateway.push(Reply::Tasks(vec![]));
        assert_eq!(h.agent.step().await, StepOutcome::Completed);
        assert_eq!(h.gateway.calls().last().unwrap(), "reprioritize:0:0");
    }

    #[tokio::test]
    async fn test_reprioritize_replaces_queue() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("a", "A"), task("b", "B"), task("c", "C")]));
        h.gateway.push(Reply::Text("did A".into()));
        h.gateway.push(Reply::Tasks(vec![task("z", "Z")]));
        h.agent.start("obj").await.unwrap();

        assert_eq!(h.agent.step().await, StepOutcome::Advanced);
        assert_eq!(h.agent.snapshot().pending, vec![task("z", "Z")]);
        // Remaining tasks after the head were offered to the model
        assert_eq!(h.gateway.calls()[2], "reprioritize:1:2");
    }

    #[tokio::test]
    async fn test_empty_reprioritize_completes_even_with_pending() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("a", "A"), task("b", "B")]));
        h.gateway.push(Reply::Text("did A".into()));
        h.gateway.push(Reply::Tasks(vec![]));
        h.agent.start("obj").await.unwrap();

        assert_eq!(h.agent.step().await, StepOutcome::Completed);
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Complete);
        assert!(snap.pending.is_empty());
    }

    #[tokio::test]
    async fn test_history_grows_by_one_per_execution() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "One")]));
        h.agent.start("obj").await.unwrap();

        for n in 1..=4 {
            h.gateway.push(Reply::Text(format!("result {}", n)));
            h.gateway.push(Reply::Tasks(vec![task(&format!("t{}", n + 1), "Next")]));
            assert_eq!(h.agent.step().await, StepOutcome::Advanced);
            let history = h.agent.snapshot().history;
            assert_eq!(history.len(), n);
            assert_eq!(history.last().unwrap().result, format!("result {}", n));
        }
    }

    #[tokio::test]
    async fn test_execute_failure_keeps_queue() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Fail(AgentError::Execution(
            "Failed to execute task: Research. timeout".into(),
        )));
        h.agent.start("obj").await.unwrap();

        let outcome = h.agent.step().await;
        assert!(matches!(outcome, StepOutcome::Failed(AgentError::Execution(_))));
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Error);
        assert_eq!(snap.pending, vec![task("t1", "Research")]);
        assert!(snap.history.is_empty());
        assert_eq!(
            snap.last_error.as_deref(),
            Some("Failed to execute task: Research. timeout")
        );

        // Loop is stopped: no retry
        assert_eq!(h.agent.step().await, StepOutcome::Skipped);
        assert!(h.agent.pending_step().is_none());
    }

    #[tokio::test]
    async fn test_reprioritize_failure_keeps_history_entry() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research"), task("t2", "Write")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Fail(AgentError::Parse("bad json".into())));
        h.agent.start("obj").await.unwrap();

        assert!(matches!(h.agent.step().await, StepOutcome::Failed(AgentError::Parse(_))));
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Error);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.pending.len(), 2);
    }

    #[tokio::test]
    async fn test_pause_resume_transitions() {
        let h = harness();
        assert!(matches!(h.agent.pause(), Err(AgentError::InvalidTransition { .. })));
        assert!(matches!(h.agent.resume(), Err(AgentError::InvalidTransition { .. })));

        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("obj").await.unwrap();
        h.agent.pause().unwrap();
        assert_eq!(h.agent.status(), AgentStatus::Paused);
        assert!(h.agent.pending_step().is_none());
        assert!(h.agent.pause().is_err());

        h.agent.resume().unwrap();
        assert_eq!(h.agent.status(), AgentStatus::Running);
        assert!(h.agent.pending_step().is_some());
        assert!(h.sink.lines().iter().any(|l| l == "Agent paused."));
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_from_any_state() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Fail(AgentError::Network("boom".into())));
        h.agent.start("obj").await.unwrap();
        h.agent.step().await;
        assert_eq!(h.agent.status(), AgentStatus::Error);

        for _ in 0..2 {
            h.agent.reset();
            let snap = h.agent.snapshot();
            assert_eq!(snap.status, AgentStatus::Idle);
            assert!(snap.pending.is_empty());
            assert!(snap.history.is_empty());
            assert!(snap.objective.is_empty());
            assert!(snap.last_error.is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_step_is_noop() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("obj").await.unwrap();

        let release = h.gateway.hold_next();
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![task("t2", "Next")]));

        let agent = h.agent.clone();
        let first = tokio::spawn(async move { agent.step().await });
        h.gateway.wait_until_held().await;

        assert!(h.agent.snapshot().in_flight);
        let before = h.agent.snapshot();
        assert_eq!(h.agent.step().await, StepOutcome::Skipped);
        assert_eq!(h.agent.snapshot(), before);
        assert!(matches!(h.agent.skip_current_task(), Err(AgentError::Busy)));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), StepOutcome::Advanced);
        assert_eq!(h.agent.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn test_pause_during_step_applies_results_without_rearming() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("obj").await.unwrap();

        let release = h.gateway.hold_next();
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![task("t2", "Next")]));
        let agent = h.agent.clone();
        let step = tokio::spawn(async move { agent.step().await });
        h.gateway.wait_until_held().await;

        h.agent.pause().unwrap();
        release.send(()).unwrap();
        assert_eq!(step.await.unwrap(), StepOutcome::Advanced);

        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Paused);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.pending, vec![task("t2", "Next")]);
        assert!(h.agent.pending_step().is_none());
    }

    #[tokio::test]
    async fn test_reset_during_step_discards_results() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("obj").await.unwrap();

        let release = h.gateway.hold_next();
        h.gateway.push(Reply::Text("done".into()));
        let agent = h.agent.clone();
        let step = tokio::spawn(async move { agent.step().await });
        h.gateway.wait_until_held().await;

        h.agent.reset();
        // Still in flight: a new run must wait
        assert_eq!(h.agent.start("new").await.unwrap_err(), AgentError::Busy);

        release.send(()).unwrap();
        assert_eq!(step.await.unwrap(), StepOutcome::Discarded);
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Idle);
        assert!(snap.history.is_empty());
        assert!(snap.pending.is_empty());
        assert!(!snap.in_flight);
    }

    #[tokio::test]
    async fn test_clear_all_during_step_discards_results() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research"), task("t2", "Write")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![task("t2", "Write")]));
        h.agent.start("obj").await.unwrap();
        assert_eq!(h.agent.step().await, StepOutcome::Advanced);
        assert_eq!(h.agent.snapshot().history.len(), 1);

        let release = h.gateway.hold_next();
        h.gateway.push(Reply::Text("written".into()));
        let agent = h.agent.clone();
        let step = tokio::spawn(async move { agent.step().await });
        h.gateway.wait_until_held().await;

        h.agent.clear_all();
        release.send(()).unwrap();
        assert_eq!(step.await.unwrap(), StepOutcome::Discarded);

        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Idle);
        assert_eq!(snap.objective, "obj");
        assert!(snap.history.is_empty());
        assert!(snap.pending.is_empty());
        assert!(!snap.in_flight);
    }

    #[tokio::test]
    async fn test_load_rejected_while_step_in_flight() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("saved", "Saved task")]));
        h.agent.start("saved objective").await.unwrap();
        h.agent.save_state().unwrap();
        h.agent.reset();

        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("obj").await.unwrap();
        let release = h.gateway.hold_next();
        h.gateway.push(Reply::Text("done".into()));
        let agent = h.agent.clone();
        let step = tokio::spawn(async move { agent.step().await });
        h.gateway.wait_until_held().await;

        h.agent.reset();
        let before = h.agent.snapshot();
        assert!(before.in_flight);
        assert_eq!(h.agent.load_state().unwrap_err(), AgentError::Busy);
        assert_eq!(h.agent.snapshot(), before);

        release.send(()).unwrap();
        assert_eq!(step.await.unwrap(), StepOutcome::Discarded);
        h.agent.load_state().unwrap();
        assert_eq!(h.agent.snapshot().objective, "saved objective");
    }

    #[tokio::test]
    async fn test_skip_current_task() {
        let h = harness();
        assert_eq!(h.agent.skip_current_task().unwrap(), None);

        h.gateway.push(Reply::Tasks(vec![task("a", "A"), task("b", "B")]));
        h.agent.start("obj").await.unwrap();
        assert_eq!(h.agent.skip_current_task().unwrap(), Some(task("a", "A")));
        let snap = h.agent.snapshot();
        assert_eq!(snap.pending, vec![task("b", "B")]);
        assert!(snap.history.is_empty());
        assert_eq!(snap.status, AgentStatus::Running);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![task("t2", "Next")]));
        h.agent.start("obj").await.unwrap();
        h.agent.step().await;

        h.agent.clear_all();
        let snap = h.agent.snapshot();
        assert_eq!(snap.status, AgentStatus::Idle);
        assert!(snap.pending.is_empty());
        assert!(snap.history.is_empty());
        assert_eq!(snap.objective, "obj");
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research"), task("t2", "Write")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![task("t3", "Ship")]));
        h.agent.set_interval(7);
        h.agent.start("Plan a launch").await.unwrap();
        h.agent.step().await;
        h.agent.pause().unwrap();

        h.agent.save_state().unwrap();
        let saved = h.agent.snapshot();

        let stored = h.store.get(SESSION_KEY).unwrap().unwrap();
        assert_eq!(SessionState::from_json(&stored).unwrap().status, AgentStatus::Idle);

        h.agent.reset();
        h.agent.load_state().unwrap();
        let loaded = h.agent.snapshot();
        assert_eq!(loaded.status, AgentStatus::Idle);
        assert_eq!(loaded.objective, saved.objective);
        assert_eq!(loaded.pending, saved.pending);
        assert_eq!(loaded.history, saved.history);
        assert_eq!(loaded.step_interval_secs, 7);
    }

    #[tokio::test]
    async fn test_scenario_d_load_rejected_while_running() {
        let h = harness();
        let other = SessionState {
            objective: "Other".into(),
            pending_tasks: vec![task("x", "X")],
            history: vec![],
            status: AgentStatus::Idle,
            step_interval_seconds: 1,
        };
        h.store.put(SESSION_KEY, &other.to_json().unwrap()).unwrap();

        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("Plan a launch").await.unwrap();
        let before = h.agent.snapshot();

        let err = h.agent.load_state().unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
        assert_eq!(h.agent.snapshot(), before);

        h.agent.pause().unwrap();
        assert!(h.agent.load_state().is_err());
        assert_eq!(h.agent.snapshot().objective, "Plan a launch");
    }

    #[tokio::test]
    async fn test_load_corrupt_snapshot_leaves_state() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.agent.start("Plan a launch").await.unwrap();
        h.agent.skip_current_task().unwrap();
        h.gateway.push(Reply::Tasks(vec![]));
        h.agent.step().await;
        assert_eq!(h.agent.status(), AgentStatus::Complete);

        h.store.put(SESSION_KEY, r#"{"objective": 3}"#).unwrap();
        let before = h.agent.snapshot();
        let err = h.agent.load_state().unwrap_err();
        assert!(matches!(err, AgentError::CorruptState(_)));
        assert_eq!(h.agent.snapshot(), before);
    }

    #[tokio::test]
    async fn test_load_without_saved_session() {
        let h = harness();
        let err = h.agent.load_state().unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));
        assert_eq!(h.agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_activity_lines_emitted() {
        let h = harness();
        h.gateway.push(Reply::Tasks(vec![task("t1", "Research")]));
        h.gateway.push(Reply::Text("done".into()));
        h.gateway.push(Reply::Tasks(vec![]));
        h.agent.start("obj").await.unwrap();
        h.agent.step().await;

        let lines = h.sink.lines();
        assert_eq!(lines[0], "Agent initialized. Generating initial tasks...");
        assert!(lines.contains(&"Executing task: \"Research\"".to_string()));
        assert_eq!(lines.last().unwrap(), "Objective appears complete! Agent is stopping.");
        assert_eq!(h.agent.snapshot().activity, *lines.last().unwrap());
    }

    #[test]
    fn test_step_delay() {
        assert_eq!(step_delay(0), MIN_STEP_DELAY);
        assert_eq!(step_delay(3), Duration::from_secs(3));
    }
}
