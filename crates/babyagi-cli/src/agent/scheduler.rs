//! Step scheduler
//!
//! A single driver task arms one timer at a time. Any control operation bumps
//! the agent's revision counter, which cancels the armed timer and makes the
//! driver recompute what to do. Steps are awaited inline, so two steps never
//! overlap.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::machine::{Agent, PendingStep, StepOutcome};
use super::state::AgentStatus;

/// Owns the driver task; dropping it stops scheduling
pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the driver on the current runtime
    pub fn spawn(agent: Agent) -> Self {
        let changes = agent.subscribe();
        let handle = tokio::spawn(drive(agent, changes));
        Self { handle }
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn announcement(pending: &PendingStep) -> String {
    let when = if pending.interval_secs == 0 {
        "now".to_string()
    } else {
        format!("in {} seconds", pending.interval_secs)
    };
    match &pending.next_task {
        Some(task) => format!("Agent running. Next task (\"{}\") {}...", task, when),
        None => format!("Agent running. Checking for new tasks {}...", when),
    }
}

async fn drive(agent: Agent, mut changes: watch::Receiver<u64>) {
    debug!("Scheduler started");
    loop {
        changes.borrow_and_update();

        let Some(pending) = agent.pending_step() else {
            if changes.changed().await.is_err() {
                break;
            }
            continue;
        };

        agent.announce(announcement(&pending));
        tokio::select! {
            _ = tokio::time::sleep(pending.delay) => {
                match agent.step().await {
                    StepOutcome::Completed => info!("Run finished"),
                    StepOutcome::Failed(e) => info!(error = %e, "Run stopped on error"),
                    outcome => debug!(?outcome, "Step finished"),
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("Armed step cancelled");
            }
        }
    }
    debug!("Scheduler stopped");
}

/// Wait until the run leaves `Running`/`Paused` and nothing is in flight
pub async fn wait_until_stopped(agent: &Agent) -> AgentStatus {
    let mut changes = agent.subscribe();
    loop {
        changes.borrow_and_update();
        let snapshot = agent.snapshot();
        let active = matches!(snapshot.status, AgentStatus::Running | AgentStatus::Paused);
        if !active && !snapshot.in_flight {
            return snapshot.status;
        }
        if changes.changed().await.is_err() {
            return agent.status();
        }
    }
}
