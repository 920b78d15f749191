//! Agent state machine, its persisted form and the step scheduler

mod machine;
mod scheduler;
mod state;

pub use machine::{Agent, DEFAULT_STEP_INTERVAL_SECS};
pub use scheduler::{wait_until_stopped, Scheduler};
pub use state::{AgentSnapshot, AgentStatus, SessionState};
