//! Error types for the agent core

use thiserror::Error;

use crate::agent::AgentStatus;

/// Every failure the agent core can report.
///
/// Gateway failures (`Network`, `Parse`, `Generation`, `Execution`) end a run
/// in `AgentStatus::Error`. The rest are local to the operation that raised
/// them and leave the status untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Missing credentials or objective
    #[error("{0}")]
    Configuration(String),

    /// The model answered but produced no usable task list
    #[error("{0}")]
    Generation(String),

    /// The model answer could not be read as a task list
    #[error("{0}")]
    Parse(String),

    /// Executing a task failed for any reason
    #[error("{0}")]
    Execution(String),

    /// Transport or HTTP status failure on a planning call
    #[error("{0}")]
    Network(String),

    /// Persisted snapshot is unreadable or has the wrong shape
    #[error("Saved session is corrupt: {0}")]
    CorruptState(String),

    /// Key-value store read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Control request not allowed from the current status
    #[error("Cannot {action} while the agent is {from}")]
    InvalidTransition {
        from: AgentStatus,
        action: &'static str,
    },

    /// A gateway call is still outstanding
    #[error("A step is in flight; try again when it finishes")]
    Busy,
}

impl AgentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptState(message.into())
    }

    /// True for the errors that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Parse(_) | Self::Execution(_) | Self::Network(_)
        )
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
