//! Draft objective persistence
//!
//! Edits are saved after a quiet period; every new edit restarts the timer.
//! Blank text removes the draft right away.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AgentResult;
use crate::storage::{KeyValueStore, DRAFT_KEY};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub struct DraftObjective {
    store: Arc<dyn KeyValueStore>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DraftObjective {
    pub fn new(store: Arc<dyn KeyValueStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Last saved draft, if any
    pub fn load(&self) -> AgentResult<Option<String>> {
        Ok(self
            .store
            .get(DRAFT_KEY)?
            .filter(|text| !text.trim().is_empty()))
    }

    pub fn has_draft(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    /// Record an edit; must be called inside a tokio runtime
    pub fn update(&self, text: &str) -> AgentResult<()> {
        self.cancel_pending();

        if text.trim().is_empty() {
            return self.store.remove(DRAFT_KEY);
        }

        let store = self.store.clone();
        let debounce = self.debounce;
        let text = text.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            match store.put(DRAFT_KEY, &text) {
                Ok(()) => debug!(chars = text.len(), "Draft objective saved"),
                Err(e) => warn!(error = %e, "Failed to save draft objective"),
            }
        });
        *self.pending.lock() = Some(handle);
        Ok(())
    }

    /// Drop the draft and any save still waiting
    pub fn clear(&self) -> AgentResult<()> {
        self.cancel_pending();
        self.store.remove(DRAFT_KEY)
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for DraftObjective {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
