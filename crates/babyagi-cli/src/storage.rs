//! Durable key-value storage for sessions and drafts
//!
//! Files live under the platform data directory (e.g. ~/.local/share/babyagi/store).

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};

pub const SESSION_KEY: &str = "babyagi-session";
pub const DRAFT_KEY: &str = "babyagi-draft-objective";

/// Minimal put/get store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AgentResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> AgentResult<()>;
    fn remove(&self, key: &str) -> AgentResult<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store under the default data directory
    pub fn new() -> anyhow::Result<Self> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;

        Ok(Self::at(data_dir.join("babyagi").join("store")))
    }

    /// Store under a specific directory; created lazily on first write
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AgentResult<Option<String>> {
        let path = self.path(key);
        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!(key, path = %path.display(), "Read key");
                Ok(Some(content))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn put(&self, key: &str, value: &str) -> AgentResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AgentError::storage(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        // Atomic replace via temp file
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| AgentError::storage(format!("Failed to write {}: {}", path.display(), e)))?;

        info!(key, path = %path.display(), "Stored key");
        Ok(())
    }

    fn remove(&self, key: &str) -> AgentResult<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Process-local store, mainly for tests and headless runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AgentResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> AgentResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AgentResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
