// ─── Session Store ───
// Key/value persistence for the session token and the pending login
// challenge, so a restarted client can pick up where it left off.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::core::error::{IndexError, IndexResult};

pub const TOKEN_KEY: &str = "token";
pub const LOGIN_KEY: &str = "active-login";

const SESSION_FILE: &str = "session.json";

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`; `None` removes the key.
    fn set(&self, key: &str, value: Option<&str>) -> IndexResult<()>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Option<&str>) -> IndexResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(v) => values.insert(key.to_string(), v.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// Store backed by a JSON object in `<data_dir>/session.json`.
///
/// The file is read once when opened and rewritten on every change.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSessionStore {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(SESSION_FILE);
        let values = load_from_disk(&path).unwrap_or_default();
        debug!("Session store at {:?} ({} keys)", path, values.len());

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, String>) -> IndexResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, json).map_err(|e| IndexError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Option<&str>) -> IndexResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = match value {
            Some(v) => values.insert(key.to_string(), v.to_string()).as_deref() != Some(v),
            None => values.remove(key).is_some(),
        };

        if !changed {
            return Ok(());
        }
        self.save(&values)
    }
}

fn load_from_disk(path: &Path) -> Option<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(values) => Some(values),
        Err(e) => {
            warn!("Ignoring unreadable session file {:?}: {}", path, e);
            None
        }
    }
}
